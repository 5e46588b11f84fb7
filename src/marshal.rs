//! 与外部数值模块之间的扁平数组编组.
//!
//! 距离概率等重型计算由一个不透明的外部模块完成, 它以 Fortran 序
//! (列优先, 即磁盘上的 \[W, H, z\] 顺序) 的一维数组交换数据.
//! 本 crate 的体数据按 (z, H, W) 行优先存储, 两种布局的内存字节序恰好一致,
//! 因此编组不需要重排, 只涉及长度检查与数值宽度转换.
//!
//! 形状与分辨率取自输入标签体的 header, 由调用方在配置外部模块时一并传入.

use std::fmt;
use std::path::Path;

use ndarray::{Array3, Array4, ArrayView, Axis, Ix3, Ix4};
use nifti::writer::WriterOptions;
use nifti::NiftiHeader;
use num::ToPrimitive;

use crate::data::{LabelVolume, VolumeMeta};
use crate::{Idx3d, Idx4d};

/// 重组扁平数组时的错误.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarshalError {
    /// 数组长度与目标形状的体素个数不一致.
    LengthMismatch {
        /// 目标形状要求的元素个数.
        expected: usize,
        /// 实际收到的元素个数.
        got: usize,
    },

    /// 元素值超出 `i16` 标签表示范围.
    ValueOverflow {
        /// 越界元素在扁平数组中的下标.
        index: usize,
        /// 越界的元素值.
        value: i32,
    },
}

impl fmt::Display for MarshalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LengthMismatch { expected, got } => {
                write!(f, "数组长度 {got} 与目标形状要求的 {expected} 不一致")
            }
            Self::ValueOverflow { index, value } => {
                write!(f, "下标 {index} 处的元素 `{value}` 超出 i16 标签范围")
            }
        }
    }
}

impl std::error::Error for MarshalError {}

/// 将标签体展开为 Fortran 序 `i32` 数组 (外部模块的输入约定).
pub fn to_fortran_i32(vol: &LabelVolume) -> Vec<i32> {
    // (z, H, W) 行优先的内存序就是 [W, H, z] 的 Fortran 序.
    vol.data().iter().map(|&v| i32::from(v)).collect()
}

/// 将外部模块返回的 Fortran 序 `i32` 数组重组为标签体.
///
/// `shape` 以 (z, H, W) 给出目标形状, `header` 提供元数据模板
/// (通常沿用输入标签体的 header). 输出的 calibration 按实际数据重新计算.
pub fn labels_from_fortran(
    buf: &[i32],
    shape: Idx3d,
    header: &NiftiHeader,
) -> Result<LabelVolume, MarshalError> {
    let (z, h, w) = shape;
    let expected = z * h * w;
    if buf.len() != expected {
        return Err(MarshalError::LengthMismatch {
            expected,
            got: buf.len(),
        });
    }

    let mut voxels = Vec::with_capacity(expected);
    for (index, &value) in buf.iter().enumerate() {
        voxels.push(
            value
                .to_i16()
                .ok_or(MarshalError::ValueOverflow { index, value })?,
        );
    }

    // 长度已验证, 可直接 unwrap.
    let data = Array3::from_shape_vec(shape, voxels).unwrap();
    let mut ans = LabelVolume::with_header(header, data);
    ans.refresh_calibration();
    Ok(ans)
}

/// 外部模块输出的逐层概率体: 按 (层, z, H, W) 组织的 `f32` 栈, 附 header.
///
/// 每一层是一个与输入标签体同形状的 3D 概率图.
#[derive(Debug, Clone)]
pub struct ProbVolume {
    header: Box<NiftiHeader>,
    data: Array4<f32>,
}

impl VolumeMeta for ProbVolume {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }

    /// 单层的空间形状, 以 (z, H, W) 给出.
    #[inline]
    fn shape(&self) -> Idx3d {
        let (_, z, h, w) = self.data.dim();
        (z, h, w)
    }
}

impl ProbVolume {
    /// 将外部模块返回的 Fortran 序 `f32` 数组重组为 `layers` 层概率体.
    ///
    /// `shape` 以 (z, H, W) 给出单层形状. 重组后 header 的 `cal_max`
    /// 会更新为数据中的最大有限值 (忽略 NaN, 沿用上游约定; `cal_min` 不动).
    pub fn from_fortran(
        buf: Vec<f32>,
        shape: Idx3d,
        layers: usize,
        header: &NiftiHeader,
    ) -> Result<Self, MarshalError> {
        let (z, h, w) = shape;
        let expected = z * h * w * layers;
        if buf.len() != expected {
            return Err(MarshalError::LengthMismatch {
                expected,
                got: buf.len(),
            });
        }

        // [W, H, z, 层] 的 Fortran 序 == (层, z, H, W) 的行优先序.
        // 长度已验证, 可直接 unwrap.
        let data = Array4::from_shape_vec((layers, z, h, w), buf).unwrap();

        let mut header = Box::new(header.clone());
        header.dim = [4, w as u16, h as u16, z as u16, layers as u16, 1, 1, 1];
        if let Some(max) = data
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .reduce(f32::max)
        {
            header.cal_max = max;
        }

        Ok(Self { header, data })
    }

    /// 层数.
    #[inline]
    pub fn layer_len(&self) -> usize {
        self.data.dim().0
    }

    /// 完整形状, 以 (层, z, H, W) 给出.
    #[inline]
    pub fn shape4(&self) -> Idx4d {
        self.data.dim()
    }

    /// 获取第 `layer` 层概率图的不可变视图.
    ///
    /// 当 `layer` 越界时 panic.
    #[inline]
    pub fn layer(&self, layer: usize) -> ArrayView<'_, f32, Ix3> {
        self.data.index_axis(Axis(0), layer)
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix4> {
        self.data.view()
    }

    /// 将概率体保存为 4D nii 文件. `path` 以 `.nii.gz` 结尾时自动压缩.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> nifti::Result<()> {
        // (层, z, H, W) -> [W, H, z, 层]. 内存序不变, 仅逻辑轴序换回磁盘约定.
        let disk = self.data.view().permuted_axes([3, 2, 1, 0]);
        let disk = disk.as_standard_layout();
        WriterOptions::new(path.as_ref())
            .reference_header(&self.header)
            .write_nifti(&disk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr3;

    fn demo_volume() -> LabelVolume {
        // (z, H, W) = (1, 2, 3).
        LabelVolume::from_array(arr3(&[[[1, 2, 3], [4, 5, 6]]]), [1.0, 1.0, 1.0])
    }

    #[test]
    fn test_to_fortran_order() {
        let vol = demo_volume();
        // [W, H, z] Fortran 序: W 变化最快, 与内存序一致.
        assert_eq!(to_fortran_i32(&vol), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_labels_round_trip() {
        let vol = demo_volume();
        let buf = to_fortran_i32(&vol);
        let back = labels_from_fortran(&buf, vol.shape(), vol.header()).unwrap();
        assert_eq!(back.data(), vol.data());
        assert_eq!(back.shape(), vol.shape());
        assert_eq!(back.cal_range(), (1.0, 6.0));
    }

    #[test]
    fn test_labels_length_mismatch() {
        let vol = demo_volume();
        let err = labels_from_fortran(&[1, 2, 3], vol.shape(), vol.header()).unwrap_err();
        assert_eq!(
            err,
            MarshalError::LengthMismatch {
                expected: 6,
                got: 3
            }
        );
    }

    #[test]
    fn test_labels_overflow() {
        let vol = demo_volume();
        let buf = vec![0, 0, 123_456, 0, 0, 0];
        let err = labels_from_fortran(&buf, vol.shape(), vol.header()).unwrap_err();
        assert_eq!(
            err,
            MarshalError::ValueOverflow {
                index: 2,
                value: 123_456
            }
        );
    }

    #[test]
    fn test_prob_volume_layers() {
        let vol = demo_volume();
        // 两层, 每层 6 个体素; 第二层整体比第一层大 10.
        let buf: Vec<f32> = (0..12).map(|v| if v < 6 { v as f32 } else { v as f32 + 4.0 }).collect();
        let prob = ProbVolume::from_fortran(buf, vol.shape(), 2, vol.header()).unwrap();

        assert_eq!(prob.layer_len(), 2);
        assert_eq!(prob.shape4(), (2, 1, 2, 3));
        assert_eq!(prob.shape(), (1, 2, 3));
        assert_eq!(prob.layer(0)[(0, 0, 0)], 0.0);
        assert_eq!(prob.layer(1)[(0, 0, 0)], 10.0);
        assert_eq!(prob.header().cal_max, 15.0);
        assert_eq!(prob.header().dim[..5], [4, 3, 2, 1, 2]);
    }

    #[test]
    fn test_prob_volume_nan_aware_cal() {
        let vol = demo_volume();
        let buf = vec![0.5, f32::NAN, 0.25, 0.0, f32::NAN, 0.125];
        let prob = ProbVolume::from_fortran(buf, vol.shape(), 1, vol.header()).unwrap();
        assert_eq!(prob.header().cal_max, 0.5);
    }

    #[test]
    fn test_prob_volume_length_mismatch() {
        let vol = demo_volume();
        let err = ProbVolume::from_fortran(vec![0.0; 7], vol.shape(), 2, vol.header()).unwrap_err();
        assert_eq!(
            err,
            MarshalError::LengthMismatch {
                expected: 12,
                got: 7
            }
        );
    }
}
