//! nii 标签体基础数据结构.

use std::fmt;
use std::ops::{Index, IndexMut};
use std::path::Path;

use itertools::Itertools;
use ndarray::{Array3, ArrayView, ArrayViewMut, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use num::ToPrimitive;

use crate::Idx3d;

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
pub(crate) type BoxedHeader = Box<NiftiHeader>;

/// 打开标签体时的错误.
#[derive(Debug)]
pub enum OpenVolumeError {
    /// 底层 nifti 读取错误.
    Nifti(nifti::NiftiError),

    /// 体素值超出 `i16` 表示范围, 或不是有限值.
    ///
    /// 这是对上游静默截断行为的刻意修正: 越界标签直接报错, 绝不回绕.
    ValueOverflow {
        /// 文件中的原始体素值.
        value: f32,
    },
}

impl fmt::Display for OpenVolumeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nifti(e) => write!(f, "nifti 读取错误: {e}"),
            Self::ValueOverflow { value } => {
                write!(f, "体素值 `{value}` 超出 i16 标签表示范围")
            }
        }
    }
}

impl std::error::Error for OpenVolumeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Nifti(e) => Some(e),
            Self::ValueOverflow { .. } => None,
        }
    }
}

impl From<nifti::NiftiError> for OpenVolumeError {
    fn from(e: nifti::NiftiError) -> Self {
        Self::Nifti(e)
    }
}

/// 将 (W, H, z) 转换成 (z, H, W). 以后均按照该模式访问.
#[inline]
fn get_shape_from_header(h: &NiftiHeader) -> Idx3d {
    // [W, H, z]. 体素个数数组.
    let [_, w, h, z, ..] = h.dim;
    (z as usize, h as usize, w as usize)
}

/// 3D 体数据 header 的共用属性和部分通用操作.
pub trait VolumeMeta {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// 获取数据形状大小, 以 (z, H, W) 给出.
    fn shape(&self) -> Idx3d;

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 获取单个体素分辨率. 该分辨率以毫米为单位, 分别代表空间 (相邻切片方向),
    /// 高 (自然图像的垂直方向), 宽 (自然图像的水平方向).
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        let [_, w, h, z, ..] = self.header().pixdim;
        [z as f64, h as f64, w as f64]
    }

    /// 获取 width 方向体素分辨率, 以毫米为单位.
    #[inline]
    fn width_mm(&self) -> f64 {
        self.header().pixdim[1] as f64
    }

    /// 获取 height 方向体素分辨率, 以毫米为单位.
    #[inline]
    fn height_mm(&self) -> f64 {
        self.header().pixdim[2] as f64
    }

    /// 获取空间方向 (相邻切片的方向) 体素分辨率, 以毫米为单位.
    #[inline]
    fn z_mm(&self) -> f64 {
        self.header().pixdim[3] as f64
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        self.pix_dim().iter().product()
    }

    /// 获取 header 中记录的 calibration 范围 (cal_min, cal_max).
    #[inline]
    fn cal_range(&self) -> (f32, f32) {
        let h = self.header();
        (h.cal_min, h.cal_max)
    }
}

/// nii 格式 3D 标签体, 包括 header 和离散标签数据. 标签值以 `i16` 保存.
///
/// 数据在内存中按 (z, H, W) 行优先存储; 磁盘上的 [W, H, z] 列优先序
/// 与之逐字节一致, 读写只涉及逻辑轴序的换位.
#[derive(Debug, Clone)]
pub struct LabelVolume {
    header: BoxedHeader,
    data: Array3<i16>,
}

impl VolumeMeta for LabelVolume {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }

    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }
}

impl Index<Idx3d> for LabelVolume {
    type Output = i16;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for LabelVolume {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

/// 将文件中的原始体素值收窄为 `i16` 标签.
///
/// 小数部分向零截断 (与上游数据约定一致); 越界或非有限值报错.
#[inline]
fn narrow(value: f32) -> Result<i16, OpenVolumeError> {
    value.to_i16().ok_or(OpenVolumeError::ValueOverflow { value })
}

impl LabelVolume {
    /// 打开 nii 文件格式的 3D 标签体. `path` 为 nii (或 nii.gz) 文件的本地路径.
    ///
    /// 文件必须是 3D 体数据, 否则程序 panic. 文件中的体素值必须落在
    /// `i16` 范围内, 否则返回 [`OpenVolumeError::ValueOverflow`];
    /// 小数部分会向零截断.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, OpenVolumeError> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = Box::new(obj.header().clone());

        // [W, H, z] -> [z, H, W].
        // hint: 原第一维向下增长, 原第二维向右增长.
        let raw = obj
            .into_volume()
            .into_ndarray::<f32>()?
            .permuted_axes([2, 1, 0].as_slice());

        // The nature of nifti data field layout.
        debug_assert!(raw.is_standard_layout());

        let mut voxels = Vec::with_capacity(raw.len());
        for value in raw.into_raw_vec() {
            voxels.push(narrow(value)?);
        }

        // 该操作不会生成 `Err`, 可直接 unwrap.
        let data = Array3::from_shape_vec(get_shape_from_header(&header), voxels).unwrap();

        Ok(Self { header, data })
    }

    /// 根据裸标签数据直接创建标签体. `data` 按 (z, H, W) 组织,
    /// `pix_dim` 按 \[z, H, W\] 给出体素分辨率 (毫米).
    ///
    /// header 其余字段取默认值, calibration 按实际数据范围计算.
    /// 该方法主要用于实验和测试目的.
    pub fn from_array(data: Array3<i16>, pix_dim: [f32; 3]) -> Self {
        let mut header = Box::<NiftiHeader>::default();
        let (z, h, w) = data.dim();
        header.dim = [3, w as u16, h as u16, z as u16, 1, 1, 1, 1];
        let [pz, ph, pw] = pix_dim;
        let [_, hw, hh, hz, ..] = &mut header.pixdim;
        (*hw, *hh, *hz) = (pw, ph, pz);

        let mut ans = Self { header, data };
        ans.refresh_calibration();
        ans
    }

    /// 以 `header` 为元数据模板, 根据裸标签数据创建标签体.
    /// `data` 按 (z, H, W) 组织; header 中的形状字段会被改写为 `data` 的实际形状.
    pub fn with_header(header: &NiftiHeader, data: Array3<i16>) -> Self {
        let mut header = Box::new(header.clone());
        let (z, h, w) = data.dim();
        header.dim = [3, w as u16, h as u16, z as u16, 1, 1, 1, 1];
        Self { header, data }
    }

    /// 内部构造: header 原样接管, 形状一致性由调用方保证.
    #[inline]
    pub(crate) fn from_raw(header: BoxedHeader, data: Array3<i16>) -> Self {
        debug_assert_eq!(get_shape_from_header(&header), data.dim());
        Self { header, data }
    }

    /// 获取 header 的一份堆上拷贝.
    #[inline]
    pub(crate) fn clone_header(&self) -> BoxedHeader {
        self.header.clone()
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, i16, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, i16, Ix3> {
        self.data.view_mut()
    }

    /// 获取标签体中值为 `label` 的体素个数.
    #[inline]
    pub fn count(&self, label: i16) -> usize {
        self.data.iter().filter(|p| **p == label).count()
    }

    /// 将标签体中值为 `old` 的体素全部替换为 `new`.
    ///
    /// 返回总共成功替换的个数.
    pub fn replace(&mut self, old: i16, new: i16) -> usize {
        let mut cnt = 0usize;
        self.data_mut()
            .iter_mut()
            .filter(|pix| **pix == old)
            .for_each(|p| {
                cnt += 1;
                *p = new;
            });
        cnt
    }

    /// 收集满足谓词 `pred` 的所有体素对应的下标, 结果按行优先存储.
    pub fn filter_pos(&self, pred: fn(i16) -> bool) -> Vec<Idx3d> {
        self.data
            .indexed_iter()
            .filter_map(|(ref pos, pixel)| pred(*pixel).then_some(*pos))
            .collect()
    }

    /// 收集标签体中出现过的所有不同标签值, 结果升序排列.
    pub fn distinct_labels(&self) -> Vec<i16> {
        self.data.iter().copied().sorted().dedup().collect()
    }

    /// 按实际数据范围重新计算 header 中的 `cal_min` / `cal_max`.
    ///
    /// 这是纯元数据操作, 不会触碰体素数据.
    pub fn refresh_calibration(&mut self) {
        if let Some((min, max)) = self.data.iter().copied().minmax().into_option() {
            self.header.cal_min = min as f32;
            self.header.cal_max = max as f32;
        }
    }

    /// 将标签体保存为 nii 文件. `path` 以 `.nii.gz` 结尾时自动压缩.
    ///
    /// header (含仿射变换) 原样写出, 形状字段以实际数据为准.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> nifti::Result<()> {
        // (z, H, W) -> [W, H, z]. 内存序不变, 仅逻辑轴序换回磁盘约定.
        let disk = self.data.view().permuted_axes([2, 1, 0]);
        let disk = disk.as_standard_layout();
        WriterOptions::new(path.as_ref())
            .reference_header(&self.header)
            .write_nifti(&disk)
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use ndarray::{Axis, Zip};
        use std::sync::atomic::{AtomicUsize, Ordering};
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
    }
}

/// 并发操作部分.
#[cfg(feature = "rayon")]
impl LabelVolume {
    /// 借助 `rayon`, 并行地将标签体中值为 `old` 的体素全部替换为 `new`.
    ///
    /// 返回总共成功替换的个数.
    pub fn par_replace(&mut self, old: i16, new: i16) -> usize {
        let cnt = AtomicUsize::new(0);
        self.data_mut()
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .for_each(|mut v| {
                let mut local = 0usize;
                Zip::from(&mut v).for_each(|p| {
                    if *p == old {
                        local += 1;
                        *p = new;
                    }
                });
                cnt.fetch_add(local, Ordering::Release);
            });

        cnt.load(Ordering::Acquire)
    }
}
