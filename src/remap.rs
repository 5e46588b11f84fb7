//! 单趟标签重映射.
//!
//! 朴素做法是对映射表的每一项扫一遍全体体素, 复杂度为
//! O(映射项数 × 体素数); 这里改为一趟遍历 + O(1) 查表,
//! 复杂度为 O(体素数 + 映射项数), 结果不变.

use std::collections::HashMap;

use ndarray::{Array3, Zip};

use crate::data::LabelVolume;
use crate::table::MappingTable;

/// 一次重映射的数量统计.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RemapReport {
    /// 每条映射项的命中情况: (源标签, 目标标签, 命中的体素数).
    /// 顺序与映射表的项顺序一致; 命中数为 0 说明该源标签在体数据中不存在
    /// (这不是错误, 对应项只是空转).
    pub moved: Vec<(i16, i16, u64)>,

    /// 映射表未覆盖、在输出中成为背景的体素数
    /// (包括输入中本就为背景且未被映射表覆盖的体素).
    pub untouched: u64,
}

impl LabelVolume {
    /// 按 `table` 对每个体素做标签重映射, 返回新分配的标签体.
    ///
    /// 输出与输入形状一致, header (含仿射变换) 原样继承, 输出的
    /// `cal_min` / `cal_max` 按实际数据范围重新计算. 输出从全 0 (背景)
    /// 开始: 映射表覆盖到的体素写入目标标签, 其余体素保持背景.
    ///
    /// 该操作是纯函数, 两次相同输入产生逐位相同的输出;
    /// 不持有共享状态, 可以从多个线程对不同调用并发执行.
    pub fn remap(&self, table: &MappingTable) -> LabelVolume {
        let mut out = Array3::<i16>::zeros(self.data().raw_dim());
        Zip::from(&mut out).and(self.data()).for_each(|o, s| {
            if let Some(t) = table.get(*s) {
                *o = t;
            }
        });
        let mut ans = LabelVolume::from_raw(self.clone_header(), out);
        ans.refresh_calibration();
        ans
    }

    /// 语义同 [`Self::remap`], 并额外返回逐项命中统计.
    pub fn remap_with_report(&self, table: &MappingTable) -> (LabelVolume, RemapReport) {
        let mut out = Array3::<i16>::zeros(self.data().raw_dim());
        let mut hits: HashMap<i16, u64> = HashMap::new();
        let mut untouched = 0u64;

        Zip::from(&mut out).and(self.data()).for_each(|o, s| {
            if let Some(t) = table.get(*s) {
                *o = t;
                *hits.entry(*s).or_insert(0) += 1;
            } else {
                untouched += 1;
            }
        });

        let moved = table
            .pairs()
            .iter()
            .map(|&(src, trg)| (src, trg, hits.get(&src).copied().unwrap_or(0)))
            .collect();

        let mut ans = LabelVolume::from_raw(self.clone_header(), out);
        ans.refresh_calibration();
        (ans, RemapReport { moved, untouched })
    }

    /// 借助 `rayon`, 并行执行 [`Self::remap`]. 输出与串行版本逐位相同.
    #[cfg(feature = "rayon")]
    pub fn par_remap(&self, table: &MappingTable) -> LabelVolume {
        let mut out = Array3::<i16>::zeros(self.data().raw_dim());
        Zip::from(&mut out).and(self.data()).par_for_each(|o, s| {
            if let Some(t) = table.get(*s) {
                *o = t;
            }
        });
        let mut ans = LabelVolume::from_raw(self.clone_header(), out);
        ans.refresh_calibration();
        ans
    }
}
