#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 提供 nii 格式 3D 标签体数据的读写与确定性标签重映射 (label remapping) 功能.
//!
//! 典型用例: 将 Freesurfer aseg 分割结果转换到 MGDM 管线所需的 atlas 标签空间.
//! 转换关系由一张双列表格 (CSV) 给出, 允许多对一合并 (merge), 不允许一对多拆分
//! (这是文档化的限制, 不是 bug).
//!
//! 该 crate 仅提供 `safe` 接口. 重映射本身是纯函数: 不持有任何共享可变状态,
//! 每次调用产出全新分配的输出, 多个独立调用可以无锁并发执行.
//!
//! # 注意
//!
//! 1. 标签值以 `i16` 保存. 读入时做显式范围检查, 超出范围 (或非有限)
//!    的体素值会返回错误, 而不是静默截断.
//! 2. 映射表未覆盖的标签在输出中一律为背景 (0). 这是设计行为, 不是错误.
//! 3. 在非期望情况下 (如索引越界), 程序会直接 panic, 而不会导致内存错误.
//!    As what Rust promises.
//!
//! # 功能一览
//!
//! ### 标签体容器 ✅
//!
//! nii 文件的打开/保存, header 元数据透传, calibration 重算.
//!
//! 实现位于 `src/data`.
//!
//! ### 标签映射表 ✅
//!
//! 从 CSV 双命名列构建, 重复源标签 last-wins, 缺列/坏值/越界按类报错.
//!
//! 实现位于 `src/table.rs`.
//!
//! ### 单趟重映射 ✅
//!
//! O(体素数 + 映射项数) 的一趟查表实现, 附可选的数量统计报告.
//!
//! 实现位于 `src/remap.rs`.
//!
//! ### 外部数值模块的扁平数组编组 ✅
//!
//! 距离概率等重型计算由外部模块完成, 本 crate 只负责 Fortran
//! 序一维数组与 3D/4D 体数据之间的重组.
//!
//! 实现位于 `src/marshal.rs`.

/// 三维索引, 按 (z, H, W) 组织. 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 四维索引, 按 (层, z, H, W) 组织.
pub type Idx4d = (usize, usize, usize, usize);

/// nii 标签体基础数据结构.
mod data;

pub use data::{LabelVolume, OpenVolumeError, VolumeMeta};

pub mod consts;

pub mod marshal;

mod table;

pub use table::{MappingParseError, MappingTable};

mod remap;

pub use remap::RemapReport;

pub mod prelude;
