//! 标签映射表.
//!
//! 映射表来自一张至少含两列的表格 (CSV), 两列的列名由调用方指定,
//! 分别给出源标签值和目标标签值. 多个源标签允许映射到同一个目标标签
//! (merge), 反向的一对多拆分无法表达.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::Path;

use num::ToPrimitive;

/// 解析映射表时的错误.
#[derive(Debug)]
pub enum MappingParseError {
    /// 指定的列名在表头中不存在.
    MissingColumn {
        /// 未找到的列名.
        column: String,
    },

    /// 单元格内容无法解析为整数标签.
    BadValue {
        /// 出错行在文件中的行号 (1 起始; 0 代表未知).
        line: u64,
        /// 出错单元格所在的列名.
        column: String,
        /// 单元格的原始内容.
        value: String,
    },

    /// 标签值超出 `i16` 表示范围.
    ValueOverflow {
        /// 出错行在文件中的行号 (1 起始; 0 代表未知).
        line: u64,
        /// 出错单元格所在的列名.
        column: String,
        /// 越界的标签值.
        value: i64,
    },

    /// 底层 CSV 读取错误.
    Csv(csv::Error),
}

impl fmt::Display for MappingParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingColumn { column } => {
                write!(f, "映射表表头中找不到列 `{column}`")
            }
            Self::BadValue {
                line,
                column,
                value,
            } => write!(f, "第 {line} 行, 列 `{column}`: `{value}` 不是整数标签"),
            Self::ValueOverflow {
                line,
                column,
                value,
            } => write!(f, "第 {line} 行, 列 `{column}`: 标签值 `{value}` 超出 i16 范围"),
            Self::Csv(e) => write!(f, "CSV 读取错误: {e}"),
        }
    }
}

impl std::error::Error for MappingParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Csv(e) => Some(e),
            _ => None,
        }
    }
}

impl From<csv::Error> for MappingParseError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e)
    }
}

/// 源标签到目标标签的映射表.
///
/// 同一源标签出现多次时以最后一次出现为准 (last-wins),
/// 这是文档化的确定性决议规则. 查表为 O(1).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MappingTable {
    /// 去重后的映射项, 按源标签首次出现的顺序排列.
    pairs: Vec<(i16, i16)>,
    map: HashMap<i16, i16>,
}

/// 解析单元格内容为 `i16` 标签.
fn parse_label(line: u64, column: &str, raw: &str) -> Result<i16, MappingParseError> {
    let wide: i64 = raw.trim().parse().map_err(|_| MappingParseError::BadValue {
        line,
        column: column.to_string(),
        value: raw.to_string(),
    })?;
    wide.to_i16().ok_or(MappingParseError::ValueOverflow {
        line,
        column: column.to_string(),
        value: wide,
    })
}

impl MappingTable {
    /// 从 (源标签, 目标标签) 序列构建映射表. 重复源标签 last-wins.
    pub fn from_pairs<I: IntoIterator<Item = (i16, i16)>>(it: I) -> Self {
        let mut order = Vec::new();
        let mut map = HashMap::new();
        for (src, trg) in it {
            if map.insert(src, trg).is_none() {
                order.push(src);
            }
        }
        let pairs = order.into_iter().map(|src| (src, map[&src])).collect();
        Self { pairs, map }
    }

    /// 构建恒等映射表: 每个标签映射到它自身.
    #[inline]
    pub fn identity<I: IntoIterator<Item = i16>>(labels: I) -> Self {
        Self::from_pairs(labels.into_iter().map(|l| (l, l)))
    }

    /// 从本地 CSV 文件构建映射表. `src_col` 与 `trg_col`
    /// 分别为源标签列和目标标签列的列名.
    pub fn from_csv_path<P: AsRef<Path>>(
        path: P,
        src_col: &str,
        trg_col: &str,
    ) -> Result<Self, MappingParseError> {
        let rdr = csv::Reader::from_path(path.as_ref())?;
        Self::from_csv(rdr, src_col, trg_col)
    }

    /// 从任意 `io::Read` 构建映射表, 语义同 [`Self::from_csv_path`].
    pub fn from_csv_reader<R: io::Read>(
        reader: R,
        src_col: &str,
        trg_col: &str,
    ) -> Result<Self, MappingParseError> {
        Self::from_csv(csv::Reader::from_reader(reader), src_col, trg_col)
    }

    fn from_csv<R: io::Read>(
        mut rdr: csv::Reader<R>,
        src_col: &str,
        trg_col: &str,
    ) -> Result<Self, MappingParseError> {
        let headers = rdr.headers()?.clone();
        let position = |col: &str| {
            headers
                .iter()
                .position(|h| h == col)
                .ok_or_else(|| MappingParseError::MissingColumn {
                    column: col.to_string(),
                })
        };
        let src_idx = position(src_col)?;
        let trg_idx = position(trg_col)?;

        let mut raw_pairs = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            // 列索引来自表头定位, 短行仍可能缺列.
            let cell = |idx: usize, col: &str| {
                record.get(idx).ok_or(MappingParseError::BadValue {
                    line,
                    column: col.to_string(),
                    value: String::new(),
                })
            };
            let src = parse_label(line, src_col, cell(src_idx, src_col)?)?;
            let trg = parse_label(line, trg_col, cell(trg_idx, trg_col)?)?;
            raw_pairs.push((src, trg));
        }

        Ok(Self::from_pairs(raw_pairs))
    }

    /// 查询源标签 `src` 对应的目标标签. 未覆盖的源标签返回 `None`.
    #[inline]
    pub fn get(&self, src: i16) -> Option<i16> {
        self.map.get(&src).copied()
    }

    /// 映射表是否覆盖源标签 `src`?
    #[inline]
    pub fn contains(&self, src: i16) -> bool {
        self.map.contains_key(&src)
    }

    /// 映射项个数 (去重后).
    #[inline]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// 映射表是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// 获取去重后的映射项, 按源标签首次出现的顺序排列.
    #[inline]
    pub fn pairs(&self) -> &[(i16, i16)] {
        &self.pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
FS_label_val,atlas_label_val,comment
2,47,left wm
3,47,left cortex
41,48,right wm
24,0,csf
";

    #[test]
    fn test_from_csv_basic() {
        let table =
            MappingTable::from_csv_reader(CSV.as_bytes(), "FS_label_val", "atlas_label_val")
                .unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.get(2), Some(47));
        assert_eq!(table.get(3), Some(47));
        assert_eq!(table.get(41), Some(48));
        assert_eq!(table.get(24), Some(0));
        assert_eq!(table.get(7), None);
        assert!(table.contains(41));
        assert!(!table.contains(42));
        assert_eq!(
            table.pairs(),
            &[(2, 47), (3, 47), (41, 48), (24, 0)]
        );
    }

    #[test]
    fn test_missing_column() {
        let err = MappingTable::from_csv_reader(CSV.as_bytes(), "FS_label_val", "no_such_col")
            .unwrap_err();
        match err {
            MappingParseError::MissingColumn { column } => assert_eq!(column, "no_such_col"),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_value() {
        let csv = "src,trg\n1,liver\n";
        let err = MappingTable::from_csv_reader(csv.as_bytes(), "src", "trg").unwrap_err();
        match err {
            MappingParseError::BadValue {
                line,
                column,
                value,
            } => {
                assert_eq!(line, 2);
                assert_eq!(column, "trg");
                assert_eq!(value, "liver");
            }
            other => panic!("expected BadValue, got {other:?}"),
        }
    }

    #[test]
    fn test_value_overflow() {
        let csv = "src,trg\n70000,1\n";
        let err = MappingTable::from_csv_reader(csv.as_bytes(), "src", "trg").unwrap_err();
        match err {
            MappingParseError::ValueOverflow { column, value, .. } => {
                assert_eq!(column, "src");
                assert_eq!(value, 70000);
            }
            other => panic!("expected ValueOverflow, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_source_last_wins() {
        let csv = "src,trg\n1,10\n2,20\n1,30\n";
        let table = MappingTable::from_csv_reader(csv.as_bytes(), "src", "trg").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1), Some(30));
        assert_eq!(table.pairs(), &[(1, 30), (2, 20)]);

        let same = MappingTable::from_pairs([(1, 10), (2, 20), (1, 30)]);
        assert_eq!(same.get(1), Some(30));
        assert_eq!(same.pairs(), table.pairs());
    }

    #[test]
    fn test_identity() {
        let table = MappingTable::identity([0, 1, 5]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(5), Some(5));
        assert_eq!(table.get(4), None);
    }

    #[test]
    fn test_whitespace_tolerated() {
        let csv = "src,trg\n 1 , 10 \n";
        let table = MappingTable::from_csv_reader(csv.as_bytes(), "src", "trg").unwrap();
        assert_eq!(table.get(1), Some(10));
    }
}
