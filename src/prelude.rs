//! 🍒欢迎光临🍒
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx3d, Idx4d};

pub use crate::data::{LabelVolume, OpenVolumeError, VolumeMeta};

pub use crate::table::{MappingParseError, MappingTable};

pub use crate::remap::RemapReport;

pub use crate::marshal::{self, MarshalError, ProbVolume};

pub use crate::consts::{is_background, is_foreground, BACKGROUND};
