//! 通用常量.

/// 背景标签值. 映射表未覆盖的体素在输出中一律取该值.
pub const BACKGROUND: i16 = 0;

/// 标签是否是背景?
#[inline]
pub const fn is_background(label: i16) -> bool {
    matches!(label, BACKGROUND)
}

/// 标签是否是前景 (非背景)?
#[inline]
pub const fn is_foreground(label: i16) -> bool {
    !is_background(label)
}

/// Freesurfer aseg 分割中的常见源标签值.
///
/// 完整对照关系以调用方提供的 CSV 映射表为准,
/// 这里仅收录管线里经常单独引用的几项.
pub mod aseg {
    /// 左大脑白质.
    pub const LEFT_CEREBRAL_WM: i16 = 2;

    /// 左大脑皮层.
    pub const LEFT_CEREBRAL_CORTEX: i16 = 3;

    /// 左侧脑室.
    pub const LEFT_LATERAL_VENTRICLE: i16 = 4;

    /// 脑脊液.
    pub const CSF: i16 = 24;

    /// 右大脑白质.
    pub const RIGHT_CEREBRAL_WM: i16 = 41;

    /// 右大脑皮层.
    pub const RIGHT_CEREBRAL_CORTEX: i16 = 42;

    /// 右侧脑室.
    pub const RIGHT_LATERAL_VENTRICLE: i16 = 43;

    /// 标签是否是大脑白质 (左或右)?
    #[inline]
    pub const fn is_cerebral_wm(label: i16) -> bool {
        matches!(label, LEFT_CEREBRAL_WM | RIGHT_CEREBRAL_WM)
    }

    /// 标签是否是大脑皮层 (左或右)?
    #[inline]
    pub const fn is_cerebral_cortex(label: i16) -> bool {
        matches!(label, LEFT_CEREBRAL_CORTEX | RIGHT_CEREBRAL_CORTEX)
    }

    /// 标签是否是侧脑室 (左或右)?
    #[inline]
    pub const fn is_lateral_ventricle(label: i16) -> bool {
        matches!(label, LEFT_LATERAL_VENTRICLE | RIGHT_LATERAL_VENTRICLE)
    }
}
