//! WGSL shader sources embedded at compile time.

/// Container for all shader source code.
pub struct Shaders;

impl Shaders {
    /// In-place elementwise operations on one buffer (scale/offset,
    /// reciprocal, exp, clip, NaN patch, scalar max).
    pub const UNARY: &'static str = include_str!("unary.wgsl");

    /// Elementwise combination of a destination buffer with a source buffer.
    pub const BINARY: &'static str = include_str!("binary.wgsl");

    /// Channel extract/insert, luma, channel minimum, and crop.
    pub const STRUCTURAL: &'static str = include_str!("structural.wgsl");

    /// Separable erosion and box-filter passes with reflect-101 borders.
    pub const FILTERS: &'static str = include_str!("filters.wgsl");
}
