//! Host-side image data and the backend capability traits.
//!
//! The pipeline is written once, generically, against [`ImageOps`]; each
//! execution backend (sequential CPU, wgpu compute) supplies a buffer type
//! implementing it. [`HostImage`] is the plain in-memory exchange type at the
//! library boundary.

use crate::error::DehazeError;

/// Rec. 601 luma weights, applied as R*0.299 + G*0.587 + B*0.114.
pub(crate) const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// In-memory floating-point image, interleaved row-major, values in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct HostImage {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub data: Vec<f32>,
}

impl HostImage {
    pub fn new(width: u32, height: u32, channels: u32, data: Vec<f32>) -> Result<Self, DehazeError> {
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(DehazeError::InvalidDimensions(format!(
                "data length {} does not match {}x{}x{}",
                data.len(),
                width,
                height,
                channels
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Normalize interleaved 8-bit RGB bytes to [0, 1].
    pub fn from_rgb8(bytes: &[u8], width: u32, height: u32) -> Result<Self, DehazeError> {
        let data = bytes.iter().map(|&b| b as f32 / 255.0).collect();
        Self::new(width, height, 3, data)
    }

    /// Rescale to interleaved 8-bit, clamping out-of-range values.
    pub fn to_rgb8(&self) -> Vec<u8> {
        self.data
            .iter()
            .map(|&v| (v * 255.0).round().clamp(0.0, 255.0) as u8)
            .collect()
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn element_count(&self) -> usize {
        self.pixel_count() * self.channels as usize
    }
}

/// Elementwise arithmetic between two same-shaped buffers.
///
/// Split out from [`ImageOps`] so the covariance-matrix algebra in
/// [`crate::mat3`] can be expressed (and unit-tested) over plain scalars as
/// well as image buffers. All operations produce a new value and may fail on
/// the accelerated backend.
pub trait Arith: Sized {
    fn add(&self, rhs: &Self) -> Result<Self, DehazeError>;
    fn sub(&self, rhs: &Self) -> Result<Self, DehazeError>;
    fn mul(&self, rhs: &Self) -> Result<Self, DehazeError>;
    fn div(&self, rhs: &Self) -> Result<Self, DehazeError>;
}

/// The capability set both backends implement.
///
/// Elementwise operations consume the buffer and return it, so ownership
/// transfers on every stage boundary; a caller needing the unmodified input
/// clones explicitly with [`ImageOps::try_clone`]. Spatial filters and
/// structural operations allocate their output.
pub trait ImageOps: Arith {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn channels(&self) -> u32;

    fn try_clone(&self) -> Result<Self, DehazeError>;

    /// Read the buffer back into host memory. On the accelerated backend this
    /// blocks until all previously issued work has completed.
    fn to_host(&self) -> Result<HostImage, DehazeError>;

    // Elementwise, in place.

    /// x * scale + offset
    fn scale_offset(self, scale: f32, offset: f32) -> Result<Self, DehazeError>;

    /// numerator / x
    fn recip_scale(self, numerator: f32) -> Result<Self, DehazeError>;

    fn exp(self) -> Result<Self, DehazeError>;

    /// Two one-sided truncations: clamp above at 1, then below at 0.
    /// Equivalent to clamp(x, 0, 1); NaN passes through for the patch step.
    fn clip01(self) -> Result<Self, DehazeError>;

    /// Replace NaN and infinite values with `floor`.
    fn patch_nan(self, floor: f32) -> Result<Self, DehazeError>;

    fn max_scalar(self, floor: f32) -> Result<Self, DehazeError>;

    fn min_with(self, rhs: &Self) -> Result<Self, DehazeError>;

    // Structural.

    fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Result<Self, DehazeError>;

    /// 3-channel -> single-channel luma plane.
    fn luma(&self) -> Result<Self, DehazeError>;

    fn split(&self) -> Result<[Self; 3], DehazeError>;

    fn merge(planes: [Self; 3]) -> Result<Self, DehazeError>;

    /// Per-pixel minimum across the three channels.
    fn min_channels(&self) -> Result<Self, DehazeError> {
        let [r, g, b] = self.split()?;
        r.min_with(&g)?.min_with(&b)
    }

    // Spatial filters over a (2*radius+1) square window, reflect-101 borders.

    fn erode(&self, radius: u32) -> Result<Self, DehazeError>;

    fn box_filter(&self, radius: u32) -> Result<Self, DehazeError>;

    /// Mean over all elements. A host-side consumption point on both backends.
    fn mean(&self) -> Result<f32, DehazeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb8_normalizes() {
        let img = HostImage::from_rgb8(&[0, 128, 255, 51, 102, 204], 2, 1).unwrap();
        assert_eq!(img.channels, 3);
        assert!((img.data[2] - 1.0).abs() < 1e-6);
        assert!((img.data[3] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn to_rgb8_round_trips_exact_bytes() {
        let bytes = [0u8, 1, 2, 127, 254, 255];
        let img = HostImage::from_rgb8(&bytes, 2, 1).unwrap();
        assert_eq!(img.to_rgb8(), bytes);
    }

    #[test]
    fn new_rejects_mismatched_length() {
        assert!(HostImage::new(2, 2, 3, vec![0.0; 11]).is_err());
    }
}
