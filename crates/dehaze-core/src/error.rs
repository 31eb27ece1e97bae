//! Error types for the dehazing pipeline.

#[cfg(feature = "gpu")]
use crate::gpu::GpuError;

/// Errors surfaced by pipeline entry points.
///
/// Dimension and parameter problems are detected before any filtering begins
/// and abort the run with no partial output. Device failures are surfaced
/// without retry; callers wanting a fallback re-run on the CPU path.
#[derive(Debug, Clone)]
pub enum DehazeError {
    /// Image is zero-sized, not 3-channel, or too small for the configured
    /// quadtree window
    InvalidDimensions(String),
    /// A parameter lies outside its documented domain
    InvalidParameter(String),
    /// GPU backend failure (adapter, device, buffer, or dispatch)
    #[cfg(feature = "gpu")]
    Device(GpuError),
}

impl std::fmt::Display for DehazeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DehazeError::InvalidDimensions(e) => write!(f, "Invalid image dimensions: {}", e),
            DehazeError::InvalidParameter(e) => write!(f, "Invalid parameter: {}", e),
            #[cfg(feature = "gpu")]
            DehazeError::Device(e) => write!(f, "GPU failure: {}", e),
        }
    }
}

impl std::error::Error for DehazeError {}

#[cfg(feature = "gpu")]
impl From<GpuError> for DehazeError {
    fn from(e: GpuError) -> Self {
        DehazeError::Device(e)
    }
}
