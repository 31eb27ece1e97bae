//! Dehaze Core Library
//!
//! Single-image haze removal with the dark channel prior: a quadtree search
//! localizes the atmospheric-light sample region, square-window erosion
//! produces the dark/per-channel minima, transmission is estimated per
//! channel and refined with a 3-channel-guide guided filter, and the haze
//! model is inverted to recover scene radiance.
//!
//! The pipeline is defined once over the [`image::ImageOps`] capability trait
//! and runs on two interchangeable backends: a sequential CPU reference
//! implementation and (behind the `gpu` feature) a wgpu compute-shader
//! implementation. Both follow the identical operation sequence, so results
//! agree within floating-point tolerance.

pub mod atmospheric;
pub mod cpu;
pub mod error;
pub mod guided;
pub mod image;
pub mod mat3;
pub mod patch;
pub mod pipeline;
pub mod quadtree;
pub mod recover;
pub mod transmission;

// GPU acceleration module (optional, enabled with "gpu" feature)
#[cfg(feature = "gpu")]
pub mod gpu;

// Re-export commonly used types
pub use atmospheric::AtmosphericLight;
pub use error::DehazeError;
pub use image::{HostImage, ImageOps};
pub use pipeline::{remove_haze, remove_haze_with_observer, Parameters, StageObserver};

// Re-export GPU entry points when available
#[cfg(feature = "gpu")]
pub use gpu::{gpu_info, is_gpu_available};
#[cfg(feature = "gpu")]
pub use pipeline::{remove_haze_gpu, remove_haze_gpu_with_observer};
