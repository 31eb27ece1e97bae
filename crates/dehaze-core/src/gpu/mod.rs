//! GPU-accelerated backend using wgpu compute shaders.
//!
//! Every pipeline primitive (elementwise arithmetic, erosion, box filter,
//! channel split/merge, crop) dispatches as an independent compute kernel;
//! kernels for one image are issued in data-dependency order and every
//! readback blocks until the device has drained. Metal on macOS, Vulkan on
//! Linux/Windows, DX12 on Windows.
//!
//! Enabled via the `gpu` feature flag:
//!
//! ```toml
//! [dependencies]
//! dehaze-core = { version = "0.1", features = ["gpu"] }
//! ```

mod buffers;
mod context;
mod image;
mod shaders;

pub use context::{GpuContext, GpuError};
pub use image::GpuImage;

/// Check if GPU acceleration is available on this system.
pub fn is_gpu_available() -> bool {
    GpuContext::is_available()
}

/// Get information about the available GPU device.
pub fn gpu_info() -> Option<String> {
    GpuContext::device_info()
}

#[cfg(test)]
mod tests;
