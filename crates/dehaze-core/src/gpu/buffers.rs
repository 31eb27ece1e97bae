//! GPU buffer management and uniform parameter layouts.

use bytemuck::{Pod, Zeroable};
use wgpu::{self, util::DeviceExt};

use super::context::GpuError;

// Parameter structures for uniform buffers.
// These must match the WGSL struct layouts exactly.

/// Parameters for elementwise kernels.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct ElemParams {
    pub len: u32,
    pub _pad: u32,
    pub p0: f32,
    pub p1: f32,
}

/// Parameters for channel extract/insert, luma, min-channels, and crop.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct StructParams {
    /// Output pixel count
    pub pixel_count: u32,
    pub channel: u32,
    pub channels: u32,
    pub src_width: u32,
    pub x: u32,
    pub y: u32,
    pub out_width: u32,
    pub _pad: u32,
}

/// Parameters for the separable erosion/box-filter passes.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct FilterParams {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub radius: u32,
}

/// Create a uniform buffer from parameter data.
pub fn create_uniform_buffer<T: Pod>(device: &wgpu::Device, data: &T, label: &str) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::bytes_of(data),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

/// Create an uninitialized (zeroed) storage buffer for `len` f32 elements.
pub fn create_storage_buffer(device: &wgpu::Device, len: u64, label: &str) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: len * std::mem::size_of::<f32>() as u64,
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Upload f32 data into a new storage buffer.
pub fn upload_storage_buffer(device: &wgpu::Device, data: &[f32], label: &str) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(data),
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST,
    })
}

/// Download `len` f32 elements from a storage buffer, blocking until the
/// device has drained all previously submitted work.
pub fn download_f32(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    buffer: &wgpu::Buffer,
    len: u64,
) -> Result<Vec<f32>, GpuError> {
    let size = len * std::mem::size_of::<f32>() as u64;

    let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("staging_readback"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("download_encoder"),
    });

    encoder.copy_buffer_to_buffer(buffer, 0, &staging_buffer, 0, size);

    queue.submit(std::iter::once(encoder.finish()));

    let buffer_slice = staging_buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();

    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        // Ignore send error - if receiver is dropped, the recv() call will
        // fail appropriately
        let _ = tx.send(result);
    });

    device.poll(wgpu::Maintain::Wait);

    rx.recv()
        .map_err(|e| GpuError::BufferError(e.to_string()))?
        .map_err(|e| GpuError::BufferError(e.to_string()))?;

    let data = buffer_slice.get_mapped_range();
    let result: Vec<f32> = bytemuck::cast_slice(&data).to_vec();

    drop(data);
    staging_buffer.unmap();

    Ok(result)
}
