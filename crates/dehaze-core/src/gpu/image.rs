//! [`GpuImage`]: the device-side buffer type implementing the pipeline
//! capability traits. Every operation dispatches one or two compute kernels;
//! readbacks block on device completion.

use std::sync::Arc;

use crate::error::DehazeError;
use crate::gpu::buffers::{
    create_storage_buffer, create_uniform_buffer, download_f32, upload_storage_buffer, ElemParams,
    FilterParams, StructParams,
};
use crate::gpu::context::{GpuContext, GpuError};
use crate::image::{Arith, HostImage, ImageOps};

/// Workgroup size for compute shaders.
const WORKGROUP_SIZE: u32 = 256;

/// Maximum workgroups per dispatch dimension (GPU limit).
const MAX_WORKGROUPS_PER_DIM: u32 = 65535;

/// GPU image buffer with metadata. Dropping it releases the device memory.
pub struct GpuImage {
    pub(crate) buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    channels: u32,
    context: Arc<GpuContext>,
}

impl GpuImage {
    /// Create a new GPU image by uploading host data.
    pub fn upload(context: Arc<GpuContext>, image: &HostImage) -> Result<Self, DehazeError> {
        let expected = image.element_count();
        if image.data.len() != expected {
            return Err(GpuError::BufferError(format!(
                "Data size mismatch: expected {}, got {}",
                expected,
                image.data.len()
            ))
            .into());
        }
        let buffer = upload_storage_buffer(&context.device, &image.data, "gpu_image");
        Ok(Self {
            buffer,
            width: image.width,
            height: image.height,
            channels: image.channels,
            context,
        })
    }

    fn alloc(
        context: Arc<GpuContext>,
        width: u32,
        height: u32,
        channels: u32,
        label: &str,
    ) -> Self {
        let len = width as u64 * height as u64 * channels as u64;
        let buffer = create_storage_buffer(&context.device, len, label);
        Self {
            buffer,
            width,
            height,
            channels,
            context,
        }
    }

    fn element_count(&self) -> u32 {
        self.width * self.height * self.channels
    }

    fn pixel_count(&self) -> u32 {
        self.width * self.height
    }

    fn same_shape(&self, rhs: &Self) -> Result<(), DehazeError> {
        if self.width != rhs.width || self.height != rhs.height || self.channels != rhs.channels {
            return Err(DehazeError::InvalidDimensions(format!(
                "shape mismatch: {}x{}x{} vs {}x{}x{}",
                self.width, self.height, self.channels, rhs.width, rhs.height, rhs.channels
            )));
        }
        Ok(())
    }

    fn copy_of(&self) -> Result<Self, GpuError> {
        let out = Self::alloc(
            self.context.clone(),
            self.width,
            self.height,
            self.channels,
            "gpu_image_copy",
        );
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("copy_encoder"),
                });
        encoder.copy_buffer_to_buffer(
            &self.buffer,
            0,
            &out.buffer,
            0,
            self.element_count() as u64 * std::mem::size_of::<f32>() as u64,
        );
        self.context.submit_and_wait(encoder);
        Ok(out)
    }

    /// Apply an in-place elementwise kernel to this buffer.
    fn run_unary(&self, pipeline: &wgpu::ComputePipeline, p0: f32, p1: f32) -> Result<(), GpuError> {
        let params = ElemParams {
            len: self.element_count(),
            _pad: 0,
            p0,
            p1,
        };
        let uniform = create_uniform_buffer(&self.context.device, &params, "elem_params");
        let bind_group = self
            .context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("unary_bind_group"),
                layout: &self.context.pipelines.unary_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: uniform.as_entire_binding(),
                    },
                ],
            });
        dispatch(&self.context, pipeline, bind_group, self.element_count())
    }

    /// Apply a two-buffer kernel: binding 0 is the destination, binding 1 the
    /// source, `threads` the guard count the shader checks against.
    fn run_duo<T: bytemuck::Pod>(
        context: &GpuContext,
        pipeline: &wgpu::ComputePipeline,
        dst: &wgpu::Buffer,
        src: &wgpu::Buffer,
        params: &T,
        threads: u32,
    ) -> Result<(), GpuError> {
        let uniform = create_uniform_buffer(&context.device, params, "duo_params");
        let bind_group = context.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("duo_bind_group"),
            layout: &context.pipelines.duo_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: dst.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: src.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniform.as_entire_binding(),
                },
            ],
        });
        dispatch(context, pipeline, bind_group, threads)
    }

    /// Elementwise combination into a fresh copy of `self`.
    fn combined(&self, rhs: &Self, pipeline: &wgpu::ComputePipeline) -> Result<Self, DehazeError> {
        self.same_shape(rhs)?;
        let out = self.copy_of()?;
        Self::run_duo(
            &self.context,
            pipeline,
            &out.buffer,
            &rhs.buffer,
            &ElemParams {
                len: out.element_count(),
                _pad: 0,
                p0: 0.0,
                p1: 0.0,
            },
            out.element_count(),
        )?;
        Ok(out)
    }

    /// One separable filter: horizontal pass into a scratch buffer, vertical
    /// pass into the output.
    fn separable(
        &self,
        horizontal: &wgpu::ComputePipeline,
        vertical: &wgpu::ComputePipeline,
        radius: u32,
    ) -> Result<Self, DehazeError> {
        let params = FilterParams {
            width: self.width,
            height: self.height,
            channels: self.channels,
            radius,
        };
        let scratch = Self::alloc(
            self.context.clone(),
            self.width,
            self.height,
            self.channels,
            "filter_scratch",
        );
        Self::run_duo(
            &self.context,
            horizontal,
            &scratch.buffer,
            &self.buffer,
            &params,
            self.element_count(),
        )?;
        let out = Self::alloc(
            self.context.clone(),
            self.width,
            self.height,
            self.channels,
            "filter_out",
        );
        Self::run_duo(
            &self.context,
            vertical,
            &out.buffer,
            &scratch.buffer,
            &params,
            self.element_count(),
        )?;
        Ok(out)
    }

    fn require_rgb(&self) -> Result<(), DehazeError> {
        if self.channels != 3 {
            return Err(DehazeError::InvalidDimensions(format!(
                "operation requires a 3-channel image, got {}",
                self.channels
            )));
        }
        Ok(())
    }
}

/// Submit one compute pass, splitting into a 2D grid when the flat workgroup
/// count exceeds the per-dimension device limit.
fn dispatch(
    context: &GpuContext,
    pipeline: &wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    threads: u32,
) -> Result<(), GpuError> {
    let total_workgroups = threads.div_ceil(WORKGROUP_SIZE);

    let (workgroups_x, workgroups_y) = if total_workgroups <= MAX_WORKGROUPS_PER_DIM {
        (total_workgroups.max(1), 1)
    } else {
        let side = ((total_workgroups as f64).sqrt().ceil() as u32).min(MAX_WORKGROUPS_PER_DIM);
        let y = total_workgroups.div_ceil(side);
        if y > MAX_WORKGROUPS_PER_DIM {
            return Err(GpuError::ExecutionError(format!(
                "Image too large: {} threads requires {} workgroups, max supported is {}",
                threads,
                total_workgroups,
                MAX_WORKGROUPS_PER_DIM as u64 * MAX_WORKGROUPS_PER_DIM as u64
            )));
        }
        (side, y)
    };

    let mut encoder = context
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("compute_encoder"),
        });

    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("compute_pass"),
            timestamp_writes: None,
        });

        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(workgroups_x, workgroups_y, 1);
    }

    context.submit_and_wait(encoder);
    Ok(())
}

impl Arith for GpuImage {
    fn add(&self, rhs: &Self) -> Result<Self, DehazeError> {
        self.combined(rhs, &self.context.pipelines.add_buffers)
    }

    fn sub(&self, rhs: &Self) -> Result<Self, DehazeError> {
        self.combined(rhs, &self.context.pipelines.sub_buffers)
    }

    fn mul(&self, rhs: &Self) -> Result<Self, DehazeError> {
        self.combined(rhs, &self.context.pipelines.mul_buffers)
    }

    fn div(&self, rhs: &Self) -> Result<Self, DehazeError> {
        self.combined(rhs, &self.context.pipelines.div_buffers)
    }
}

impl ImageOps for GpuImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn channels(&self) -> u32 {
        self.channels
    }

    fn try_clone(&self) -> Result<Self, DehazeError> {
        Ok(self.copy_of()?)
    }

    fn to_host(&self) -> Result<HostImage, DehazeError> {
        let data = download_f32(
            &self.context.device,
            &self.context.queue,
            &self.buffer,
            self.element_count() as u64,
        )?;
        HostImage::new(self.width, self.height, self.channels, data)
    }

    fn scale_offset(self, scale: f32, offset: f32) -> Result<Self, DehazeError> {
        self.run_unary(&self.context.pipelines.scale_offset, scale, offset)?;
        Ok(self)
    }

    fn recip_scale(self, numerator: f32) -> Result<Self, DehazeError> {
        self.run_unary(&self.context.pipelines.recip_scale, numerator, 0.0)?;
        Ok(self)
    }

    fn exp(self) -> Result<Self, DehazeError> {
        self.run_unary(&self.context.pipelines.exp_values, 0.0, 0.0)?;
        Ok(self)
    }

    fn clip01(self) -> Result<Self, DehazeError> {
        self.run_unary(&self.context.pipelines.clip_unit, 0.0, 0.0)?;
        Ok(self)
    }

    fn patch_nan(self, floor: f32) -> Result<Self, DehazeError> {
        self.run_unary(&self.context.pipelines.patch_non_finite, floor, 0.0)?;
        Ok(self)
    }

    fn max_scalar(self, floor: f32) -> Result<Self, DehazeError> {
        self.run_unary(&self.context.pipelines.max_scalar, floor, 0.0)?;
        Ok(self)
    }

    fn min_with(self, rhs: &Self) -> Result<Self, DehazeError> {
        self.same_shape(rhs)?;
        Self::run_duo(
            &self.context,
            &self.context.pipelines.min_buffers,
            &self.buffer,
            &rhs.buffer,
            &ElemParams {
                len: self.element_count(),
                _pad: 0,
                p0: 0.0,
                p1: 0.0,
            },
            self.element_count(),
        )?;
        Ok(self)
    }

    fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Result<Self, DehazeError> {
        if x + width > self.width || y + height > self.height || width == 0 || height == 0 {
            return Err(DehazeError::InvalidDimensions(format!(
                "crop {}x{}+{}+{} outside {}x{}",
                width, height, x, y, self.width, self.height
            )));
        }
        let out = Self::alloc(self.context.clone(), width, height, self.channels, "crop_out");
        let params = StructParams {
            pixel_count: width * height,
            channel: 0,
            channels: self.channels,
            src_width: self.width,
            x,
            y,
            out_width: width,
            _pad: 0,
        };
        Self::run_duo(
            &self.context,
            &self.context.pipelines.crop,
            &out.buffer,
            &self.buffer,
            &params,
            out.element_count(),
        )?;
        Ok(out)
    }

    fn luma(&self) -> Result<Self, DehazeError> {
        self.require_rgb()?;
        let out = Self::alloc(self.context.clone(), self.width, self.height, 1, "luma_out");
        let params = StructParams {
            pixel_count: self.pixel_count(),
            channel: 0,
            channels: 3,
            src_width: self.width,
            x: 0,
            y: 0,
            out_width: self.width,
            _pad: 0,
        };
        Self::run_duo(
            &self.context,
            &self.context.pipelines.luma,
            &out.buffer,
            &self.buffer,
            &params,
            self.pixel_count(),
        )?;
        Ok(out)
    }

    fn min_channels(&self) -> Result<Self, DehazeError> {
        self.require_rgb()?;
        let out = Self::alloc(self.context.clone(), self.width, self.height, 1, "dark_out");
        let params = StructParams {
            pixel_count: self.pixel_count(),
            channel: 0,
            channels: 3,
            src_width: self.width,
            x: 0,
            y: 0,
            out_width: self.width,
            _pad: 0,
        };
        Self::run_duo(
            &self.context,
            &self.context.pipelines.min_channels,
            &out.buffer,
            &self.buffer,
            &params,
            self.pixel_count(),
        )?;
        Ok(out)
    }

    fn split(&self) -> Result<[Self; 3], DehazeError> {
        self.require_rgb()?;
        let mut planes = Vec::with_capacity(3);
        for channel in 0..3 {
            let out = Self::alloc(self.context.clone(), self.width, self.height, 1, "plane_out");
            let params = StructParams {
                pixel_count: self.pixel_count(),
                channel,
                channels: 3,
                src_width: self.width,
                x: 0,
                y: 0,
                out_width: self.width,
                _pad: 0,
            };
            Self::run_duo(
                &self.context,
                &self.context.pipelines.extract_channel,
                &out.buffer,
                &self.buffer,
                &params,
                self.pixel_count(),
            )?;
            planes.push(out);
        }
        Ok(planes
            .try_into()
            .unwrap_or_else(|_| unreachable!("three planes pushed above")))
    }

    fn merge(planes: [Self; 3]) -> Result<Self, DehazeError> {
        let [r, g, b] = &planes;
        r.same_shape(g)?;
        r.same_shape(b)?;
        if r.channels != 1 {
            return Err(DehazeError::InvalidDimensions(
                "merge expects single-channel planes".to_string(),
            ));
        }
        let out = Self::alloc(r.context.clone(), r.width, r.height, 3, "merge_out");
        for (channel, plane) in planes.iter().enumerate() {
            let params = StructParams {
                pixel_count: plane.pixel_count(),
                channel: channel as u32,
                channels: 3,
                src_width: plane.width,
                x: 0,
                y: 0,
                out_width: plane.width,
                _pad: 0,
            };
            Self::run_duo(
                &plane.context,
                &plane.context.pipelines.insert_channel,
                &out.buffer,
                &plane.buffer,
                &params,
                plane.pixel_count(),
            )?;
        }
        Ok(out)
    }

    fn erode(&self, radius: u32) -> Result<Self, DehazeError> {
        if radius == 0 {
            return self.try_clone();
        }
        self.separable(
            &self.context.pipelines.erode_h,
            &self.context.pipelines.erode_v,
            radius,
        )
    }

    fn box_filter(&self, radius: u32) -> Result<Self, DehazeError> {
        if radius == 0 {
            return self.try_clone();
        }
        self.separable(
            &self.context.pipelines.box_h,
            &self.context.pipelines.box_v,
            radius,
        )
    }

    fn mean(&self) -> Result<f32, DehazeError> {
        // global reduction consumed by a host-side branch: read back and sum
        let host = self.to_host()?;
        if host.data.is_empty() {
            return Err(DehazeError::InvalidDimensions(
                "mean of empty buffer".to_string(),
            ));
        }
        let sum: f64 = host.data.iter().map(|&v| v as f64).sum();
        Ok((sum / host.data.len() as f64) as f32)
    }
}
