//! Compute pipeline creation for GPU operations.

use super::GpuError;
use crate::gpu::shaders::Shaders;

/// Pre-compiled compute pipelines for all GPU operations.
pub struct GpuPipelines {
    // Elementwise, single buffer in place
    pub scale_offset: wgpu::ComputePipeline,
    pub recip_scale: wgpu::ComputePipeline,
    pub exp_values: wgpu::ComputePipeline,
    pub clip_unit: wgpu::ComputePipeline,
    pub patch_non_finite: wgpu::ComputePipeline,
    pub max_scalar: wgpu::ComputePipeline,

    // Elementwise, destination combined with a second buffer
    pub add_buffers: wgpu::ComputePipeline,
    pub sub_buffers: wgpu::ComputePipeline,
    pub mul_buffers: wgpu::ComputePipeline,
    pub div_buffers: wgpu::ComputePipeline,
    pub min_buffers: wgpu::ComputePipeline,

    // Structural
    pub extract_channel: wgpu::ComputePipeline,
    pub insert_channel: wgpu::ComputePipeline,
    pub luma: wgpu::ComputePipeline,
    pub min_channels: wgpu::ComputePipeline,
    pub crop: wgpu::ComputePipeline,

    // Separable spatial filters
    pub erode_h: wgpu::ComputePipeline,
    pub erode_v: wgpu::ComputePipeline,
    pub box_h: wgpu::ComputePipeline,
    pub box_v: wgpu::ComputePipeline,

    // Cached bind group layouts
    /// Layout for one read-write storage buffer + uniform parameters
    pub unary_layout: wgpu::BindGroupLayout,
    /// Layout for destination (read-write) + source (read-only) + uniform
    pub duo_layout: wgpu::BindGroupLayout,
}

/// Create all compute pipelines from shader sources.
pub fn create_pipelines(device: &wgpu::Device) -> Result<GpuPipelines, GpuError> {
    let unary_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("unary"),
        source: wgpu::ShaderSource::Wgsl(Shaders::UNARY.into()),
    });

    let binary_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("binary"),
        source: wgpu::ShaderSource::Wgsl(Shaders::BINARY.into()),
    });

    let structural_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("structural"),
        source: wgpu::ShaderSource::Wgsl(Shaders::STRUCTURAL.into()),
    });

    let filters_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("filters"),
        source: wgpu::ShaderSource::Wgsl(Shaders::FILTERS.into()),
    });

    let unary_layout = create_unary_layout(device);
    let unary_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("unary_pipeline_layout"),
        bind_group_layouts: &[&unary_layout],
        push_constant_ranges: &[],
    });

    let duo_layout = create_duo_layout(device);
    let duo_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("duo_pipeline_layout"),
        bind_group_layouts: &[&duo_layout],
        push_constant_ranges: &[],
    });

    let unary = |label, entry| {
        create_compute_pipeline(device, label, &unary_pipeline_layout, &unary_module, entry)
    };
    let scale_offset = unary("scale_offset", "scale_offset");
    let recip_scale = unary("recip_scale", "recip_scale");
    let exp_values = unary("exp_values", "exp_values");
    let clip_unit = unary("clip_unit", "clip_unit");
    let patch_non_finite = unary("patch_non_finite", "patch_non_finite");
    let max_scalar = unary("max_scalar", "max_scalar");

    let binary = |label, entry| {
        create_compute_pipeline(device, label, &duo_pipeline_layout, &binary_module, entry)
    };
    let add_buffers = binary("add_buffers", "add_buffers");
    let sub_buffers = binary("sub_buffers", "sub_buffers");
    let mul_buffers = binary("mul_buffers", "mul_buffers");
    let div_buffers = binary("div_buffers", "div_buffers");
    let min_buffers = binary("min_buffers", "min_buffers");

    let structural = |label, entry| {
        create_compute_pipeline(
            device,
            label,
            &duo_pipeline_layout,
            &structural_module,
            entry,
        )
    };
    let extract_channel = structural("extract_channel", "extract_channel");
    let insert_channel = structural("insert_channel", "insert_channel");
    let luma = structural("luma", "luma");
    let min_channels = structural("min_channels", "min_channels");
    let crop = structural("crop", "crop");

    let filter = |label, entry| {
        create_compute_pipeline(device, label, &duo_pipeline_layout, &filters_module, entry)
    };
    let erode_h = filter("erode_h", "erode_h");
    let erode_v = filter("erode_v", "erode_v");
    let box_h = filter("box_h", "box_h");
    let box_v = filter("box_v", "box_v");

    Ok(GpuPipelines {
        scale_offset,
        recip_scale,
        exp_values,
        clip_unit,
        patch_non_finite,
        max_scalar,
        add_buffers,
        sub_buffers,
        mul_buffers,
        div_buffers,
        min_buffers,
        extract_channel,
        insert_channel,
        luma,
        min_channels,
        crop,
        erode_h,
        erode_v,
        box_h,
        box_v,
        unary_layout,
        duo_layout,
    })
}

fn create_unary_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("unary_layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    })
}

fn create_duo_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("duo_layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    })
}

fn create_compute_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    entry_point: &str,
) -> wgpu::ComputePipeline {
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        module,
        entry_point,
        compilation_options: Default::default(),
        cache: None,
    })
}
