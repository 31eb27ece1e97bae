//! Parity tests between the CPU and GPU backends.

use std::sync::Arc;

use super::*;
use crate::cpu::CpuImage;
use crate::image::{HostImage, ImageOps};
use crate::pipeline::{remove_haze, remove_haze_gpu, Parameters};

/// Generate a test gradient image
fn generate_test_gradient(width: u32, height: u32) -> HostImage {
    let mut data = Vec::with_capacity((width * height * 3) as usize);

    for y in 0..height {
        for x in 0..width {
            let r = x as f32 / (width - 1) as f32;
            let g = y as f32 / (height - 1) as f32;
            let b = ((x + y) as f32 / (width + height - 2) as f32).min(1.0);
            data.push(r);
            data.push(g);
            data.push(b);
        }
    }

    HostImage::new(width, height, 3, data).unwrap()
}

fn assert_close(cpu: &[f32], gpu: &[f32], tolerance: f32, what: &str) {
    assert_eq!(cpu.len(), gpu.len(), "{} length mismatch", what);
    let mut max_diff: f32 = 0.0;
    for (i, (a, b)) in cpu.iter().zip(gpu.iter()).enumerate() {
        let diff = (a - b).abs();
        max_diff = max_diff.max(diff);
        assert!(
            diff <= tolerance,
            "{} mismatch at index {}: CPU={}, GPU={}, diff={}",
            what,
            i,
            a,
            b,
            diff
        );
    }
    eprintln!("{}: max CPU/GPU difference {:.2e}", what, max_diff);
}

#[test]
fn test_gpu_available() {
    if !is_gpu_available() {
        eprintln!("GPU not available, skipping GPU tests");
        return;
    }

    let info = gpu_info().expect("Should get GPU info");
    eprintln!("GPU: {}", info);
}

#[test]
fn test_upload_download_roundtrip() {
    if !is_gpu_available() {
        return;
    }

    let ctx = Arc::new(GpuContext::new().expect("Failed to create GPU context"));

    let image = generate_test_gradient(32, 32);
    let gpu_image = GpuImage::upload(ctx, &image).expect("Failed to upload");
    let downloaded = gpu_image.to_host().expect("Failed to download");

    assert_close(&image.data, &downloaded.data, 1e-6, "roundtrip");
}

#[test]
fn test_elementwise_op_parity() {
    if !is_gpu_available() {
        return;
    }

    let ctx = Arc::new(GpuContext::new().expect("Failed to create GPU context"));
    let image = generate_test_gradient(48, 48);

    let cpu = CpuImage::from_host(&image)
        .unwrap()
        .scale_offset(-0.5, 1.0)
        .unwrap()
        .exp()
        .unwrap()
        .clip01()
        .unwrap();
    let gpu = GpuImage::upload(ctx, &image)
        .unwrap()
        .scale_offset(-0.5, 1.0)
        .unwrap()
        .exp()
        .unwrap()
        .clip01()
        .unwrap();

    assert_close(
        &cpu.to_host().unwrap().data,
        &gpu.to_host().unwrap().data,
        1e-5,
        "elementwise chain",
    );
}

#[test]
fn test_filter_parity() {
    if !is_gpu_available() {
        return;
    }

    let ctx = Arc::new(GpuContext::new().expect("Failed to create GPU context"));
    let image = generate_test_gradient(40, 28);

    let cpu_src = CpuImage::from_host(&image).unwrap();
    let gpu_src = GpuImage::upload(ctx, &image).unwrap();

    assert_close(
        &cpu_src.erode(3).unwrap().to_host().unwrap().data,
        &gpu_src.erode(3).unwrap().to_host().unwrap().data,
        1e-6,
        "erode",
    );
    assert_close(
        &cpu_src.box_filter(4).unwrap().to_host().unwrap().data,
        &gpu_src.box_filter(4).unwrap().to_host().unwrap().data,
        1e-4,
        "box filter",
    );
}

#[test]
fn test_split_merge_crop_parity() {
    if !is_gpu_available() {
        return;
    }

    let ctx = Arc::new(GpuContext::new().expect("Failed to create GPU context"));
    let image = generate_test_gradient(33, 21);

    let cpu_src = CpuImage::from_host(&image).unwrap();
    let gpu_src = GpuImage::upload(ctx, &image).unwrap();

    let cpu_merged = CpuImage::merge(cpu_src.split().unwrap()).unwrap();
    let gpu_merged = GpuImage::merge(gpu_src.split().unwrap()).unwrap();
    assert_close(
        &cpu_merged.to_host().unwrap().data,
        &gpu_merged.to_host().unwrap().data,
        1e-6,
        "split/merge",
    );

    assert_close(
        &cpu_src.crop(5, 3, 16, 12).unwrap().to_host().unwrap().data,
        &gpu_src.crop(5, 3, 16, 12).unwrap().to_host().unwrap().data,
        1e-6,
        "crop",
    );
    assert_close(
        &cpu_src.luma().unwrap().to_host().unwrap().data,
        &gpu_src.luma().unwrap().to_host().unwrap().data,
        1e-6,
        "luma",
    );
}

#[test]
fn test_full_pipeline_parity() {
    if !is_gpu_available() {
        eprintln!("GPU not available, skipping parity test");
        return;
    }

    let image = generate_test_gradient(96, 96);
    let params = Parameters {
        beta: 0.5,
        patch_radius: 2,
        decomposition_size: 16,
        t_min: 0.1,
        percentile: 0.2,
        refine_radius: 6,
        eps: 0.001,
        debug: false,
    };

    let cpu_result = remove_haze(&image, &params).expect("CPU processing failed");
    let gpu_result = remove_haze_gpu(&image, &params).expect("GPU processing failed");

    assert_eq!(cpu_result.width, gpu_result.width, "Width mismatch");
    assert_eq!(cpu_result.height, gpu_result.height, "Height mismatch");

    // floating-point accumulation differs slightly between backends
    assert_close(&cpu_result.data, &gpu_result.data, 1e-3, "pipeline output");
}
