//! Sequential reference backend.
//!
//! Straight-line, single-threaded loops over interleaved `f32` data. The
//! chunked iteration patterns leave the inner loops open to compiler
//! auto-vectorization, but no threads or tasks are spawned here; batch-level
//! parallelism belongs to the caller.

use crate::error::DehazeError;
use crate::image::{Arith, HostImage, ImageOps, LUMA_WEIGHTS};

/// CPU image buffer: interleaved row-major `f32` planes.
#[derive(Debug, Clone)]
pub struct CpuImage {
    width: u32,
    height: u32,
    channels: u32,
    data: Vec<f32>,
}

impl CpuImage {
    pub fn from_host(image: &HostImage) -> Result<Self, DehazeError> {
        Ok(Self {
            width: image.width,
            height: image.height,
            channels: image.channels,
            data: image.data.clone(),
        })
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

    fn zip_map(&self, rhs: &Self, f: impl Fn(f32, f32) -> f32) -> Result<Self, DehazeError> {
        self.same_shape(rhs)?;
        let data = self
            .data
            .iter()
            .zip(rhs.data.iter())
            .map(|(&a, &b)| f(a, b))
            .collect();
        Ok(Self {
            width: self.width,
            height: self.height,
            channels: self.channels,
            data,
        })
    }

    fn map_in_place(mut self, f: impl Fn(f32) -> f32) -> Self {
        for v in self.data.iter_mut() {
            *v = f(*v);
        }
        self
    }

    /// One horizontal then one vertical pass of `reduce` over a
    /// (2*radius+1) window per axis, reflect-101 at the borders.
    fn separable_pass(
        &self,
        radius: u32,
        reduce: impl Fn(&[f32]) -> f32 + Copy,
    ) -> Self {
        let horizontal = self.axis_pass(radius, true, reduce);
        horizontal.axis_pass(radius, false, reduce)
    }

    fn axis_pass(&self, radius: u32, horizontal: bool, reduce: impl Fn(&[f32]) -> f32) -> Self {
        let (w, h, c) = (self.width as usize, self.height as usize, self.channels as usize);
        let r = radius as i64;
        let mut out = vec![0.0f32; self.data.len()];
        let mut window = vec![0.0f32; 2 * radius as usize + 1];
        let len = if horizontal { w } else { h };
        let lines = if horizontal { h } else { w };
        for line in 0..lines {
            for ch in 0..c {
                for i in 0..len {
                    for (k, slot) in window.iter_mut().enumerate() {
                        let j = mirror101(i as i64 + k as i64 - r, len);
                        let (x, y) = if horizontal { (j, line) } else { (line, j) };
                        *slot = self.data[(y * w + x) * c + ch];
                    }
                    let (x, y) = if horizontal { (i, line) } else { (line, i) };
                    out[(y * w + x) * c + ch] = reduce(&window);
                }
            }
        }
        Self {
            width: self.width,
            height: self.height,
            channels: self.channels,
            data: out,
        }
    }
}

/// Reflect-101 border index: ...3 2 1 | 0 1 2 3 | 2 1 0...
pub(crate) fn mirror101(i: i64, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * len as i64 - 2;
    let mut m = i.rem_euclid(period);
    if m >= len as i64 {
        m = period - m;
    }
    m as usize
}

impl Arith for CpuImage {
    fn add(&self, rhs: &Self) -> Result<Self, DehazeError> {
        self.zip_map(rhs, |a, b| a + b)
    }

    fn sub(&self, rhs: &Self) -> Result<Self, DehazeError> {
        self.zip_map(rhs, |a, b| a - b)
    }

    fn mul(&self, rhs: &Self) -> Result<Self, DehazeError> {
        self.zip_map(rhs, |a, b| a * b)
    }

    fn div(&self, rhs: &Self) -> Result<Self, DehazeError> {
        self.zip_map(rhs, |a, b| a / b)
    }
}

impl ImageOps for CpuImage {
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
        Ok(self.clone())
    }

    fn to_host(&self) -> Result<HostImage, DehazeError> {
        HostImage::new(self.width, self.height, self.channels, self.data.clone())
    }

    fn scale_offset(self, scale: f32, offset: f32) -> Result<Self, DehazeError> {
        Ok(self.map_in_place(|v| v * scale + offset))
    }

    fn recip_scale(self, numerator: f32) -> Result<Self, DehazeError> {
        Ok(self.map_in_place(|v| numerator / v))
    }

    fn exp(self) -> Result<Self, DehazeError> {
        Ok(self.map_in_place(f32::exp))
    }

    fn clip01(self) -> Result<Self, DehazeError> {
        // min-then-max keeps NaN in place for the downstream patch step
        Ok(self.map_in_place(|v| v.min(1.0).max(0.0)))
    }

    fn patch_nan(self, floor: f32) -> Result<Self, DehazeError> {
        Ok(self.map_in_place(|v| if v.is_finite() { v } else { floor }))
    }

    fn max_scalar(self, floor: f32) -> Result<Self, DehazeError> {
        Ok(self.map_in_place(|v| v.max(floor)))
    }

    fn min_with(self, rhs: &Self) -> Result<Self, DehazeError> {
        self.zip_map(rhs, f32::min)
    }

    fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Result<Self, DehazeError> {
        if x + width > self.width || y + height > self.height || width == 0 || height == 0 {
            return Err(DehazeError::InvalidDimensions(format!(
                "crop {}x{}+{}+{} outside {}x{}",
                width, height, x, y, self.width, self.height
            )));
        }
        let c = self.channels as usize;
        let row_len = width as usize * c;
        let mut data = Vec::with_capacity(height as usize * row_len);
        for row in y..y + height {
            let start = (row as usize * self.width as usize + x as usize) * c;
            data.extend_from_slice(&self.data[start..start + row_len]);
        }
        Ok(Self {
            width,
            height,
            channels: self.channels,
            data,
        })
    }

    fn luma(&self) -> Result<Self, DehazeError> {
        require_rgb(self.channels)?;
        let data = self
            .data
            .chunks_exact(3)
            .map(|p| p[0] * LUMA_WEIGHTS[0] + p[1] * LUMA_WEIGHTS[1] + p[2] * LUMA_WEIGHTS[2])
            .collect();
        Ok(Self {
            width: self.width,
            height: self.height,
            channels: 1,
            data,
        })
    }

    fn split(&self) -> Result<[Self; 3], DehazeError> {
        require_rgb(self.channels)?;
        let mut planes = [(); 3].map(|_| Vec::with_capacity(self.data.len() / 3));
        for p in self.data.chunks_exact(3) {
            for (plane, &v) in planes.iter_mut().zip(p) {
                plane.push(v);
            }
        }
        Ok(planes.map(|data| Self {
            width: self.width,
            height: self.height,
            channels: 1,
            data,
        }))
    }

    fn merge(planes: [Self; 3]) -> Result<Self, DehazeError> {
        let [r, g, b] = planes;
        r.same_shape(&g)?;
        r.same_shape(&b)?;
        if r.channels != 1 {
            return Err(DehazeError::InvalidDimensions(
                "merge expects single-channel planes".to_string(),
            ));
        }
        let mut data = Vec::with_capacity(r.data.len() * 3);
        for i in 0..r.data.len() {
            data.push(r.data[i]);
            data.push(g.data[i]);
            data.push(b.data[i]);
        }
        Ok(Self {
            width: r.width,
            height: r.height,
            channels: 3,
            data,
        })
    }

    fn erode(&self, radius: u32) -> Result<Self, DehazeError> {
        if radius == 0 {
            return self.try_clone();
        }
        Ok(self.separable_pass(radius, |window| {
            window.iter().copied().fold(f32::INFINITY, f32::min)
        }))
    }

    fn box_filter(&self, radius: u32) -> Result<Self, DehazeError> {
        if radius == 0 {
            return self.try_clone();
        }
        let norm = 1.0 / (2 * radius + 1) as f32;
        Ok(self.separable_pass(radius, |window| window.iter().sum::<f32>() * norm))
    }

    fn mean(&self) -> Result<f32, DehazeError> {
        if self.data.is_empty() {
            return Err(DehazeError::InvalidDimensions(
                "mean of empty buffer".to_string(),
            ));
        }
        let sum: f64 = self.data.iter().map(|&v| v as f64).sum();
        Ok((sum / self.data.len() as f64) as f32)
    }
}

fn require_rgb(channels: u32) -> Result<(), DehazeError> {
    if channels != 3 {
        return Err(DehazeError::InvalidDimensions(format!(
            "operation requires a 3-channel image, got {}",
            channels
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane(width: u32, height: u32, data: Vec<f32>) -> CpuImage {
        CpuImage::from_host(&HostImage::new(width, height, 1, data).unwrap()).unwrap()
    }

    #[test]
    fn mirror101_reflects_both_edges() {
        assert_eq!(mirror101(-1, 5), 1);
        assert_eq!(mirror101(-2, 5), 2);
        assert_eq!(mirror101(0, 5), 0);
        assert_eq!(mirror101(4, 5), 4);
        assert_eq!(mirror101(5, 5), 3);
        assert_eq!(mirror101(6, 5), 2);
        assert_eq!(mirror101(3, 1), 0);
    }

    #[test]
    fn clip01_bounds_and_is_idempotent() {
        let img = plane(4, 1, vec![-0.5, 0.25, 1.5, 0.0]);
        let once = img.clip01().unwrap();
        assert_eq!(once.data, vec![0.0, 0.25, 1.0, 0.0]);
        let twice = once.try_clone().unwrap().clip01().unwrap();
        assert_eq!(once.data, twice.data);
    }

    #[test]
    fn clip01_keeps_nan_for_patch_step() {
        let img = plane(2, 1, vec![f32::NAN, 2.0]);
        let clipped = img.clip01().unwrap();
        assert!(clipped.data[0].is_nan());
        let patched = clipped.patch_nan(0.1).unwrap();
        assert_eq!(patched.data, vec![0.1, 1.0]);
    }

    #[test]
    fn patch_nan_replaces_infinities() {
        let img = plane(3, 1, vec![f32::INFINITY, f32::NEG_INFINITY, 0.5]);
        let patched = img.patch_nan(0.2).unwrap();
        assert_eq!(patched.data, vec![0.2, 0.2, 0.5]);
    }

    #[test]
    fn split_merge_round_trip() {
        let host = HostImage::new(2, 2, 3, (0..12).map(|i| i as f32).collect()).unwrap();
        let img = CpuImage::from_host(&host).unwrap();
        let planes = img.split().unwrap();
        assert_eq!(planes[1].data, vec![1.0, 4.0, 7.0, 10.0]);
        let merged = CpuImage::merge(planes).unwrap();
        assert_eq!(merged.to_host().unwrap(), host);
    }

    #[test]
    fn min_channels_takes_per_pixel_minimum() {
        let img = CpuImage::from_host(
            &HostImage::new(2, 1, 3, vec![0.3, 0.1, 0.9, 0.5, 0.6, 0.2]).unwrap(),
        )
        .unwrap();
        let dark = img.min_channels().unwrap();
        assert_eq!(dark.data, vec![0.1, 0.2]);
    }

    #[test]
    fn erode_radius_zero_is_identity() {
        let img = plane(3, 1, vec![0.3, 0.1, 0.9]);
        assert_eq!(img.erode(0).unwrap().data, img.data);
    }

    #[test]
    fn erode_takes_window_minimum() {
        let img = plane(3, 3, vec![0.9, 0.8, 0.7, 0.6, 0.5, 0.4, 0.3, 0.2, 0.1]);
        let eroded = img.erode(1).unwrap();
        // full window fits at the center
        assert!((eroded.data[4] - 0.1).abs() < 1e-6);
        // top-left window mirrors row/column 1, never row/column 2
        assert!((eroded.data[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn box_filter_of_constant_is_constant() {
        let img = plane(8, 8, vec![0.37; 64]);
        let blurred = img.box_filter(3).unwrap();
        for v in blurred.data {
            assert!((v - 0.37).abs() < 1e-6);
        }
    }

    #[test]
    fn box_filter_keeps_ramp_interior_linear() {
        let img = plane(7, 1, (0..7).map(|i| i as f32).collect());
        let blurred = img.box_filter(2).unwrap();
        for (i, v) in blurred.data.iter().enumerate().take(5).skip(2) {
            assert!((v - i as f32).abs() < 1e-5);
        }
    }

    #[test]
    fn crop_extracts_region() {
        let host = HostImage::new(3, 2, 1, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let img = CpuImage::from_host(&host).unwrap();
        let sub = img.crop(1, 0, 2, 2).unwrap();
        assert_eq!(sub.data, vec![2.0, 3.0, 5.0, 6.0]);
    }

    #[test]
    fn crop_out_of_bounds_fails() {
        let img = plane(3, 3, vec![0.0; 9]);
        assert!(img.crop(2, 0, 2, 2).is_err());
    }

    #[test]
    fn luma_weights_rgb() {
        let img = CpuImage::from_host(&HostImage::new(1, 1, 3, vec![1.0, 0.0, 0.0]).unwrap())
            .unwrap();
        assert!((img.luma().unwrap().data[0] - 0.299).abs() < 1e-6);
    }

    #[test]
    fn mean_averages_all_elements() {
        let img = plane(2, 2, vec![0.0, 1.0, 1.0, 0.0]);
        assert!((img.mean().unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn arith_shape_mismatch_fails() {
        let a = plane(2, 1, vec![1.0, 2.0]);
        let b = plane(1, 2, vec![1.0, 2.0]);
        assert!(a.add(&b).is_err());
    }
}
