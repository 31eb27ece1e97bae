//! Edge-aware transmission refinement: 3-channel-guide guided filter.
//!
//! Per window of radius `r`, fits each target channel as a linear function of
//! the three guide channels (coefficients `a`, intercept `b`), then box
//! filters the coefficients so every pixel blends the fits of all windows
//! containing it. The normal-equation solve is the analytic inverse of the
//! per-pixel 3x3 guide covariance, carried by [`SymMat3`].

use crate::error::DehazeError;
use crate::image::{Arith, ImageOps};
use crate::mat3::SymMat3;

/// Refine `target` (the raw transmission map) guided by `guide` (the source
/// image). Output channels correspond to target channels; the caller applies
/// the NaN patch and clip.
pub fn refine_transmission<B: ImageOps>(
    guide: &B,
    target: B,
    radius: u32,
    eps: f32,
) -> Result<B, DehazeError> {
    let [i_r, i_g, i_b] = guide.split()?;
    let mean_r = i_r.box_filter(radius)?;
    let mean_g = i_g.box_filter(radius)?;
    let mean_b = i_b.box_filter(radius)?;

    // local covariance of the guide, eps added to the diagonal
    let covariance = SymMat3 {
        rr: windowed_covariance(&i_r, &i_r, &mean_r, &mean_r, radius)?
            .scale_offset(1.0, eps)?,
        rg: windowed_covariance(&i_r, &i_g, &mean_r, &mean_g, radius)?,
        rb: windowed_covariance(&i_r, &i_b, &mean_r, &mean_b, radius)?,
        gg: windowed_covariance(&i_g, &i_g, &mean_g, &mean_g, radius)?
            .scale_offset(1.0, eps)?,
        gb: windowed_covariance(&i_g, &i_b, &mean_g, &mean_b, radius)?,
        bb: windowed_covariance(&i_b, &i_b, &mean_b, &mean_b, radius)?
            .scale_offset(1.0, eps)?,
    };
    let inverse = covariance.inverse()?;

    let planes = target.split()?;
    let mut refined = Vec::with_capacity(3);
    for p in planes {
        let mean_p = p.box_filter(radius)?;
        let cov_r = windowed_covariance(&i_r, &p, &mean_r, &mean_p, radius)?;
        let cov_g = windowed_covariance(&i_g, &p, &mean_g, &mean_p, radius)?;
        let cov_b = windowed_covariance(&i_b, &p, &mean_b, &mean_p, radius)?;

        let [a_r, a_g, a_b] = inverse.mul_vec([&cov_r, &cov_g, &cov_b])?;
        let intercept = mean_p
            .sub(&a_r.mul(&mean_r)?)?
            .sub(&a_g.mul(&mean_g)?)?
            .sub(&a_b.mul(&mean_b)?)?;

        // blend the per-window fits
        let a_r = a_r.box_filter(radius)?;
        let a_g = a_g.box_filter(radius)?;
        let a_b = a_b.box_filter(radius)?;
        let intercept = intercept.box_filter(radius)?;

        refined.push(
            a_r.mul(&i_r)?
                .add(&a_g.mul(&i_g)?)?
                .add(&a_b.mul(&i_b)?)?
                .add(&intercept)?,
        );
    }
    let [r, g, b]: [B; 3] = refined
        .try_into()
        .map_err(|_| DehazeError::InvalidDimensions("transmission map is not 3-channel".to_string()))?;
    B::merge([r, g, b])
}

/// box(x * y) - mean_x * mean_y
fn windowed_covariance<B: ImageOps>(
    x: &B,
    y: &B,
    mean_x: &B,
    mean_y: &B,
    radius: u32,
) -> Result<B, DehazeError> {
    x.mul(y)?.box_filter(radius)?.sub(&mean_x.mul(mean_y)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuImage;
    use crate::image::HostImage;

    fn rgb(width: u32, height: u32, data: Vec<f32>) -> CpuImage {
        CpuImage::from_host(&HostImage::new(width, height, 3, data).unwrap()).unwrap()
    }

    fn gradient_guide(width: u32, height: u32) -> CpuImage {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(x as f32 / (width - 1) as f32);
                data.push(y as f32 / (height - 1) as f32);
                data.push(0.5);
            }
        }
        rgb(width, height, data)
    }

    #[test]
    fn uniform_guide_and_target_pass_through() {
        // zero covariance everywhere: a collapses to 0, b to the local mean
        let guide = rgb(16, 16, vec![0.5; 16 * 16 * 3]);
        let target = rgb(16, 16, vec![0.4; 16 * 16 * 3]);
        let refined = refine_transmission(&guide, target, 4, 1e-4).unwrap();
        for v in refined.to_host().unwrap().data {
            assert!((v - 0.4).abs() < 1e-4);
        }
    }

    #[test]
    fn huge_eps_degenerates_to_box_blur() {
        let guide = gradient_guide(16, 16);
        let target_data: Vec<f32> = (0..16 * 16)
            .flat_map(|i| {
                let v = if (i / 16 + i % 16) % 2 == 0 { 0.2 } else { 0.8 };
                [v, v, v]
            })
            .collect();
        let target = rgb(16, 16, target_data.clone());
        let reference = rgb(16, 16, target_data);

        let refined = refine_transmission(&guide, target, 3, 1e6).unwrap();
        // double box filter: once for b = mean_p (a ~ 0), once blending windows
        let expected =
            CpuImage::merge(reference.split().unwrap().map(|p| {
                p.box_filter(3).unwrap().box_filter(3).unwrap()
            }))
            .unwrap();
        let refined = refined.to_host().unwrap();
        let expected = expected.to_host().unwrap();
        for (a, b) in refined.data.iter().zip(expected.data.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn preserves_a_sharp_guide_edge() {
        // guide and target share a vertical step; the refined map keeps the
        // step much sharper than a plain box blur would
        let (w, h) = (20u32, 20u32);
        let mut guide_data = Vec::new();
        let mut target_data = Vec::new();
        for _y in 0..h {
            for x in 0..w {
                let v = if x < w / 2 { 0.1 } else { 0.9 };
                guide_data.extend_from_slice(&[v, v, v]);
                target_data.extend_from_slice(&[v, v, v]);
            }
        }
        let guide = rgb(w, h, guide_data);
        let target = rgb(w, h, target_data);
        let refined = refine_transmission(&guide, target, 4, 1e-4).unwrap();
        let host = refined.to_host().unwrap();
        // sample mid-row either side of the edge
        let row = (h / 2) as usize * w as usize;
        let left = host.data[(row + 2) * 3];
        let right = host.data[(row + w as usize - 3) * 3];
        assert!(left < 0.2, "left of edge rose to {left}");
        assert!(right > 0.8, "right of edge fell to {right}");
    }

    #[test]
    fn output_matches_target_shape() {
        let guide = gradient_guide(12, 10);
        let target = rgb(12, 10, vec![0.5; 12 * 10 * 3]);
        let refined = refine_transmission(&guide, target, 2, 1e-3).unwrap();
        assert_eq!(refined.width(), 12);
        assert_eq!(refined.height(), 10);
        assert_eq!(refined.channels(), 3);
    }
}
