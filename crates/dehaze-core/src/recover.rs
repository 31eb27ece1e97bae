//! Scene radiance recovery.

use crate::atmospheric::AtmosphericLight;
use crate::error::DehazeError;
use crate::image::{Arith, ImageOps};

/// Invert the haze model: J = (I - A) / max(t, floor) + A, clipped to [0, 1].
///
/// The transmission map is NaN-patched with the floor first, then floored, so
/// deeply hazed regions divide by `t_min` instead of blowing up. Both
/// substitutions are deliberate saturations, not error suppression.
pub fn recover_scene<B: ImageOps>(
    source: &B,
    transmission: B,
    light: &AtmosphericLight,
    t_min: f32,
) -> Result<B, DehazeError> {
    let AtmosphericLight(a) = *light;
    let t_planes = transmission.patch_nan(t_min)?.split()?;
    let src_planes = source.split()?;

    let mut recovered = Vec::with_capacity(3);
    for ((plane, t), a_c) in src_planes.into_iter().zip(t_planes).zip(a) {
        let t = t.max_scalar(t_min)?;
        recovered.push(
            plane
                .scale_offset(1.0, -a_c)?
                .div(&t)?
                .scale_offset(1.0, a_c)?,
        );
    }
    let [r, g, b]: [B; 3] = recovered
        .try_into()
        .map_err(|_| DehazeError::InvalidDimensions("expected 3 recovery planes".to_string()))?;
    B::merge([r, g, b])?.clip01()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuImage;
    use crate::image::HostImage;

    fn rgb(width: u32, height: u32, data: Vec<f32>) -> CpuImage {
        CpuImage::from_host(&HostImage::new(width, height, 3, data).unwrap()).unwrap()
    }

    #[test]
    fn identity_when_light_equals_pixel_and_full_transmission() {
        let source = rgb(2, 2, vec![0.3, 0.6, 0.9].repeat(4));
        let transmission = rgb(2, 2, vec![1.0; 12]);
        let light = AtmosphericLight([0.3, 0.6, 0.9]);
        let out = recover_scene(&source, transmission, &light, 0.1).unwrap();
        for (v, e) in out
            .to_host()
            .unwrap()
            .data
            .iter()
            .zip([0.3f32, 0.6, 0.9].repeat(4))
        {
            assert!((v - e).abs() < 1e-6);
        }
    }

    #[test]
    fn transmission_floor_bounds_the_division() {
        // zero transmission would divide by zero without the floor
        let source = rgb(1, 1, vec![0.2, 0.2, 0.2]);
        let transmission = rgb(1, 1, vec![0.0; 3]);
        let light = AtmosphericLight([0.8, 0.8, 0.8]);
        let out = recover_scene(&source, transmission, &light, 0.1).unwrap();
        for v in out.to_host().unwrap().data {
            assert!(v.is_finite());
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn nan_transmission_is_floored_before_use() {
        let source = rgb(1, 1, vec![0.5, 0.5, 0.5]);
        let transmission = rgb(1, 1, vec![f32::NAN; 3]);
        let light = AtmosphericLight([0.7, 0.7, 0.7]);
        let out = recover_scene(&source, transmission, &light, 0.25).unwrap();
        // (0.5 - 0.7) / 0.25 + 0.7 = -0.1, clipped to 0
        for v in out.to_host().unwrap().data {
            assert!((v - 0.0).abs() < 1e-6);
        }
    }

    #[test]
    fn output_is_clipped_to_unit_range() {
        let source = rgb(1, 1, vec![1.0, 0.0, 0.9]);
        let transmission = rgb(1, 1, vec![0.2; 3]);
        let light = AtmosphericLight([0.1, 0.9, 0.5]);
        let out = recover_scene(&source, transmission, &light, 0.1).unwrap();
        for v in out.to_host().unwrap().data {
            assert!((0.0..=1.0).contains(&v));
        }
    }
}
