//! Pipeline orchestration: parameter validation, stage sequencing, and the
//! public entry points for both backends.

use serde::{Deserialize, Serialize};

use crate::atmospheric::{estimate_atmospheric_light, AtmosphericLight};
use crate::cpu::CpuImage;
use crate::error::DehazeError;
use crate::guided::refine_transmission;
use crate::image::{HostImage, ImageOps};
use crate::patch::{color_channels_patch, dark_channel_patch};
use crate::quadtree::decompose;
use crate::recover::recover_scene;
use crate::transmission::estimate_transmission;

/// Haze-removal parameters. Every field is required; there are no hidden
/// defaults inside the pipeline. [`Parameters::scaled_to`] derives a working
/// set from the image dimensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameters {
    /// Haze coefficient in the transmission exponent (> 0)
    pub beta: f32,

    /// Dark-channel erosion radius; the structuring element has side
    /// 2 * radius + 1, radius 0 degenerates to the plain channel minimum
    pub patch_radius: u32,

    /// Quadtree floor: recursion stops before a quadrant side would drop to
    /// this size (> 0)
    pub decomposition_size: u32,

    /// Transmission and recovery floor, in (0, 1); also substituted for any
    /// NaN/Inf the covariance inversion produces
    pub t_min: f32,

    /// Fraction of brightest dark-channel pixels averaged into the
    /// atmospheric light, in (0, 1]
    pub percentile: f32,

    /// Guided-filter window radius (> 0)
    pub refine_radius: u32,

    /// Guided-filter regularizer added to the covariance diagonal (> 0)
    pub eps: f32,

    /// Emit `[DEBUG]`/`[WARN]` diagnostics on stderr
    #[serde(default)]
    pub debug: bool,
}

impl Parameters {
    /// Parameter set scaled to the image size: the patch base grows with the
    /// short image side, and the regularizer shrinks with it.
    pub fn scaled_to(width: u32, height: u32) -> Self {
        let patch = if height > width {
            (width as f32 * 0.01 + 1.0) as u32
        } else {
            (height as f32 * 0.001 + 1.0) as u32
        };
        let patch = patch.max(1);
        Self {
            beta: 0.5,
            patch_radius: patch / 2,
            decomposition_size: (patch / 2).max(1),
            t_min: 2.0 / 255.0,
            percentile: 0.5,
            refine_radius: patch * 2,
            eps: 0.001 / patch as f32,
            debug: false,
        }
    }

    pub fn validate(&self) -> Result<(), DehazeError> {
        if !(self.beta > 0.0 && self.beta.is_finite()) {
            return Err(DehazeError::InvalidParameter(format!(
                "beta must be a positive finite number, got {}",
                self.beta
            )));
        }
        if self.decomposition_size == 0 {
            return Err(DehazeError::InvalidParameter(
                "decomposition_size must be positive".to_string(),
            ));
        }
        if !(self.t_min > 0.0 && self.t_min < 1.0) {
            return Err(DehazeError::InvalidParameter(format!(
                "t_min must lie in (0, 1), got {}",
                self.t_min
            )));
        }
        if !(self.percentile > 0.0 && self.percentile <= 1.0) {
            return Err(DehazeError::InvalidParameter(format!(
                "percentile must lie in (0, 1], got {}",
                self.percentile
            )));
        }
        if self.refine_radius == 0 {
            return Err(DehazeError::InvalidParameter(
                "refine_radius must be positive".to_string(),
            ));
        }
        if !(self.eps > 0.0 && self.eps.is_finite()) {
            return Err(DehazeError::InvalidParameter(format!(
                "eps must be a positive finite number, got {}",
                self.eps
            )));
        }
        Ok(())
    }
}

/// Observer for intermediate pipeline artifacts.
///
/// Purely observational: nothing the observer does feeds back into the run,
/// and readback for it happens only when one is attached.
pub trait StageObserver {
    fn stage(&mut self, name: &str, image: &HostImage);
}

/// Stage names passed to [`StageObserver::stage`], in pipeline order.
pub const STAGE_NAMES: [&str; 5] = [
    "decomposed",
    "dark_channel",
    "color_channels",
    "transmission",
    "refined_transmission",
];

fn emit<B: ImageOps>(
    observer: &mut Option<&mut dyn StageObserver>,
    name: &str,
    buffer: &B,
) -> Result<(), DehazeError> {
    if let Some(obs) = observer {
        obs.stage(name, &buffer.to_host()?);
    }
    Ok(())
}

/// Run the full dehazing sequence on an uploaded source buffer.
///
/// One linear path: decompose -> dark channel -> atmospheric light ->
/// per-channel minimum patch -> transmission -> guided refinement ->
/// recovery. Any validation failure aborts before the first filter runs; no
/// state survives the call.
pub fn run_pipeline<B: ImageOps>(
    source: B,
    params: &Parameters,
    mut observer: Option<&mut dyn StageObserver>,
) -> Result<B, DehazeError> {
    params.validate()?;
    validate_dimensions(&source, params)?;

    let region = decompose(&source, params.decomposition_size)?;
    emit(&mut observer, "decomposed", &region)?;

    let dark = dark_channel_patch(&region, params.patch_radius)?;
    emit(&mut observer, "dark_channel", &dark)?;

    let light = estimate_atmospheric_light(&region, &dark, params.percentile)?;
    drop((region, dark));
    if params.debug {
        let AtmosphericLight(a) = light;
        eprintln!(
            "[DEBUG] atmospheric light: [{:.4}, {:.4}, {:.4}]",
            a[0], a[1], a[2]
        );
    }

    let colors = color_channels_patch(&source, params.patch_radius)?;
    emit(&mut observer, "color_channels", &colors)?;

    let transmission = estimate_transmission(colors, &light, params.beta)?;
    emit(&mut observer, "transmission", &transmission)?;

    let refined = refine_transmission(&source, transmission, params.refine_radius, params.eps)?;
    if params.debug {
        let degenerate = refined
            .to_host()?
            .data
            .iter()
            .filter(|v| !v.is_finite())
            .count();
        if degenerate > 0 {
            eprintln!(
                "[WARN] {} degenerate transmission values floored to {}",
                degenerate, params.t_min
            );
        }
    }
    let refined = refined.patch_nan(params.t_min)?.clip01()?;
    emit(&mut observer, "refined_transmission", &refined)?;

    recover_scene(&source, refined, &light, params.t_min)
}

fn validate_dimensions<B: ImageOps>(source: &B, params: &Parameters) -> Result<(), DehazeError> {
    let (w, h) = (source.width(), source.height());
    if w == 0 || h == 0 {
        return Err(DehazeError::InvalidDimensions(format!(
            "zero-size image {}x{}",
            w, h
        )));
    }
    if source.channels() != 3 {
        return Err(DehazeError::InvalidDimensions(format!(
            "pipeline requires a 3-channel image, got {} channels",
            source.channels()
        )));
    }
    // the quadtree must be able to subdivide at least once
    let floor = 2 * params.decomposition_size;
    if w <= floor || h <= floor {
        return Err(DehazeError::InvalidDimensions(format!(
            "{}x{} image cannot hold two {}-pixel quadtree windows per side",
            w, h, params.decomposition_size
        )));
    }
    Ok(())
}

/// Remove haze on the sequential reference backend.
pub fn remove_haze(image: &HostImage, params: &Parameters) -> Result<HostImage, DehazeError> {
    remove_haze_with_observer(image, params, None)
}

/// Reference backend with an intermediate-stage observer attached.
pub fn remove_haze_with_observer(
    image: &HostImage,
    params: &Parameters,
    observer: Option<&mut dyn StageObserver>,
) -> Result<HostImage, DehazeError> {
    let source = CpuImage::from_host(image)?;
    run_pipeline(source, params, observer)?.to_host()
}

/// Remove haze on the wgpu backend. Device failures surface as
/// [`DehazeError::Device`] and are not retried here; callers wanting a
/// fallback re-run on [`remove_haze`].
#[cfg(feature = "gpu")]
pub fn remove_haze_gpu(image: &HostImage, params: &Parameters) -> Result<HostImage, DehazeError> {
    remove_haze_gpu_with_observer(image, params, None)
}

/// Accelerated backend with an intermediate-stage observer attached.
///
/// The device context lives for exactly one run; every device buffer is
/// released when the run ends, success or failure.
#[cfg(feature = "gpu")]
pub fn remove_haze_gpu_with_observer(
    image: &HostImage,
    params: &Parameters,
    observer: Option<&mut dyn StageObserver>,
) -> Result<HostImage, DehazeError> {
    use std::sync::Arc;

    let context = Arc::new(crate::gpu::GpuContext::new()?);
    let source = crate::gpu::GpuImage::upload(context, image)?;
    run_pipeline(source, params, observer)?.to_host()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_params() -> Parameters {
        Parameters {
            beta: 0.5,
            patch_radius: 2,
            decomposition_size: 32,
            t_min: 0.1,
            percentile: 0.1,
            refine_radius: 8,
            eps: 0.0004,
            debug: false,
        }
    }

    fn uniform_gray(size: u32, value: f32) -> HostImage {
        HostImage::new(size, size, 3, vec![value; (size * size * 3) as usize]).unwrap()
    }

    struct CollectingObserver(Vec<String>);

    impl StageObserver for CollectingObserver {
        fn stage(&mut self, name: &str, _image: &HostImage) {
            self.0.push(name.to_string());
        }
    }

    #[test]
    fn uniform_gray_is_a_fixed_point() {
        // a structureless image carries no haze signal: atmospheric light
        // matches the pixel value and recovery is a no-op up to the 8-bit
        // quantization of the airlight estimate
        let image = uniform_gray(256, 0.5);
        let out = remove_haze(&image, &test_params()).unwrap();
        assert_eq!(out.width, 256);
        assert_eq!(out.height, 256);
        for v in out.data {
            assert!((v - 0.5).abs() < 0.01, "recovered {} drifted from 0.5", v);
        }
    }

    #[test]
    fn uniform_gray_atmospheric_light_matches_pixel() {
        use crate::atmospheric::estimate_atmospheric_light;
        use crate::cpu::CpuImage;
        use crate::patch::dark_channel_patch;
        use crate::quadtree::decompose;

        let image = CpuImage::from_host(&uniform_gray(256, 0.5)).unwrap();
        let region = decompose(&image, 32).unwrap();
        let dark = dark_channel_patch(&region, 2).unwrap();
        let AtmosphericLight(a) = estimate_atmospheric_light(&region, &dark, 0.1).unwrap();
        for v in a {
            assert!((v - 0.5).abs() <= 1.0 / 255.0);
        }
    }

    #[test]
    fn gradient_output_stays_in_unit_range() {
        let (w, h) = (96u32, 80u32);
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                data.push(x as f32 / (w - 1) as f32);
                data.push(y as f32 / (h - 1) as f32);
                data.push(0.7);
            }
        }
        let image = HostImage::new(w, h, 3, data).unwrap();
        let mut params = test_params();
        params.decomposition_size = 16;
        let out = remove_haze(&image, &params).unwrap();
        assert_eq!(out.element_count(), (w * h * 3) as usize);
        for v in out.data {
            assert!(v.is_finite());
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn observer_sees_every_stage_in_order() {
        let image = uniform_gray(80, 0.4);
        let mut params = test_params();
        params.decomposition_size = 16;
        let mut observer = CollectingObserver(Vec::new());
        remove_haze_with_observer(&image, &params, Some(&mut observer)).unwrap();
        assert_eq!(observer.0, STAGE_NAMES);
    }

    #[test]
    fn zero_size_image_rejected() {
        let image = HostImage::new(0, 0, 3, Vec::new()).unwrap();
        assert!(matches!(
            remove_haze(&image, &test_params()),
            Err(DehazeError::InvalidDimensions(_))
        ));
    }

    #[test]
    fn undersized_image_rejected() {
        // 64 per side cannot hold two 32-pixel windows strictly
        let image = uniform_gray(64, 0.5);
        assert!(matches!(
            remove_haze(&image, &test_params()),
            Err(DehazeError::InvalidDimensions(_))
        ));
    }

    #[test]
    fn invalid_parameters_rejected_before_filtering() {
        let image = uniform_gray(128, 0.5);
        for (field, value) in [
            ("beta", -1.0f32),
            ("t_min", 0.0),
            ("percentile", 0.0),
            ("eps", 0.0),
        ] {
            let mut params = test_params();
            match field {
                "beta" => params.beta = value,
                "t_min" => params.t_min = value,
                "percentile" => params.percentile = value,
                _ => params.eps = value,
            }
            assert!(
                matches!(
                    remove_haze(&image, &params),
                    Err(DehazeError::InvalidParameter(_))
                ),
                "{} = {} should be rejected",
                field,
                value
            );
        }
    }

    #[test]
    fn percentile_above_one_rejected() {
        let mut params = test_params();
        params.percentile = 1.5;
        assert!(params.validate().is_err());
    }

    #[test]
    fn scaled_parameters_are_valid_for_typical_sizes() {
        for (w, h) in [(640, 480), (480, 640), (4000, 3000), (120, 90)] {
            let params = Parameters::scaled_to(w, h);
            params.validate().unwrap();
        }
    }

    #[test]
    fn parameters_round_trip_through_serde() {
        let params = test_params();
        let json = serde_json::to_string(&params).unwrap();
        let back: Parameters = serde_json::from_str(&json).unwrap();
        assert_eq!(back.beta, params.beta);
        assert_eq!(back.refine_radius, params.refine_radius);
        assert_eq!(back.debug, params.debug);
    }
}
