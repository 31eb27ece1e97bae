//! Shared helpers for the dehaze binary: parameter resolution, image I/O,
//! and the stage-dump observer.

use std::path::{Path, PathBuf};

use dehaze_core::{HostImage, Parameters, StageObserver};

/// Per-field overrides collected from the command line.
#[derive(Debug, Default, Clone)]
pub struct ParameterOverrides {
    pub beta: Option<f32>,
    pub patch_radius: Option<u32>,
    pub decomposition_size: Option<u32>,
    pub t_min: Option<f32>,
    pub percentile: Option<f32>,
    pub refine_radius: Option<u32>,
    pub eps: Option<f32>,
}

/// Resolve the parameter set for one image: an explicit preset file wins,
/// otherwise the size-scaled defaults; individual flags override either.
pub fn resolve_parameters(
    preset: Option<&Path>,
    overrides: &ParameterOverrides,
    width: u32,
    height: u32,
    debug: bool,
) -> Result<Parameters, String> {
    let mut params = match preset {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read preset file: {}", e))?;
            serde_json::from_str(&json).map_err(|e| format!("Failed to parse preset: {}", e))?
        }
        None => Parameters::scaled_to(width, height),
    };
    if let Some(v) = overrides.beta {
        params.beta = v;
    }
    if let Some(v) = overrides.patch_radius {
        params.patch_radius = v;
    }
    if let Some(v) = overrides.decomposition_size {
        params.decomposition_size = v;
    }
    if let Some(v) = overrides.t_min {
        params.t_min = v;
    }
    if let Some(v) = overrides.percentile {
        params.percentile = v;
    }
    if let Some(v) = overrides.refine_radius {
        params.refine_radius = v;
    }
    if let Some(v) = overrides.eps {
        params.eps = v;
    }
    params.debug = debug;
    Ok(params)
}

/// Decode an image file into the normalized [0, 1] exchange format.
pub fn decode_image(path: &Path) -> Result<HostImage, String> {
    let decoded = image::open(path).map_err(|e| format!("Failed to decode {}: {}", path.display(), e))?;
    let rgb = decoded.to_rgb8();
    HostImage::from_rgb8(rgb.as_raw(), rgb.width(), rgb.height()).map_err(|e| e.to_string())
}

/// Encode a [0, 1] result as an 8-bit PNG.
pub fn save_image(image: &HostImage, path: &Path) -> Result<(), String> {
    let buffer = image::RgbImage::from_raw(image.width, image.height, image.to_rgb8())
        .ok_or_else(|| "output buffer size mismatch".to_string())?;
    buffer
        .save(path)
        .map_err(|e| format!("Failed to write {}: {}", path.display(), e))
}

/// Output path `<out_dir>/<stem>_dehazed.png`, defaulting to the input's
/// directory.
pub fn determine_output_path(
    input: &Path,
    out_dir: &Option<PathBuf>,
) -> Result<PathBuf, String> {
    let stem = input
        .file_stem()
        .ok_or_else(|| format!("Input has no file name: {}", input.display()))?;
    let dir = match out_dir {
        Some(dir) => dir.clone(),
        None => input.parent().unwrap_or_else(|| Path::new(".")).to_path_buf(),
    };
    let mut name = stem.to_os_string();
    name.push("_dehazed.png");
    Ok(dir.join(name))
}

/// Observer that writes each intermediate stage next to the output, named
/// `<stem>_<stage>.png`. Single-channel stages save as grayscale.
pub struct StageWriter {
    dir: PathBuf,
    stem: String,
    pub failures: Vec<String>,
}

impl StageWriter {
    pub fn new(dir: PathBuf, stem: String) -> Self {
        Self {
            dir,
            stem,
            failures: Vec::new(),
        }
    }
}

impl StageObserver for StageWriter {
    fn stage(&mut self, name: &str, image: &HostImage) {
        let path = self.dir.join(format!("{}_{}.png", self.stem, name));
        let bytes = image.to_rgb8();
        let result = if image.channels == 1 {
            image::GrayImage::from_raw(image.width, image.height, bytes)
                .ok_or_else(|| "stage buffer size mismatch".to_string())
                .and_then(|b| b.save(&path).map_err(|e| e.to_string()))
        } else {
            image::RgbImage::from_raw(image.width, image.height, bytes)
                .ok_or_else(|| "stage buffer size mismatch".to_string())
                .and_then(|b| b.save(&path).map_err(|e| e.to_string()))
        };
        if let Err(e) = result {
            // diagnostics never abort the run
            self.failures.push(format!("{}: {}", path.display(), e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win_over_scaled_defaults() {
        let overrides = ParameterOverrides {
            beta: Some(0.8),
            refine_radius: Some(12),
            ..Default::default()
        };
        let params = resolve_parameters(None, &overrides, 640, 480, false).unwrap();
        assert_eq!(params.beta, 0.8);
        assert_eq!(params.refine_radius, 12);
        // untouched fields come from the scaled defaults
        let defaults = Parameters::scaled_to(640, 480);
        assert_eq!(params.percentile, defaults.percentile);
    }

    #[test]
    fn output_path_appends_suffix() {
        let path = determine_output_path(Path::new("shots/foggy.jpg"), &None).unwrap();
        assert_eq!(path, PathBuf::from("shots/foggy_dehazed.png"));

        let out = Some(PathBuf::from("result"));
        let path = determine_output_path(Path::new("shots/foggy.jpg"), &out).unwrap();
        assert_eq!(path, PathBuf::from("result/foggy_dehazed.png"));
    }
}
