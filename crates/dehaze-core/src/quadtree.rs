//! Quadtree search for the brightest image region.
//!
//! Repeatedly quarters the current region and descends into the quadrant
//! with the highest mean luma, stopping once a further split would drop a
//! quadrant below the window size. The surviving crop approximates the
//! haze/sky source sampled by the atmospheric-light estimator, replacing an
//! exhaustive dark-channel scan with a logarithmic-depth search.

use crate::error::DehazeError;
use crate::image::ImageOps;

/// Narrow `image` down to its brightest sub-quadrant of at least
/// `window` x `window` pixels. An input already smaller than twice the window
/// in either dimension is returned unchanged (cropped to itself).
///
/// Ties between quadrant means resolve in reading order: top-left, top-right,
/// bottom-right, bottom-left.
pub fn decompose<B: ImageOps>(image: &B, window: u32) -> Result<B, DehazeError> {
    if window == 0 {
        return Err(DehazeError::InvalidParameter(
            "decomposition window must be positive".to_string(),
        ));
    }
    let mut region = image.try_clone()?;
    loop {
        let (w, h) = (region.width(), region.height());
        if w / 2 <= window || h / 2 <= window {
            return Ok(region);
        }
        let (hw, hh) = (w / 2, h / 2);
        // right/bottom quadrants absorb the odd column/row
        let quadrants = [
            (0, 0, hw, hh),
            (hw, 0, w - hw, hh),
            (hw, hh, w - hw, h - hh),
            (0, hh, hw, h - hh),
        ];
        let luma = region.luma()?;
        let mut best = quadrants[0];
        let mut best_mean = f32::NEG_INFINITY;
        for &(x, y, qw, qh) in &quadrants {
            let mean = luma.crop(x, y, qw, qh)?.mean()?;
            if mean > best_mean {
                best_mean = mean;
                best = (x, y, qw, qh);
            }
        }
        region = region.crop(best.0, best.1, best.2, best.3)?;
    }
}
