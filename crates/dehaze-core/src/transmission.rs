//! First-pass transmission estimation.

use crate::atmospheric::AtmosphericLight;
use crate::error::DehazeError;
use crate::image::ImageOps;

/// Per channel: t = clip(1 - exp(-beta * A_c / colors_c)).
///
/// `colors` is the per-channel eroded minimum of the full source image.
/// Near-zero entries drive the exponent to large magnitudes; the clip
/// collapses the result into [0, 1] and NaN is left for the downstream
/// patch step.
pub fn estimate_transmission<B: ImageOps>(
    colors: B,
    light: &AtmosphericLight,
    beta: f32,
) -> Result<B, DehazeError> {
    let [r, g, b] = colors.split()?;
    let AtmosphericLight(a) = *light;
    let planes = [
        r.recip_scale(-beta * a[0])?,
        g.recip_scale(-beta * a[1])?,
        b.recip_scale(-beta * a[2])?,
    ];
    B::merge(planes)?.exp()?.scale_offset(-1.0, 1.0)?.clip01()
}
