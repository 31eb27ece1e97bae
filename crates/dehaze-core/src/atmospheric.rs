//! Atmospheric light estimation from the decomposed bright region.
//!
//! The ranking always runs host-side on both backends: the top-percentile
//! selection is a global sort, and its result is three scalars consumed by
//! every later stage.

use crate::error::DehazeError;
use crate::image::ImageOps;

/// The estimated airlight color, one value per channel, each in [0, 1].
/// Computed once per run and immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtmosphericLight(pub [f32; 3]);

/// Average the source colors of the brightest dark-channel pixels.
///
/// Both the region and its dark channel are quantized to 8-bit scale before
/// ranking, matching the pipeline's 8-bit input domain. The sort is stable
/// and descending, so equal intensities resolve by ascending pixel index,
/// the same deterministic order on every backend.
pub fn estimate_atmospheric_light<B: ImageOps>(
    region: &B,
    dark_channel: &B,
    percentile: f32,
) -> Result<AtmosphericLight, DehazeError> {
    if region.width() != dark_channel.width()
        || region.height() != dark_channel.height()
        || region.channels() != 3
        || dark_channel.channels() != 1
    {
        return Err(DehazeError::InvalidDimensions(format!(
            "dark channel {}x{}x{} does not match region {}x{}x{}",
            dark_channel.width(),
            dark_channel.height(),
            dark_channel.channels(),
            region.width(),
            region.height(),
            region.channels()
        )));
    }
    let colors = region.to_host()?;
    let dark = dark_channel.to_host()?;

    let dark_bytes: Vec<u8> = dark.data.iter().map(|&v| quantize8(v)).collect();
    let mut indices: Vec<usize> = (0..dark_bytes.len()).collect();
    indices.sort_by(|&a, &b| dark_bytes[b].cmp(&dark_bytes[a]));

    let top = ((dark_bytes.len() as f32 * percentile).round() as usize)
        .clamp(1, dark_bytes.len());
    let mut sums = [0f32; 3];
    for &idx in &indices[..top] {
        for (sum, &v) in sums.iter_mut().zip(&colors.data[idx * 3..idx * 3 + 3]) {
            *sum += quantize8(v) as f32;
        }
    }
    let n = top as f32;
    Ok(AtmosphericLight(sums.map(|s| s / n / 255.0)))
}

fn quantize8(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}
