//! Patch filters: dark-channel and per-channel eroded minima.
//!
//! Both modes erode with a square structuring element of side
//! (2 * radius + 1) and reflect-101 borders, so edge pixels are never
//! artificially darkened. Radius 0 degenerates to the unfiltered minimum.

use crate::error::DehazeError;
use crate::image::ImageOps;

/// Per-pixel minimum across the three channels, then erosion.
/// Low everywhere except in hazy or sky regions.
pub fn dark_channel_patch<B: ImageOps>(image: &B, radius: u32) -> Result<B, DehazeError> {
    image.min_channels()?.erode(radius)
}

/// Each channel eroded independently with the same structuring element.
/// Feeds the per-channel transmission estimate.
pub fn color_channels_patch<B: ImageOps>(image: &B, radius: u32) -> Result<B, DehazeError> {
    let [r, g, b] = image.split()?;
    B::merge([r.erode(radius)?, g.erode(radius)?, b.erode(radius)?])
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
    fn radius_zero_is_the_plain_channel_minimum() {
        let img = rgb(2, 1, vec![0.4, 0.2, 0.8, 0.9, 0.5, 0.3]);
        let dark = dark_channel_patch(&img, 0).unwrap();
        assert_eq!(dark.channels(), 1);
        assert_eq!(dark.to_host().unwrap().data, vec![0.2, 0.3]);
    }

    #[test]
    fn erosion_spreads_the_darkest_pixel() {
        // one dark pixel in a bright 5x5 field dominates the full patch
        let mut data = vec![0.8f32; 75];
        let center = (2 * 5 + 2) * 3;
        data[center] = 0.05;
        data[center + 1] = 0.05;
        data[center + 2] = 0.05;
        let dark = dark_channel_patch(&rgb(5, 5, data), 2).unwrap();
        for v in dark.to_host().unwrap().data {
            assert!((v - 0.05).abs() < 1e-6);
        }
    }

    #[test]
    fn color_channels_erode_independently() {
        // a green dip at the center spreads to every window; an untouched
        // blue channel stays flat
        let mut data = vec![0.9f32; 3 * 9];
        data[4 * 3 + 1] = 0.2; // green at (1,1)
        let filtered = color_channels_patch(&rgb(3, 3, data), 1).unwrap();
        let host = filtered.to_host().unwrap();
        for p in host.data.chunks_exact(3) {
            assert!((p[0] - 0.9).abs() < 1e-6);
            assert!((p[1] - 0.2).abs() < 1e-6);
            assert!((p[2] - 0.9).abs() < 1e-6);
        }
    }
}
