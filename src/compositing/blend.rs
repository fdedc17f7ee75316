use super::refine::AlphaMasks;
use crate::error::{CloakError, CloakResult};
use image::{imageops, RgbImage};

/// Resample the background to the live frame's resolution
///
/// Runs every frame; no resized copy is cached.
pub fn fit_background(background: &RgbImage, width: u32, height: u32) -> CloakResult<RgbImage> {
    if background.width() == 0 || background.height() == 0 || width == 0 || height == 0 {
        return Err(CloakError::EmptyFrame);
    }

    if background.dimensions() == (width, height) {
        return Ok(background.clone());
    }

    tracing::trace!(
        "Resampling background {}x{} -> {}x{}",
        background.width(),
        background.height(),
        width,
        height
    );
    Ok(imageops::resize(
        background,
        width,
        height,
        imageops::FilterType::Triangle,
    ))
}

/// Blend background and live frame per channel
///
/// `out = mask * background + inverse * live`, clamped and truncated to 8 bits.
/// `background` must already match the live frame's dimensions.
pub fn blend(live: &RgbImage, background: &RgbImage, alpha: &AlphaMasks) -> RgbImage {
    let _span = tracing::debug_span!("blend").entered();

    let (width, height) = live.dimensions();
    debug_assert_eq!(background.dimensions(), (width, height));
    debug_assert_eq!(alpha.dimensions(), (width, height));

    let mut output = RgbImage::new(width, height);
    for (x, y, out) in output.enumerate_pixels_mut() {
        let idx = [y as usize, x as usize];
        let m = alpha.mask[idx];
        let inv = alpha.inverse[idx];
        let bg = background.get_pixel(x, y);
        let fg = live.get_pixel(x, y);

        for c in 0..3 {
            let value = m * bg[c] as f32 + inv * fg[c] as f32;
            out[c] = value.clamp(0.0, 255.0) as u8;
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use image::Rgb;

    fn uniform_alpha(width: u32, height: u32, mask: f32, inverse: f32) -> AlphaMasks {
        let shape = (height as usize, width as usize);
        AlphaMasks {
            mask: Array2::from_elem(shape, mask),
            inverse: Array2::from_elem(shape, inverse),
        }
    }

    #[test]
    fn zero_mask_passes_live_frame_through() {
        let live = RgbImage::from_fn(4, 4, |x, y| Rgb([x as u8 * 40, y as u8 * 40, 200]));
        let background = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));

        let out = blend(&live, &background, &uniform_alpha(4, 4, 0.0, 1.0));
        assert_eq!(out, live);
    }

    #[test]
    fn full_mask_shows_background() {
        let live = RgbImage::from_pixel(3, 2, Rgb([250, 10, 10]));
        let background = RgbImage::from_pixel(3, 2, Rgb([20, 120, 220]));

        let out = blend(&live, &background, &uniform_alpha(3, 2, 1.0, 0.0));
        assert_eq!(out, background);
    }

    #[test]
    fn overweighted_sum_is_clamped() {
        let live = RgbImage::from_pixel(1, 1, Rgb([255, 255, 255]));
        let background = RgbImage::from_pixel(1, 1, Rgb([255, 255, 255]));

        let out = blend(&live, &background, &uniform_alpha(1, 1, 0.6, 0.6));
        assert_eq!(out.get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[test]
    fn half_weights_truncate() {
        let live = RgbImage::from_pixel(1, 1, Rgb([101, 0, 0]));
        let background = RgbImage::from_pixel(1, 1, Rgb([0, 0, 0]));

        let out = blend(&live, &background, &uniform_alpha(1, 1, 0.5, 0.5));
        assert_eq!(out.get_pixel(0, 0)[0], 50);
    }

    #[test]
    fn background_is_resampled_to_frame_size() {
        let background = RgbImage::from_pixel(8, 6, Rgb([30, 60, 90]));

        let fitted = fit_background(&background, 4, 3).unwrap();
        assert_eq!(fitted.dimensions(), (4, 3));
        assert!(fitted.pixels().all(|p| p.0 == [30, 60, 90]));

        let same = fit_background(&background, 8, 6).unwrap();
        assert_eq!(same, background);
    }

    #[test]
    fn empty_background_is_rejected() {
        let background = RgbImage::new(0, 0);
        assert!(matches!(
            fit_background(&background, 4, 4),
            Err(CloakError::EmptyFrame)
        ));
    }
}
