use crate::segmentation::{RawMask, MASK_ON};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, dilate, open};
use ndarray::Array2;

/// 5-tap binomial approximation of a Gaussian, sums to 16
const GAUSSIAN_5: [u32; 5] = [1, 4, 6, 4, 1];

/// Soft blend weights derived from a raw mask
///
/// Both arrays are indexed `[[y, x]]` and hold values in [0, 1]. `inverse` is
/// blurred from the complement of the binary mask, not computed as
/// `1 - mask`, so the two can disagree by one 8-bit step at edges.
#[derive(Debug, Clone)]
pub struct AlphaMasks {
    pub mask: Array2<f32>,
    pub inverse: Array2<f32>,
}

impl AlphaMasks {
    pub fn dimensions(&self) -> (u32, u32) {
        let (height, width) = self.mask.dim();
        (width as u32, height as u32)
    }

    /// Render the background weight as a grayscale RGB image
    pub fn matte_to_rgb(&self) -> RgbImage {
        let (width, height) = self.dimensions();
        RgbImage::from_fn(width, height, |x, y| {
            let value = (self.mask[[y as usize, x as usize]] * 255.0).clamp(0.0, 255.0) as u8;
            Rgb([value, value, value])
        })
    }
}

/// Turns a raw mask into soft alpha weights
///
/// Pipeline: opening, closing, extra dilation, binary inverse, independent
/// 5x5 Gaussian blur of mask and inverse, normalization to [0, 1].
#[derive(Debug, Clone)]
pub struct MaskRefiner {
    /// Chebyshev radius of the square structuring element (1 = 3x3)
    pub kernel_radius: u8,
    /// Number of extra 3x3 dilations after closing
    pub dilate_iterations: u32,
}

impl Default for MaskRefiner {
    fn default() -> Self {
        Self {
            kernel_radius: 1,
            dilate_iterations: 2,
        }
    }
}

impl MaskRefiner {
    /// Morphological cleanup: open, close, then grow the region
    pub fn clean(&self, raw: &RawMask) -> GrayImage {
        let _span = tracing::debug_span!("morphology").entered();

        let k = self.kernel_radius;
        let mut mask = open(raw, Norm::LInf, k);
        mask = close(&mask, Norm::LInf, k);
        for _ in 0..self.dilate_iterations {
            mask = dilate(&mask, Norm::LInf, k);
        }
        mask
    }

    pub fn refine(&self, raw: &RawMask) -> AlphaMasks {
        let mask = self.clean(raw);
        let inverse = complement(&mask);

        let _span = tracing::debug_span!("smooth").entered();
        AlphaMasks {
            mask: normalize(&gaussian_blur_5(&mask)),
            inverse: normalize(&gaussian_blur_5(&inverse)),
        }
    }
}

fn complement(mask: &GrayImage) -> GrayImage {
    let mut inverse = mask.clone();
    for cell in inverse.pixels_mut() {
        *cell = Luma([MASK_ON - cell[0]]);
    }
    inverse
}

fn normalize(mask: &GrayImage) -> Array2<f32> {
    let (width, height) = mask.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        mask.get_pixel(x as u32, y as u32)[0] as f32 / MASK_ON as f32
    })
}

/// Mirror an out-of-range index back into `0..len` without repeating the edge
fn reflect_101(i: i64, len: i64) -> usize {
    if len == 1 {
        return 0;
    }
    let mut i = i;
    loop {
        if i < 0 {
            i = -i;
        } else if i >= len {
            i = 2 * len - 2 - i;
        } else {
            return i as usize;
        }
    }
}

/// Separable 5x5 Gaussian blur, rounded back to 8 bits
fn gaussian_blur_5(src: &GrayImage) -> GrayImage {
    let (width, height) = src.dimensions();
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 {
        return src.clone();
    }

    let radius = (GAUSSIAN_5.len() / 2) as i64;
    let pixels = src.as_raw();

    // Horizontal pass keeps full precision, scale 16
    let mut tmp = vec![0u32; w * h];
    for y in 0..h {
        let row = &pixels[y * w..(y + 1) * w];
        for x in 0..w {
            let mut acc = 0u32;
            for (k, weight) in GAUSSIAN_5.iter().enumerate() {
                let sx = reflect_101(x as i64 + k as i64 - radius, w as i64);
                acc += weight * row[sx] as u32;
            }
            tmp[y * w + x] = acc;
        }
    }

    // Vertical pass, total scale 256
    let mut out = vec![0u8; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0u32;
            for (k, weight) in GAUSSIAN_5.iter().enumerate() {
                let sy = reflect_101(y as i64 + k as i64 - radius, h as i64);
                acc += weight * tmp[sy * w + x];
            }
            out[y * w + x] = ((acc + 128) >> 8).min(255) as u8;
        }
    }

    GrayImage::from_raw(width, height, out).unwrap_or_else(|| src.clone())
}
