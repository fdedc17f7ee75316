use super::types::{HsvImage, RawMask};
use image::{imageops, Rgb, RgbImage};

/// Normalizes captured frames before segmentation
pub struct Preprocessor {
    mirror: bool,
}

impl Preprocessor {
    pub fn new(mirror: bool) -> Self {
        Self { mirror }
    }

    /// Mirror the frame horizontally if enabled
    ///
    /// The returned frame is the live frame used for blending, so the output
    /// keeps the same orientation as the mask.
    pub fn normalize(&self, frame: RgbImage) -> RgbImage {
        if self.mirror {
            imageops::flip_horizontal(&frame)
        } else {
            frame
        }
    }

    /// Convert an RGB frame to 8-bit HSV
    pub fn to_hsv(frame: &RgbImage) -> HsvImage {
        let _span = tracing::debug_span!("to_hsv").entered();

        let (width, height) = frame.dimensions();
        let mut hsv = HsvImage::new(width, height);
        for (src, dst) in frame.pixels().zip(hsv.pixels_mut()) {
            *dst = Rgb(rgb_to_hsv(src[0], src[1], src[2]));
        }
        hsv
    }

    /// Convert a raw mask to an RGB image for visualization
    pub fn mask_to_rgb(mask: &RawMask) -> RgbImage {
        RgbImage::from_fn(mask.width(), mask.height(), |x, y| {
            let value = mask.get_pixel(x, y)[0];
            Rgb([value, value, value])
        })
    }
}

/// Convert RGB to HSV with hue in half-degrees [0, 180)
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = (max - min) as f32;

    let s = if max == 0 {
        0
    } else {
        (255.0 * diff / max as f32).round() as u8
    };

    if diff == 0.0 {
        return [0, s, max];
    }

    let (r, g, b) = (r as f32, g as f32, b as f32);
    let hue = if max as f32 == r {
        30.0 * (g - b) / diff
    } else if max as f32 == g {
        60.0 + 30.0 * (b - r) / diff
    } else {
        120.0 + 30.0 * (r - g) / diff
    };

    let mut h = hue.round() as i32;
    if h < 0 {
        h += 180;
    }

    [h as u8, s, max]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_colors_map_to_expected_hues() {
        assert_eq!(rgb_to_hsv(255, 0, 0), [0, 255, 255]);
        assert_eq!(rgb_to_hsv(0, 255, 0), [60, 255, 255]);
        assert_eq!(rgb_to_hsv(0, 0, 255), [120, 255, 255]);
        assert_eq!(rgb_to_hsv(255, 255, 0), [30, 255, 255]);
        assert_eq!(rgb_to_hsv(0, 255, 255), [90, 255, 255]);
    }

    #[test]
    fn magenta_leaning_red_wraps_to_high_hue() {
        let [h, s, v] = rgb_to_hsv(255, 0, 40);
        assert!((170..180).contains(&h), "hue {h}");
        assert_eq!((s, v), (255, 255));
    }

    #[test]
    fn grays_have_no_saturation() {
        assert_eq!(rgb_to_hsv(0, 0, 0), [0, 0, 0]);
        assert_eq!(rgb_to_hsv(128, 128, 128), [0, 0, 128]);
    }

    #[test]
    fn mirror_flips_columns() {
        let frame = RgbImage::from_fn(3, 1, |x, _| Rgb([x as u8, 0, 0]));

        let mirrored = Preprocessor::new(true).normalize(frame.clone());
        assert_eq!(mirrored.get_pixel(0, 0)[0], 2);
        assert_eq!(mirrored.get_pixel(2, 0)[0], 0);

        let untouched = Preprocessor::new(false).normalize(frame.clone());
        assert_eq!(untouched, frame);
    }

    #[test]
    fn hsv_keeps_dimensions() {
        let frame = RgbImage::from_pixel(4, 3, Rgb([200, 10, 10]));
        let hsv = Preprocessor::to_hsv(&frame);
        assert_eq!(hsv.dimensions(), (4, 3));
        assert_eq!(hsv.get_pixel(1, 1)[0], 0);
    }
}
