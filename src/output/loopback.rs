use super::OutputSink;
use anyhow::{Context, Result};
use image::RgbImage;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, FourCC};

/// Display sink writing YUYV frames to a v4l2loopback device
pub struct V4L2Output {
    file: File,
    width: u32,
    height: u32,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        // Readers of the loopback device take the layout from this format
        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open v4l2 device at {}", path.display()))?;
        let mut format = Output::format(&device).context("Failed to query output format")?;
        format.width = width;
        format.height = height;
        format.fourcc = FourCC::new(b"YUYV");
        Output::set_format(&device, &format).context("Failed to set output format")?;

        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        tracing::info!("v4l2loopback device opened successfully");

        Ok(Self {
            file,
            width,
            height,
        })
    }
}

/// Convert RGB frame to YUV422 (YUYV), two pixels per four bytes
fn rgb_to_yuyv(rgb_image: &RgbImage) -> Vec<u8> {
    let (width, height) = rgb_image.dimensions();
    let mut yuyv = Vec::with_capacity((width.div_ceil(2) * 4 * height) as usize);

    for y in 0..height {
        for x in (0..width).step_by(2) {
            let pixel1 = rgb_image.get_pixel(x, y);
            let pixel2 = if x + 1 < width {
                rgb_image.get_pixel(x + 1, y)
            } else {
                pixel1
            };

            let (y1, u1, v1) = rgb_to_yuv(pixel1[0], pixel1[1], pixel1[2]);
            let (y2, u2, v2) = rgb_to_yuv(pixel2[0], pixel2[1], pixel2[2]);

            // Chroma is shared by the pair
            let u = ((u1 as u16 + u2 as u16) / 2) as u8;
            let v = ((v1 as u16 + v2 as u16) / 2) as u8;

            yuyv.extend_from_slice(&[y1, u, y2, v]);
        }
    }

    yuyv
}

fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let r = r as f32;
    let g = g as f32;
    let b = b as f32;

    let y = (0.299 * r + 0.587 * g + 0.114 * b).clamp(0.0, 255.0) as u8;
    let u = ((-0.147 * r - 0.289 * g + 0.436 * b) + 128.0).clamp(0.0, 255.0) as u8;
    let v = ((0.615 * r - 0.515 * g - 0.100 * b) + 128.0).clamp(0.0, 255.0) as u8;

    (y, u, v)
}

impl OutputSink for V4L2Output {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        let yuyv_data = if frame.dimensions() != (self.width, self.height) {
            let resized = image::imageops::resize(
                frame,
                self.width,
                self.height,
                image::imageops::FilterType::Triangle,
            );
            rgb_to_yuyv(&resized)
        } else {
            rgb_to_yuyv(frame)
        };

        self.file
            .write_all(&yuyv_data)
            .context("Failed to write frame to v4l2loopback device")?;

        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn yuyv_packs_two_pixels_per_four_bytes() {
        let frame = RgbImage::from_pixel(4, 2, Rgb([0, 0, 0]));
        let data = rgb_to_yuyv(&frame);
        assert_eq!(data.len(), 4 * 2 * 2);
        assert_eq!(&data[..4], &[0, 128, 0, 128]);
    }

    #[test]
    fn odd_width_repeats_last_pixel() {
        let frame = RgbImage::from_pixel(3, 1, Rgb([255, 255, 255]));
        let data = rgb_to_yuyv(&frame);
        assert_eq!(data.len(), 8);
        assert_eq!(data[4], data[6]);
    }

    #[test]
    fn white_has_full_luma() {
        let (y, u, v) = rgb_to_yuv(255, 255, 255);
        assert!(y >= 254);
        assert!(u.abs_diff(128) <= 1);
        assert!(v.abs_diff(128) <= 1);
    }
}
