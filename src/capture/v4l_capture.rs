use super::CaptureSource;
use anyhow::{bail, Context, Result};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;

/// How many consecutive device indices to try when opening a camera
pub const DEVICE_PROBE_COUNT: u32 = 3;

pub struct WebcamCapture {
    camera: Camera,
    width: u32,
    height: u32,
}

impl WebcamCapture {
    pub fn new(device_index: u32) -> Result<Self> {
        tracing::info!("Initializing webcam {}", device_index);

        let index = CameraIndex::Index(device_index);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);

        let mut camera = Camera::new(index, requested)
            .context("Failed to open camera")?;

        camera.open_stream()
            .context("Failed to open camera stream")?;

        let resolution = camera.resolution();
        let (width, height) = (resolution.width(), resolution.height());
        tracing::info!("Webcam {} streaming at {}x{}", device_index, width, height);

        Ok(Self {
            camera,
            width,
            height,
        })
    }

    /// Open the first camera that works, starting at `first_index`
    pub fn open_first(first_index: u32) -> Result<Self> {
        for index in first_index..first_index + DEVICE_PROBE_COUNT {
            match Self::new(index) {
                Ok(capture) => {
                    tracing::info!("Using camera index {}", index);
                    return Ok(capture);
                }
                Err(err) => tracing::debug!("Camera {} unavailable: {:#}", index, err),
            }
        }

        bail!(
            "Could not open any camera (tried indices {}..{})",
            first_index,
            first_index + DEVICE_PROBE_COUNT
        )
    }
}

impl CaptureSource for WebcamCapture {
    fn capture_frame(&mut self) -> Result<RgbImage> {
        let frame = self
            .camera
            .frame()
            .context("Failed to capture frame")?;

        let decoded = frame.decode_image::<RgbFormat>()
            .context("Failed to decode frame")?;

        // nokhwa may link a different `image` version
        let (width, height) = decoded.dimensions();
        RgbImage::from_raw(width, height, decoded.into_raw())
            .context("Decoded frame has an unexpected buffer size")
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for WebcamCapture {
    fn drop(&mut self) {
        if let Err(err) = self.camera.stop_stream() {
            tracing::warn!("Failed to stop camera stream: {}", err);
        }
    }
}
