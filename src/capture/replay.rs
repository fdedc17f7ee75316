use super::CaptureSource;
use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::collections::VecDeque;
use std::path::Path;

/// Capture source that plays back a fixed sequence of read results
///
/// Once the sequence is exhausted every read fails, which ends a live session.
pub struct ReplayCapture {
    frames: VecDeque<Result<RgbImage>>,
    resolution: (u32, u32),
}

impl ReplayCapture {
    pub fn new<I>(frames: I) -> Self
    where
        I: IntoIterator<Item = Result<RgbImage>>,
    {
        let frames: VecDeque<_> = frames.into_iter().collect();
        let resolution = frames
            .iter()
            .find_map(|frame| frame.as_ref().ok().map(RgbImage::dimensions))
            .unwrap_or((0, 0));

        Self { frames, resolution }
    }

    /// Load still images to replay in order
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut frames = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let image = image::open(path)
                .with_context(|| format!("Failed to read frame from {}", path.display()))?;
            frames.push(Ok(image.to_rgb8()));
        }

        tracing::info!("Replaying {} frames from disk", frames.len());
        Ok(Self::new(frames))
    }

    /// Number of reads left before the source runs dry
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl CaptureSource for ReplayCapture {
    fn capture_frame(&mut self) -> Result<RgbImage> {
        self.frames
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("No more frames to replay")))
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }
}
