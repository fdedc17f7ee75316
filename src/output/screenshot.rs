use super::OutputSink;
use anyhow::{Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

/// Saves copies of output frames as numbered image files
///
/// Numbering starts at 1 and increases for the lifetime of the sink.
pub struct ScreenshotSink {
    directory: PathBuf,
    count: u32,
    last_resolution: (u32, u32),
}

impl ScreenshotSink {
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            count: 0,
            last_resolution: (0, 0),
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    fn path_for(&self, sequence: u32) -> PathBuf {
        self.directory
            .join(format!("invisibility_screenshot_{sequence}.png"))
    }

    /// Save a frame and return where it was written
    pub fn save(&mut self, frame: &RgbImage) -> Result<PathBuf> {
        let path = self.path_for(self.count + 1);
        frame
            .save(&path)
            .with_context(|| format!("Failed to save screenshot to {}", path.display()))?;

        self.count += 1;
        self.last_resolution = frame.dimensions();
        tracing::info!("Screenshot saved as {}", path.display());
        Ok(path)
    }
}

impl OutputSink for ScreenshotSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        self.save(frame).map(|_| ())
    }

    fn resolution(&self) -> (u32, u32) {
        self.last_resolution
    }
}
