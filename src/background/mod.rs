mod builder;

pub use builder::BackgroundBuilder;

use crate::error::{CloakError, CloakResult};
use image::RgbImage;
use std::path::Path;

/// Default location of the persisted background
pub const DEFAULT_BACKGROUND_PATH: &str = "background.png";

/// Reference frame of the scene with the marker absent
///
/// Read-only once built; its dimensions are the session's working resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundModel {
    image: RgbImage,
}

impl BackgroundModel {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Persist the background; the format follows the file extension
    pub fn save<P: AsRef<Path>>(&self, path: P) -> CloakResult<()> {
        let path = path.as_ref();
        self.image.save(path)?;
        tracing::info!(
            "Background saved to {} ({}x{})",
            path.display(),
            self.image.width(),
            self.image.height()
        );
        Ok(())
    }

    /// Load a previously captured background
    pub fn load<P: AsRef<Path>>(path: P) -> CloakResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CloakError::BackgroundMissing(path.to_path_buf()));
        }

        let decoded = image::open(path)?;

        let channels = decoded.color().channel_count();
        if channels != 3 {
            return Err(CloakError::ChannelMismatch {
                expected: 3,
                found: channels,
            });
        }

        let image = decoded.to_rgb8();
        if image.width() == 0 || image.height() == 0 {
            return Err(CloakError::EmptyFrame);
        }

        tracing::info!(
            "Loaded background from {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );
        Ok(Self { image })
    }
}
