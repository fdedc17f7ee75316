use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the compositing core
#[derive(Debug, Error)]
pub enum CloakError {
    #[error("collected {collected} background samples, need at least {required}")]
    NoBackgroundSamples { collected: usize, required: usize },

    #[error("background image not found at {}", .0.display())]
    BackgroundMissing(PathBuf),

    #[error("expected {expected} color channels, found {found}")]
    ChannelMismatch { expected: u8, found: u8 },

    #[error("frame has zero width or height")]
    EmptyFrame,

    #[error("invalid color range: {0}")]
    InvalidColorRange(String),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

pub type CloakResult<T> = std::result::Result<T, CloakError>;
