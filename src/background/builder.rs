use super::BackgroundModel;
use crate::capture::CaptureSource;
use crate::error::{CloakError, CloakResult};
use crate::segmentation::Preprocessor;
use image::RgbImage;
use std::time::Duration;

/// Running per-pixel, per-channel sum of captured frames
///
/// Accepts at most `capacity` frames; extra frames and frames whose size
/// differs from the first one are ignored.
pub struct FrameAccumulator {
    capacity: usize,
    width: u32,
    height: u32,
    sum: Vec<u32>,
    count: usize,
}

impl FrameAccumulator {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            width: 0,
            height: 0,
            sum: Vec::new(),
            count: 0,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_full(&self) -> bool {
        self.count >= self.capacity
    }

    /// Add a frame, returning whether it was kept
    pub fn push(&mut self, frame: &RgbImage) -> bool {
        if self.is_full() {
            return false;
        }

        let (width, height) = frame.dimensions();
        if self.count == 0 {
            self.width = width;
            self.height = height;
            self.sum = vec![0; frame.as_raw().len()];
        } else if (width, height) != (self.width, self.height) {
            tracing::warn!(
                "Dropping {}x{} sample, expected {}x{}",
                width,
                height,
                self.width,
                self.height
            );
            return false;
        }

        for (acc, &value) in self.sum.iter_mut().zip(frame.as_raw()) {
            *acc += value as u32;
        }
        self.count += 1;
        true
    }

    /// Average the collected frames, truncating to 8 bits
    pub fn finish(self, min_samples: usize) -> CloakResult<BackgroundModel> {
        let required = min_samples.max(1);
        if self.count < required {
            return Err(CloakError::NoBackgroundSamples {
                collected: self.count,
                required,
            });
        }

        let count = self.count as u32;
        let mean: Vec<u8> = self.sum.iter().map(|&acc| (acc / count) as u8).collect();
        let image = RgbImage::from_raw(self.width, self.height, mean).ok_or(CloakError::EmptyFrame)?;
        Ok(BackgroundModel::new(image))
    }
}

/// Builds the background model by averaging captured frames
pub struct BackgroundBuilder {
    /// Number of capture attempts
    pub samples: usize,
    /// Delay between capture attempts
    pub interval: Duration,
    /// Settling time before the first attempt
    pub warmup: Duration,
    /// Fewest successful captures accepted (at least one)
    pub min_samples: usize,
    preprocessor: Preprocessor,
}

impl Default for BackgroundBuilder {
    fn default() -> Self {
        Self {
            samples: 30,
            interval: Duration::from_millis(100),
            warmup: Duration::from_secs(2),
            min_samples: 1,
            preprocessor: Preprocessor::new(true),
        }
    }
}

impl BackgroundBuilder {
    pub fn new(samples: usize, interval: Duration, warmup: Duration, mirror: bool) -> Self {
        Self {
            samples,
            interval,
            warmup,
            preprocessor: Preprocessor::new(mirror),
            ..Self::default()
        }
    }

    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples;
        self
    }

    /// Attempt `samples` captures and average the ones that succeed
    ///
    /// Failed reads are dropped without retry. Fails only when fewer than
    /// `min_samples` frames were collected.
    pub fn build<C: CaptureSource>(&self, capture: &mut C) -> CloakResult<BackgroundModel> {
        let _span = tracing::info_span!("background_build", samples = self.samples).entered();

        if !self.warmup.is_zero() {
            tracing::info!("Letting camera settle for {:.1}s", self.warmup.as_secs_f32());
            std::thread::sleep(self.warmup);
        }

        let mut accumulator = FrameAccumulator::new(self.samples);
        for attempt in 0..self.samples {
            match capture.capture_frame() {
                Ok(frame) => {
                    accumulator.push(&self.preprocessor.normalize(frame));
                }
                Err(err) => {
                    tracing::warn!("Background sample {} dropped: {:#}", attempt + 1, err);
                }
            }

            if !self.interval.is_zero() && attempt + 1 < self.samples {
                std::thread::sleep(self.interval);
            }
        }

        tracing::info!(
            "Collected {}/{} background samples",
            accumulator.count(),
            self.samples
        );
        accumulator.finish(self.min_samples)
    }
}
