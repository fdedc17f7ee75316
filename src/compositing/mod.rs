mod blend;
mod refine;

pub use blend::{blend, fit_background};
pub use refine::{AlphaMasks, MaskRefiner};

use crate::background::BackgroundModel;
use crate::error::CloakResult;
use crate::segmentation::{Preprocessor, SegmentationModel};
use image::RgbImage;

/// Output of one pass through the pipeline
pub struct Composite {
    /// Frame to display
    pub output: RgbImage,
    /// Blend weights used to build `output`
    pub alpha: AlphaMasks,
}

/// Per-frame invisibility pipeline
///
/// Holds only read-only state; every call allocates its own working buffers,
/// so frames never share mutable data.
pub struct Compositor {
    background: BackgroundModel,
    preprocessor: Preprocessor,
    segmenter: Box<dyn SegmentationModel>,
    refiner: MaskRefiner,
}

impl Compositor {
    pub fn new(
        background: BackgroundModel,
        preprocessor: Preprocessor,
        segmenter: Box<dyn SegmentationModel>,
        refiner: MaskRefiner,
    ) -> Self {
        Self {
            background,
            preprocessor,
            segmenter,
            refiner,
        }
    }

    pub fn background(&self) -> &BackgroundModel {
        &self.background
    }

    /// Replace the marker region of a captured frame with the background
    pub fn process(&self, frame: RgbImage) -> CloakResult<Composite> {
        let live = {
            let _span = tracing::debug_span!("preprocess").entered();
            self.preprocessor.normalize(frame)
        };
        composite_frame(&live, &self.background, self.segmenter.as_ref(), &self.refiner)
    }
}

/// Segment, refine and blend a single already-normalized frame
pub fn composite_frame(
    live: &RgbImage,
    background: &BackgroundModel,
    segmenter: &dyn SegmentationModel,
    refiner: &MaskRefiner,
) -> CloakResult<Composite> {
    let (width, height) = live.dimensions();
    let background = fit_background(background.image(), width, height)?;

    let hsv = Preprocessor::to_hsv(live);
    let raw = segmenter.segment(&hsv);
    let alpha = {
        let _span = tracing::debug_span!("refine").entered();
        refiner.refine(&raw)
    };
    let output = blend(live, &background, &alpha);

    Ok(Composite { output, alpha })
}
