use super::types::{ColorRangeSet, HsvImage, RawMask, SegmentationModel};
use image::Luma;

/// Marker value written to matched mask cells
pub const MASK_ON: u8 = 255;

/// Per-pixel inclusive HSV thresholding against a set of color ranges
///
/// Each range is tested on all three channels at once and the per-range
/// matches are OR-ed, so overlapping ranges saturate at `MASK_ON`.
pub struct HsvThreshold {
    ranges: ColorRangeSet,
}

impl HsvThreshold {
    pub fn new(ranges: ColorRangeSet) -> Self {
        Self { ranges }
    }
}

impl SegmentationModel for HsvThreshold {
    fn segment(&self, frame: &HsvImage) -> RawMask {
        let _span = tracing::debug_span!("hsv_threshold").entered();

        let mut mask = RawMask::new(frame.width(), frame.height());
        for (hsv, cell) in frame.pixels().zip(mask.pixels_mut()) {
            if self.ranges.contains(hsv.0) {
                *cell = Luma([MASK_ON]);
            }
        }
        mask
    }
}
