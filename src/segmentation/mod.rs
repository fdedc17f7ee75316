mod preprocess;
mod threshold;
pub mod types;

pub use preprocess::Preprocessor;
pub use threshold::{HsvThreshold, MASK_ON};
pub use types::{ColorRange, ColorRangeSet, RawMask, SegmentationModel};
