use crate::error::CloakError;
use image::{GrayImage, ImageBuffer, Rgb};
use std::fmt;
use std::str::FromStr;

/// Frame converted to HSV. Channels hold (hue, saturation, value), hue in
/// [0, 180) as half-degrees, saturation and value in [0, 255].
pub type HsvImage = ImageBuffer<Rgb<u8>, Vec<u8>>;

/// Boolean-equivalent classification: 255 = marker color, 0 = scene
pub type RawMask = GrayImage;

/// Hue axis length in the 8-bit HSV convention
pub const HUE_PERIOD: u8 = 180;

/// Inclusive bounds on (hue, saturation, value)
///
/// When `lower[0] > upper[0]` the hue interval wraps through 0, so
/// `170,50,50-10,255,255` covers hues 170..=180 and 0..=10. Saturation and
/// value never wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl ColorRange {
    pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    /// Lower reds, hue 0..=10
    pub const RED_LOW: ColorRange = ColorRange::new([0, 50, 50], [10, 255, 255]);

    /// Upper reds, hue 170..=180
    pub const RED_HIGH: ColorRange = ColorRange::new([170, 50, 50], [180, 255, 255]);

    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        let [h, s, v] = hsv;

        let hue_ok = if self.lower[0] <= self.upper[0] {
            self.lower[0] <= h && h <= self.upper[0]
        } else {
            h >= self.lower[0] || h <= self.upper[0]
        };

        hue_ok
            && self.lower[1] <= s
            && s <= self.upper[1]
            && self.lower[2] <= v
            && v <= self.upper[2]
    }
}

impl fmt::Display for ColorRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [lh, ls, lv] = self.lower;
        let [uh, us, uv] = self.upper;
        write!(f, "{lh},{ls},{lv}-{uh},{us},{uv}")
    }
}

impl FromStr for ColorRange {
    type Err = CloakError;

    /// Parse `h,s,v-h,s,v`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CloakError::InvalidColorRange(s.to_string());

        let (lower, upper) = s.trim().split_once('-').ok_or_else(invalid)?;
        let lower = parse_triple(lower).ok_or_else(invalid)?;
        let upper = parse_triple(upper).ok_or_else(invalid)?;

        if lower[0] > HUE_PERIOD || upper[0] > HUE_PERIOD {
            return Err(CloakError::InvalidColorRange(format!(
                "{s}: hue must be within 0..={HUE_PERIOD}"
            )));
        }
        if lower[1] > upper[1] || lower[2] > upper[2] {
            return Err(CloakError::InvalidColorRange(format!(
                "{s}: saturation and value bounds must be ascending"
            )));
        }

        Ok(Self { lower, upper })
    }
}

fn parse_triple(s: &str) -> Option<[u8; 3]> {
    let mut parts = s.split(',').map(|p| p.trim().parse::<u8>());
    let triple = [parts.next()?.ok()?, parts.next()?.ok()?, parts.next()?.ok()?];
    if parts.next().is_some() {
        return None;
    }
    Some(triple)
}

/// Union of color ranges; a pixel matches when any range contains it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorRangeSet {
    ranges: Vec<ColorRange>,
}

impl ColorRangeSet {
    pub fn new(ranges: Vec<ColorRange>) -> Self {
        Self { ranges }
    }

    /// The two ranges straddling the red hue wraparound
    pub fn red() -> Self {
        Self::new(vec![ColorRange::RED_LOW, ColorRange::RED_HIGH])
    }

    pub fn ranges(&self) -> &[ColorRange] {
        &self.ranges
    }

    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        self.ranges.iter().any(|range| range.contains(hsv))
    }
}

impl Default for ColorRangeSet {
    fn default() -> Self {
        Self::red()
    }
}

/// Trait for marker segmentation
/// Allows swapping how marker pixels are classified without touching the
/// refinement and blending stages
pub trait SegmentationModel {
    /// Classify every pixel of an HSV frame
    ///
    /// # Returns
    /// * Raw mask with the frame's dimensions, 255 where the marker is found
    fn segment(&self, frame: &HsvImage) -> RawMask;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays_range() {
        let range: ColorRange = "0,50,50-10,255,255".parse().unwrap();
        assert_eq!(range, ColorRange::RED_LOW);
        assert_eq!(range.to_string(), "0,50,50-10,255,255");
    }

    #[test]
    fn rejects_malformed_ranges() {
        assert!("0,50,50".parse::<ColorRange>().is_err());
        assert!("0,50-10,255,255".parse::<ColorRange>().is_err());
        assert!("0,50,50,1-10,255,255".parse::<ColorRange>().is_err());
        assert!("200,50,50-10,255,255".parse::<ColorRange>().is_err());
        assert!("0,255,50-10,50,255".parse::<ColorRange>().is_err());
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let range = ColorRange::RED_LOW;
        assert!(range.contains([0, 50, 50]));
        assert!(range.contains([10, 255, 255]));
        assert!(!range.contains([11, 100, 100]));
        assert!(!range.contains([5, 49, 100]));
        assert!(!range.contains([5, 100, 49]));
    }

    #[test]
    fn descending_hue_bounds_wrap() {
        let range: ColorRange = "170,50,50-10,255,255".parse().unwrap();
        assert!(range.contains([175, 100, 100]));
        assert!(range.contains([3, 100, 100]));
        assert!(!range.contains([90, 100, 100]));
        assert!(!range.contains([3, 10, 100]));
    }

    #[test]
    fn range_set_is_a_union() {
        let set = ColorRangeSet::red();
        for hue in [0, 10, 170, 180] {
            assert!(set.contains([hue, 50, 50]), "hue {hue}");
        }
        for hue in [11, 90, 169] {
            assert!(!set.contains([hue, 200, 200]), "hue {hue}");
        }
        assert!(!ColorRangeSet::new(Vec::new()).contains([0, 255, 255]));
    }
}
