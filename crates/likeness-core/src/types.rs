use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Descriptor length produced by the default recognition model.
pub const DEFAULT_DESCRIPTOR_DIM: usize = 128;

/// Default maximum distance still classified as the same identity.
///
/// 0.6 is the figure usually quoted for 128-d descriptors of this kind; 0.5 is
/// the stricter cut this tool defaults to. Raise it explicitly with
/// `--threshold 0.6` when fewer false rejects matter more than false accepts.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Bounding box for a detected face, with optional detector keypoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point detector keypoints: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub keypoints: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    #[error("face descriptor is empty")]
    Empty,
    #[error("face descriptor component {index} is not finite")]
    NonFinite { index: usize },
    #[error("descriptor dimensions differ: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
}

/// Identity embedding of one face. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceDescriptor {
    values: Vec<f32>,
}

impl FaceDescriptor {
    /// Wrap raw model output, rejecting empty or non-finite vectors.
    pub fn new(values: Vec<f32>) -> Result<Self, DescriptorError> {
        if values.is_empty() {
            return Err(DescriptorError::Empty);
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(DescriptorError::NonFinite { index });
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance to another descriptor of the same dimensionality.
    pub fn euclidean_distance(&self, other: &FaceDescriptor) -> Result<f32, DescriptorError> {
        if self.dim() != other.dim() {
            return Err(DescriptorError::DimensionMismatch {
                left: self.dim(),
                right: other.dim(),
            });
        }

        Ok(self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt())
    }
}

/// 68-point facial landmarks in the iBUG 300-W ordering, image coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceLandmarks {
    points: Vec<(f32, f32)>,
}

impl FaceLandmarks {
    pub const COUNT: usize = 68;

    pub fn new(points: Vec<(f32, f32)>) -> Option<Self> {
        (points.len() == Self::COUNT).then_some(Self { points })
    }

    pub fn points(&self) -> &[(f32, f32)] {
        &self.points
    }

    /// Collapse the 68 points into the five used for alignment:
    /// [left_eye, right_eye, nose_tip, left_mouth, right_mouth].
    ///
    /// "Left" is the image left, i.e. iBUG indices 36..42 for the eye.
    pub fn alignment_points(&self) -> [(f32, f32); 5] {
        let p = &self.points;
        [
            mean_point(&p[36..42]),
            mean_point(&p[42..48]),
            p[30],
            p[48],
            p[54],
        ]
    }
}

fn mean_point(points: &[(f32, f32)]) -> (f32, f32) {
    let n = points.len() as f32;
    let (sx, sy) = points
        .iter()
        .fold((0.0f32, 0.0f32), |(sx, sy), &(x, y)| (sx + x, sy + y));
    (sx / n, sy / n)
}

/// The principal face of an image, fully processed.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzedFace {
    pub face: BoundingBox,
    pub landmarks: Option<FaceLandmarks>,
    pub descriptor: FaceDescriptor,
}

/// How to pick the compared face when an image holds several.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaceSelection {
    #[default]
    HighestConfidence,
    LargestArea,
}

impl FaceSelection {
    pub fn pick<'a>(self, faces: &'a [BoundingBox]) -> Option<&'a BoundingBox> {
        let key: fn(&BoundingBox) -> f32 = match self {
            FaceSelection::HighestConfidence => |f: &BoundingBox| f.confidence,
            FaceSelection::LargestArea => |f: &BoundingBox| f.area(),
        };
        // Ties keep the earlier face.
        faces.iter().fold(None, |best: Option<&BoundingBox>, f| match best {
            Some(b) if key(b) >= key(f) => Some(b),
            _ => Some(f),
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("unknown face selection {0:?} (expected highest-confidence or largest-area)")]
pub struct ParseSelectionError(String);

impl FromStr for FaceSelection {
    type Err = ParseSelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "highest-confidence" | "confidence" => Ok(FaceSelection::HighestConfidence),
            "largest-area" | "largest" => Ok(FaceSelection::LargestArea),
            other => Err(ParseSelectionError(other.to_string())),
        }
    }
}

impl fmt::Display for FaceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FaceSelection::HighestConfidence => "highest-confidence",
            FaceSelection::LargestArea => "largest-area",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThresholdError {
    #[error("threshold must be a finite number >= 0, got {0}")]
    OutOfRange(f32),
    #[error("invalid threshold {0:?}")]
    Parse(String),
}

/// Maximum descriptor distance classified as a match (exclusive).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Threshold(f32);

impl Threshold {
    pub fn new(value: f32) -> Result<Self, ThresholdError> {
        if value.is_finite() && value >= 0.0 {
            Ok(Self(value))
        } else {
            Err(ThresholdError::OutOfRange(value))
        }
    }

    pub fn value(self) -> f32 {
        self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLD)
    }
}

impl FromStr for Threshold {
    type Err = ThresholdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f32 = s
            .trim()
            .parse()
            .map_err(|_| ThresholdError::Parse(s.to_string()))?;
        Self::new(value)
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Distance between two descriptors and its classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchDecision {
    pub distance: f32,
    pub threshold: Threshold,
    pub is_match: bool,
}

/// One of the two compared images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSlot {
    First,
    Second,
}

impl fmt::Display for ImageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImageSlot::First => "first image",
            ImageSlot::Second => "second image",
        })
    }
}

/// Which image(s) yielded no usable face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingFace {
    First,
    Second,
    Both,
}

impl MissingFace {
    /// `None` when both images produced a face.
    pub fn from_presence(first: bool, second: bool) -> Option<Self> {
        match (first, second) {
            (true, true) => None,
            (false, true) => Some(MissingFace::First),
            (true, false) => Some(MissingFace::Second),
            (false, false) => Some(MissingFace::Both),
        }
    }
}

impl fmt::Display for MissingFace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MissingFace::First => "first image",
            MissingFace::Second => "second image",
            MissingFace::Both => "both images",
        })
    }
}

/// Tagged comparison outcome: a decision, or the reason no decision exists.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutcome {
    Match(MatchDecision),
    NoMatch(MatchDecision),
    NoFaceDetected { missing: MissingFace },
}

impl MatchOutcome {
    pub fn decision(&self) -> Option<&MatchDecision> {
        match self {
            MatchOutcome::Match(d) | MatchOutcome::NoMatch(d) => Some(d),
            MatchOutcome::NoFaceDetected { .. } => None,
        }
    }
}

impl From<MatchDecision> for MatchOutcome {
    fn from(decision: MatchDecision) -> Self {
        if decision.is_match {
            MatchOutcome::Match(decision)
        } else {
            MatchOutcome::NoMatch(decision)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(values: &[f32]) -> FaceDescriptor {
        FaceDescriptor::new(values.to_vec()).unwrap()
    }

    fn make_bbox(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox {
            x, y, width: w, height: h, confidence: conf, keypoints: None,
        }
    }

    #[test]
    fn test_descriptor_rejects_empty() {
        assert_eq!(FaceDescriptor::new(vec![]), Err(DescriptorError::Empty));
    }

    #[test]
    fn test_descriptor_rejects_nan() {
        let err = FaceDescriptor::new(vec![0.0, f32::NAN, 1.0]).unwrap_err();
        assert_eq!(err, DescriptorError::NonFinite { index: 1 });
    }

    #[test]
    fn test_euclidean_distance_known_value() {
        let a = descriptor(&[0.0, 0.0]);
        let b = descriptor(&[3.0, 4.0]);
        assert!((a.euclidean_distance(&b).unwrap() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_dimension_mismatch() {
        let a = descriptor(&[0.0, 0.0]);
        let b = descriptor(&[0.0, 0.0, 0.0]);
        assert_eq!(
            a.euclidean_distance(&b),
            Err(DescriptorError::DimensionMismatch { left: 2, right: 3 })
        );
    }

    #[test]
    fn test_threshold_validation() {
        assert!(Threshold::new(0.0).is_ok());
        assert!(Threshold::new(-0.1).is_err());
        assert!(Threshold::new(f32::NAN).is_err());
        assert!(Threshold::new(f32::INFINITY).is_err());
        assert_eq!(Threshold::default().value(), DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_threshold_from_str() {
        assert_eq!("0.6".parse::<Threshold>().unwrap().value(), 0.6);
        assert!(matches!("abc".parse::<Threshold>(), Err(ThresholdError::Parse(_))));
        assert!(matches!("-1".parse::<Threshold>(), Err(ThresholdError::OutOfRange(_))));
    }

    #[test]
    fn test_selection_highest_confidence() {
        let faces = vec![
            make_bbox(0.0, 0.0, 200.0, 200.0, 0.7),
            make_bbox(300.0, 0.0, 50.0, 50.0, 0.95),
        ];
        let picked = FaceSelection::HighestConfidence.pick(&faces).unwrap();
        assert!((picked.confidence - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_selection_largest_area() {
        let faces = vec![
            make_bbox(0.0, 0.0, 200.0, 200.0, 0.7),
            make_bbox(300.0, 0.0, 50.0, 50.0, 0.95),
        ];
        let picked = FaceSelection::LargestArea.pick(&faces).unwrap();
        assert!((picked.width - 200.0).abs() < 1e-6);
    }

    #[test]
    fn test_selection_empty() {
        assert!(FaceSelection::HighestConfidence.pick(&[]).is_none());
    }

    #[test]
    fn test_selection_tie_keeps_first() {
        let faces = vec![
            make_bbox(0.0, 0.0, 10.0, 10.0, 0.8),
            make_bbox(50.0, 0.0, 10.0, 10.0, 0.8),
        ];
        let picked = FaceSelection::HighestConfidence.pick(&faces).unwrap();
        assert_eq!(picked.x, 0.0);
    }

    #[test]
    fn test_selection_parse_roundtrip() {
        for sel in [FaceSelection::HighestConfidence, FaceSelection::LargestArea] {
            assert_eq!(sel.to_string().parse::<FaceSelection>().unwrap(), sel);
        }
        assert!("biggest-smile".parse::<FaceSelection>().is_err());
    }

    #[test]
    fn test_landmarks_require_68_points() {
        assert!(FaceLandmarks::new(vec![(0.0, 0.0); 5]).is_none());
        assert!(FaceLandmarks::new(vec![(0.0, 0.0); 68]).is_some());
    }

    #[test]
    fn test_alignment_points_from_68() {
        let mut points = vec![(0.0f32, 0.0f32); 68];
        for p in &mut points[36..42] {
            *p = (10.0, 20.0);
        }
        points[36] = (8.0, 20.0);
        points[39] = (12.0, 20.0);
        for p in &mut points[42..48] {
            *p = (30.0, 20.0);
        }
        points[30] = (20.0, 30.0);
        points[48] = (12.0, 40.0);
        points[54] = (28.0, 40.0);

        let lms = FaceLandmarks::new(points).unwrap();
        let five = lms.alignment_points();
        assert!((five[0].0 - 10.0).abs() < 1e-5 && (five[0].1 - 20.0).abs() < 1e-5);
        assert_eq!(five[1], (30.0, 20.0));
        assert_eq!(five[2], (20.0, 30.0));
        assert_eq!(five[3], (12.0, 40.0));
        assert_eq!(five[4], (28.0, 40.0));
    }

    #[test]
    fn test_missing_face_from_presence() {
        assert_eq!(MissingFace::from_presence(true, true), None);
        assert_eq!(MissingFace::from_presence(false, true), Some(MissingFace::First));
        assert_eq!(MissingFace::from_presence(true, false), Some(MissingFace::Second));
        assert_eq!(MissingFace::from_presence(false, false), Some(MissingFace::Both));
    }

    #[test]
    fn test_outcome_from_decision() {
        let threshold = Threshold::default();
        let hit = MatchDecision { distance: 0.1, threshold, is_match: true };
        let miss = MatchDecision { distance: 0.9, threshold, is_match: false };
        assert!(matches!(MatchOutcome::from(hit), MatchOutcome::Match(_)));
        assert!(matches!(MatchOutcome::from(miss), MatchOutcome::NoMatch(_)));
        assert!(MatchOutcome::NoFaceDetected { missing: MissingFace::Both }.decision().is_none());
    }
}
