//! The match decision: two images in, a distance and a verdict out.

use crate::analyzer::FaceAnalyzer;
use crate::image_io::{self, DecodeError, DecodedImage};
use crate::types::{
    AnalyzedFace, DescriptorError, FaceDescriptor, ImageSlot, MatchDecision, MatchOutcome, MissingFace,
    Threshold,
};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompareError {
    #[error("cannot decode {slot}: {source}")]
    Decode {
        slot: ImageSlot,
        #[source]
        source: DecodeError,
    },
    #[error("no face detected in {0}")]
    NoFace(MissingFace),
    #[error("descriptors are not comparable: {0}")]
    Descriptor(#[from] DescriptorError),
}

/// Euclidean distance between two descriptors of equal length.
pub fn euclidean_distance(a: &FaceDescriptor, b: &FaceDescriptor) -> Result<f32, CompareError> {
    Ok(a.euclidean_distance(b)?)
}

/// Classify a distance: a match is strictly below the threshold.
pub fn classify(distance: f32, threshold: Threshold) -> MatchDecision {
    MatchDecision {
        distance,
        threshold,
        is_match: distance < threshold.value(),
    }
}

/// Run the analyzer on one image. A failed detection, landmark or descriptor
/// step leaves the image without a usable face.
fn analyze_slot<A: FaceAnalyzer + ?Sized>(
    analyzer: &mut A,
    image: &DecodedImage,
    slot: ImageSlot,
) -> Option<AnalyzedFace> {
    match analyzer.analyze(image) {
        Ok(face) => face,
        Err(e) => {
            tracing::warn!(%slot, error = %e, "face analysis failed; treating image as faceless");
            None
        }
    }
}

/// Decide whether two decoded images show the same face.
///
/// Both images are always analyzed so a missing face can be attributed to
/// the first, the second, or both.
pub fn compare_faces<A: FaceAnalyzer + ?Sized>(
    analyzer: &mut A,
    first: &DecodedImage,
    second: &DecodedImage,
    threshold: Threshold,
) -> Result<MatchDecision, CompareError> {
    let face_a = analyze_slot(analyzer, first, ImageSlot::First);
    let face_b = analyze_slot(analyzer, second, ImageSlot::Second);

    let (a, b) = match (face_a, face_b) {
        (Some(a), Some(b)) => (a, b),
        (a, b) => {
            let missing = MissingFace::from_presence(a.is_some(), b.is_some())
                .unwrap_or(MissingFace::Both);
            tracing::info!(%missing, "no face detected");
            return Err(CompareError::NoFace(missing));
        }
    };

    let distance = euclidean_distance(&a.descriptor, &b.descriptor)?;
    let decision = classify(distance, threshold);

    tracing::info!(
        distance = decision.distance,
        threshold = threshold.value(),
        is_match = decision.is_match,
        "faces compared"
    );

    Ok(decision)
}

/// Decode two image files and compare them.
pub fn compare_files<A: FaceAnalyzer + ?Sized>(
    analyzer: &mut A,
    first: &Path,
    second: &Path,
    threshold: Threshold,
) -> Result<MatchDecision, CompareError> {
    let decode = |path: &Path, slot: ImageSlot| {
        image_io::decode_file(path).map_err(|source| CompareError::Decode { slot, source })
    };

    let image_a = decode(first, ImageSlot::First)?;
    let image_b = decode(second, ImageSlot::Second)?;

    compare_faces(analyzer, &image_a, &image_b, threshold)
}

impl MatchOutcome {
    /// Fold a comparison into the tagged outcome. A missing face is an outcome;
    /// decode failures and incomparable descriptors stay errors.
    pub fn from_comparison(result: Result<MatchDecision, CompareError>) -> Result<Self, CompareError> {
        match result {
            Ok(decision) => Ok(decision.into()),
            Err(CompareError::NoFace(missing)) => Ok(MatchOutcome::NoFaceDetected { missing }),
            Err(e) => Err(e),
        }
    }
}
