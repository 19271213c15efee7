use crate::detector::DetectorError;
use crate::image_io::DecodedImage;
use crate::landmarks::LandmarkError;
use crate::recognizer::RecognizerError;
use crate::types::AnalyzedFace;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("landmark error: {0}")]
    Landmarks(#[from] LandmarkError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Source of face descriptors for the matcher.
///
/// `Ok(None)` means the image has no usable face. `&mut self` because the
/// ONNX sessions behind the production implementation need exclusive access.
pub trait FaceAnalyzer {
    fn analyze(&mut self, image: &DecodedImage) -> Result<Option<AnalyzedFace>, AnalyzerError>;
}

impl<A: FaceAnalyzer + ?Sized> FaceAnalyzer for Box<A> {
    fn analyze(&mut self, image: &DecodedImage) -> Result<Option<AnalyzedFace>, AnalyzerError> {
        (**self).analyze(image)
    }
}
