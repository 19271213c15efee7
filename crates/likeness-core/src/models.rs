//! The loaded model set: detector, 68-point landmarks and descriptor extractor.
//!
//! Loaded once from a single directory and passed explicitly to every
//! comparison; nothing here is global.

use crate::alignment;
use crate::analyzer::{AnalyzerError, FaceAnalyzer};
use crate::detector::{DetectorError, FaceDetector, DEFAULT_MIN_CONFIDENCE};
use crate::image_io::DecodedImage;
use crate::landmarks::{LandmarkError, LandmarkPredictor};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{AnalyzedFace, BoundingBox, FaceLandmarks, FaceSelection, DEFAULT_DESCRIPTOR_DIM};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("missing model artifacts in {}: {}", .dir.display(), join_paths(.missing))]
    MissingArtifacts { dir: PathBuf, missing: Vec<PathBuf> },
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("landmark model: {0}")]
    Landmarks(#[from] LandmarkError),
    #[error("recognition model: {0}")]
    Recognizer(#[from] RecognizerError),
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// File names of the three artifacts inside the model directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelFiles {
    pub detector: String,
    pub landmarks: String,
    pub recognizer: String,
}

impl Default for ModelFiles {
    fn default() -> Self {
        Self {
            detector: "face_detector.onnx".to_string(),
            landmarks: "face_landmark_68.onnx".to_string(),
            recognizer: "face_recognition.onnx".to_string(),
        }
    }
}

/// Resolved artifact paths, all known to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelPaths {
    pub detector: PathBuf,
    pub landmarks: PathBuf,
    pub recognizer: PathBuf,
}

impl ModelPaths {
    /// Resolve `files` inside `dir`, reporting every missing artifact at once.
    pub fn resolve(dir: &Path, files: &ModelFiles) -> Result<Self, ModelLoadError> {
        let paths = Self {
            detector: dir.join(&files.detector),
            landmarks: dir.join(&files.landmarks),
            recognizer: dir.join(&files.recognizer),
        };

        let missing: Vec<PathBuf> = [&paths.detector, &paths.landmarks, &paths.recognizer]
            .into_iter()
            .filter(|p| !p.is_file())
            .cloned()
            .collect();

        if missing.is_empty() {
            Ok(paths)
        } else {
            Err(ModelLoadError::MissingArtifacts {
                dir: dir.to_path_buf(),
                missing,
            })
        }
    }
}

/// Tuning that applies to every analyzed image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyzerOptions {
    pub selection: FaceSelection,
    pub min_confidence: f32,
    pub descriptor_dim: usize,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            selection: FaceSelection::default(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            descriptor_dim: DEFAULT_DESCRIPTOR_DIM,
        }
    }
}

/// Loaded model handle.
pub struct FaceModels {
    detector: FaceDetector,
    landmarks: LandmarkPredictor,
    recognizer: FaceRecognizer,
    selection: FaceSelection,
    paths: ModelPaths,
}

impl FaceModels {
    /// Load all three models from `dir`. Fails if any artifact is missing or malformed.
    pub fn load(dir: &Path, files: &ModelFiles, options: AnalyzerOptions) -> Result<Self, ModelLoadError> {
        let paths = ModelPaths::resolve(dir, files)?;

        let detector = FaceDetector::load(&paths.detector)?.with_min_confidence(options.min_confidence);
        let landmarks = LandmarkPredictor::load(&paths.landmarks)?;
        let recognizer = FaceRecognizer::load(&paths.recognizer, options.descriptor_dim)?;

        tracing::info!(
            dir = %dir.display(),
            selection = %options.selection,
            min_confidence = options.min_confidence,
            descriptor_dim = options.descriptor_dim,
            "face models loaded"
        );

        Ok(Self {
            detector,
            landmarks,
            recognizer,
            selection: options.selection,
            paths,
        })
    }

    pub fn paths(&self) -> &ModelPaths {
        &self.paths
    }

    pub fn descriptor_dim(&self) -> usize {
        self.recognizer.descriptor_dim()
    }
}

impl FaceAnalyzer for FaceModels {
    fn analyze(&mut self, image: &DecodedImage) -> Result<Option<AnalyzedFace>, AnalyzerError> {
        let rgb = image.rgb();
        let faces = self.detector.detect(rgb)?;

        let Some(face) = self.selection.pick(&faces) else {
            tracing::debug!("no face above confidence threshold");
            return Ok(None);
        };
        if faces.len() > 1 {
            tracing::debug!(
                faces = faces.len(),
                selection = %self.selection,
                confidence = face.confidence,
                "several faces detected; selected one"
            );
        }

        let (landmarks, points) = alignment_points(self.landmarks.predict(rgb, face), face)?;
        let aligned = alignment::align_face(rgb, &points);
        let descriptor = self.recognizer.extract(&aligned)?;

        Ok(Some(AnalyzedFace {
            face: face.clone(),
            landmarks,
            descriptor,
        }))
    }
}

/// Five alignment points from the 68-point landmarks, or from the detector's
/// own keypoints when the landmark model produced nothing usable.
fn alignment_points(
    predicted: Result<FaceLandmarks, LandmarkError>,
    face: &BoundingBox,
) -> Result<(Option<FaceLandmarks>, [(f32, f32); 5]), LandmarkError> {
    match (predicted, face.keypoints) {
        (Ok(landmarks), _) => {
            let points = landmarks.alignment_points();
            Ok((Some(landmarks), points))
        }
        (Err(e), Some(keypoints)) => {
            tracing::warn!(error = %e, "landmark model failed; aligning on detector keypoints");
            Ok((None, keypoints))
        }
        (Err(e), None) => Err(e),
    }
}
