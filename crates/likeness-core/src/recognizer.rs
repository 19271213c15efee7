//! Face descriptor extraction via ONNX Runtime.
//!
//! Turns a 112×112 aligned RGB crop into a fixed-length descriptor
//! (128 values for the default model).

use crate::alignment::ALIGNED_SIZE;
use crate::types::{DescriptorError, FaceDescriptor};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const RECOGNIZER_MEAN: f32 = 127.5;
const RECOGNIZER_STD: f32 = 127.5;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("recognition model not found: {0}")]
    ModelNotFound(String),
    #[error("recognizer inference failed: {0}")]
    InferenceFailed(String),
    #[error("aligned face must be 112x112, got {0}x{1}")]
    BadInputSize(u32, u32),
    #[error("invalid descriptor: {0}")]
    Descriptor(#[from] DescriptorError),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Descriptor extractor.
pub struct FaceRecognizer {
    session: Session,
    descriptor_dim: usize,
}

impl FaceRecognizer {
    /// Load the recognition ONNX model; every descriptor it produces must have
    /// `descriptor_dim` components.
    pub fn load(model_path: &Path, descriptor_dim: usize) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            descriptor_dim,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded recognition model"
        );

        Ok(Self {
            session,
            descriptor_dim,
        })
    }

    pub fn descriptor_dim(&self) -> usize {
        self.descriptor_dim
    }

    /// Extract the descriptor of an aligned face crop.
    pub fn extract(&mut self, aligned: &RgbImage) -> Result<FaceDescriptor, RecognizerError> {
        if aligned.dimensions() != (ALIGNED_SIZE, ALIGNED_SIZE) {
            return Err(RecognizerError::BadInputSize(aligned.width(), aligned.height()));
        }

        let input = Self::preprocess(aligned);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("descriptor extraction: {e}")))?;

        check_dim(raw.len(), self.descriptor_dim)?;

        // Raw values, not L2-normalized: thresholds are calibrated on the model's own scale.
        Ok(FaceDescriptor::new(raw.to_vec())?)
    }

    /// Normalize an aligned RGB crop into a NCHW float tensor.
    fn preprocess(aligned: &RgbImage) -> Array4<f32> {
        let size = ALIGNED_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

        for (x, y, pixel) in aligned.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - RECOGNIZER_MEAN) / RECOGNIZER_STD;
            }
        }

        tensor
    }
}

fn check_dim(actual: usize, expected: usize) -> Result<(), RecognizerError> {
    if actual == expected {
        Ok(())
    } else {
        Err(RecognizerError::InferenceFailed(format!(
            "expected {expected}-dim descriptor, got {actual}"
        )))
    }
}
