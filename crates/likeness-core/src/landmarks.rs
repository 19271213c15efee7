//! 68-point facial landmark regressor via ONNX Runtime.
//!
//! Runs on a square crop around the detected face and returns points in
//! image coordinates. The five alignment points are derived from the 68
//! (see [`FaceLandmarks::alignment_points`]).

use crate::alignment::{crop_matrix, warp_affine};
use crate::types::{BoundingBox, FaceLandmarks};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const LANDMARK_INPUT_SIZE: u32 = 112;
/// Crop side relative to the longer bounding-box side; the detector box is
/// tight and jaw points fall outside it.
const LANDMARK_CROP_SCALE: f32 = 1.2;
const LANDMARK_OUTPUTS: usize = FaceLandmarks::COUNT * 2;

#[derive(Error, Debug)]
pub enum LandmarkError {
    #[error("landmark model not found: {0}")]
    ModelNotFound(String),
    #[error("landmark inference failed: {0}")]
    InferenceFailed(String),
    #[error("face box is degenerate ({width}x{height})")]
    DegenerateBox { width: f32, height: f32 },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Square region of the source image fed to the network.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CropWindow {
    left: f32,
    top: f32,
    side: f32,
}

impl CropWindow {
    fn around(face: &BoundingBox) -> Result<Self, LandmarkError> {
        if !(face.width > 0.0 && face.height > 0.0) {
            return Err(LandmarkError::DegenerateBox {
                width: face.width,
                height: face.height,
            });
        }
        let (cx, cy) = face.center();
        let side = face.width.max(face.height) * LANDMARK_CROP_SCALE;
        Ok(Self {
            left: cx - side / 2.0,
            top: cy - side / 2.0,
            side,
        })
    }

    /// Map a point normalized to the crop ([0, 1]²) back to image coordinates.
    fn to_image(self, nx: f32, ny: f32) -> (f32, f32) {
        (self.left + nx * self.side, self.top + ny * self.side)
    }
}

/// PFLD-style 68-point landmark predictor.
pub struct LandmarkPredictor {
    session: Session,
}

impl LandmarkPredictor {
    /// Load the landmark ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, LandmarkError> {
        if !model_path.exists() {
            return Err(LandmarkError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded landmark model"
        );

        Ok(Self { session })
    }

    /// Predict 68 landmarks for `face` in `image`.
    pub fn predict(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<FaceLandmarks, LandmarkError> {
        let window = CropWindow::around(face)?;
        let crop = warp_affine(
            image,
            &crop_matrix(window.left, window.top, window.side, LANDMARK_INPUT_SIZE),
            LANDMARK_INPUT_SIZE,
        );
        let input = Self::preprocess(&crop);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        // Some exports emit a pose/auxiliary head first; the landmark head is the
        // first output with exactly 136 values.
        let raw = (0..outputs.len())
            .filter_map(|i| outputs[i].try_extract_tensor::<f32>().ok())
            .map(|(_, data)| data)
            .find(|data| data.len() == LANDMARK_OUTPUTS)
            .ok_or_else(|| {
                LandmarkError::InferenceFailed(format!("no output with {LANDMARK_OUTPUTS} values"))
            })?;

        decode_points(raw, window)
    }

    /// Scale an RGB crop into a NCHW tensor in [0, 1].
    fn preprocess(crop: &RgbImage) -> Array4<f32> {
        let size = LANDMARK_INPUT_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in crop.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
            }
        }
        tensor
    }
}

fn decode_points(raw: &[f32], window: CropWindow) -> Result<FaceLandmarks, LandmarkError> {
    if let Some(i) = raw.iter().position(|v| !v.is_finite()) {
        return Err(LandmarkError::InferenceFailed(format!("landmark value {i} is not finite")));
    }

    let points = raw
        .chunks_exact(2)
        .map(|xy| window.to_image(xy[0], xy[1]))
        .collect();

    FaceLandmarks::new(points).ok_or_else(|| {
        LandmarkError::InferenceFailed(format!("expected {LANDMARK_OUTPUTS} values, got {}", raw.len()))
    })
}
