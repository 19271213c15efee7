//! likeness-core: decide whether two photos show the same face.
//!
//! Detection (SCRFD), 68-point landmarks and descriptor extraction run via
//! ONNX Runtime behind the [`FaceAnalyzer`] trait; the matcher only sees
//! descriptors, measures their Euclidean distance and applies a threshold.

pub mod alignment;
pub mod analyzer;
pub mod detector;
pub mod image_io;
pub mod landmarks;
pub mod matcher;
pub mod models;
pub mod recognizer;
pub mod types;

use std::path::PathBuf;

pub use analyzer::{AnalyzerError, FaceAnalyzer};
pub use image_io::{decode_bytes, decode_file, DecodeError, DecodedImage};
pub use matcher::{classify, compare_faces, compare_files, euclidean_distance, CompareError};
pub use models::{AnalyzerOptions, FaceModels, ModelFiles, ModelLoadError, ModelPaths};
pub use types::{
    AnalyzedFace, BoundingBox, FaceDescriptor, FaceLandmarks, FaceSelection, ImageSlot, MatchDecision,
    MatchOutcome, MissingFace, Threshold, DEFAULT_DESCRIPTOR_DIM, DEFAULT_THRESHOLD,
};

/// Default model directory: `$XDG_DATA_HOME/likeness/models`, falling back
/// to `~/.local/share/likeness/models`, or `/tmp` when `HOME` is unset.
pub fn default_model_dir() -> PathBuf {
    model_dir_from(|key| std::env::var(key).ok())
}

fn model_dir_from(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    let data_home = match (lookup("XDG_DATA_HOME"), lookup("HOME")) {
        (Some(xdg), _) => PathBuf::from(xdg),
        (None, Some(home)) => PathBuf::from(home).join(".local/share"),
        (None, None) => {
            let fallback = PathBuf::from("/tmp/.local/share");
            tracing::warn!(
                dir = %fallback.display(),
                "neither XDG_DATA_HOME nor HOME is set; default model directory is under /tmp"
            );
            fallback
        }
    };
    data_home.join("likeness").join("models")
}
