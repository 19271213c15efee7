use likeness_core::detector::DEFAULT_MIN_CONFIDENCE;
use likeness_core::types::ThresholdError;
use likeness_core::{AnalyzerOptions, FaceSelection, ModelFiles, Threshold, DEFAULT_DESCRIPTOR_DIM, DEFAULT_THRESHOLD};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error(transparent)]
    Threshold(#[from] ThresholdError),
    #[error("min_confidence must be within [0, 1], got {0}")]
    MinConfidence(f32),
    #[error("descriptor_dim must be > 0")]
    DescriptorDim,
}

/// Comparison settings.
///
/// Layered: built-in defaults, then an optional TOML file, then `LIKENESS_*`
/// environment variables, then command-line flags.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding the three ONNX artifacts.
    pub model_dir: PathBuf,
    /// Artifact file names inside `model_dir`.
    pub models: ModelFiles,
    /// Maximum descriptor distance still classified as a match (exclusive).
    pub threshold: f32,
    /// Which face to compare when an image holds several.
    pub selection: FaceSelection,
    /// Detector score a face must exceed.
    pub min_confidence: f32,
    /// Expected descriptor length.
    pub descriptor_dim: usize,
    /// Per-comparison timeout in seconds; 0 waits indefinitely.
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: likeness_core::default_model_dir(),
            models: ModelFiles::default(),
            threshold: DEFAULT_THRESHOLD,
            selection: FaceSelection::default(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            descriptor_dim: DEFAULT_DESCRIPTOR_DIM,
            timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load the file named by `explicit` (or `$LIKENESS_CONFIG`), then apply
    /// environment overrides. With no file, starts from the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let file = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("LIKENESS_CONFIG").map(PathBuf::from));

        let mut config = match file {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Apply `LIKENESS_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = lookup("LIKENESS_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("LIKENESS_THRESHOLD") {
            self.threshold = parse_var("LIKENESS_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("LIKENESS_SELECTION") {
            self.selection = parse_var("LIKENESS_SELECTION", &v)?;
        }
        if let Some(v) = lookup("LIKENESS_MIN_CONFIDENCE") {
            self.min_confidence = parse_var("LIKENESS_MIN_CONFIDENCE", &v)?;
        }
        if let Some(v) = lookup("LIKENESS_DESCRIPTOR_DIM") {
            self.descriptor_dim = parse_var("LIKENESS_DESCRIPTOR_DIM", &v)?;
        }
        if let Some(v) = lookup("LIKENESS_TIMEOUT_SECS") {
            self.timeout_secs = parse_var("LIKENESS_TIMEOUT_SECS", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.threshold()?;
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::MinConfidence(self.min_confidence));
        }
        if self.descriptor_dim == 0 {
            return Err(ConfigError::DescriptorDim);
        }
        Ok(())
    }

    pub fn threshold(&self) -> Result<Threshold, ConfigError> {
        Ok(Threshold::new(self.threshold)?)
    }

    pub fn analyzer_options(&self) -> AnalyzerOptions {
        AnalyzerOptions {
            selection: self.selection,
            min_confidence: self.min_confidence,
            descriptor_dim: self.descriptor_dim,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

fn parse_var<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}
