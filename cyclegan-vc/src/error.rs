use std::path::PathBuf;

/// Error types for the CycleGAN-VC training pipeline
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =================== IO Errors ===================
    /// Standard IO error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML (de)serialization error (training config files)
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error (metrics log)
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Safetensors encode/decode error (checkpoints, statistics archives)
    #[error(transparent)]
    SafeTensors(#[from] safetensors::SafeTensorError),

    // =================== Input Errors ===================
    /// Audio decoding, resampling or encoding error
    #[error("audio error: {0}")]
    Audio(String),

    /// A waveform that cannot be analyzed (empty, non-finite samples, ...)
    #[error("invalid waveform {path}: {reason}")]
    InvalidWaveform { path: PathBuf, reason: String },

    /// Corpus or segment sampling error
    #[error("dataset error: {0}")]
    Dataset(String),

    // =================== Statistics Errors ===================
    /// Statistics could not be fitted
    #[error("statistics error: {0}")]
    Statistics(String),

    /// A coded feature dimension has zero variance across the whole domain
    #[error("coded feature dimension {dimension} has zero standard deviation")]
    DegenerateStatistics { dimension: usize },

    /// Statistics archive is missing a tensor or has the wrong layout
    #[error("archive {path}: {reason}")]
    Archive { path: PathBuf, reason: String },

    // =================== Model Errors ===================
    /// Training step or inference failure (divergence, shape mismatch, ...)
    #[error("model error: {0}")]
    Model(String),

    /// Checkpoint missing or incompatible with the model
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// Vocoder analysis or synthesis failure
    #[error("vocoder error: {0}")]
    Vocoder(String),

    // =================== Configuration Errors ===================
    /// Invalid training configuration
    #[error("config error: {0}")]
    Config(String),
}

/// Result type for CycleGAN-VC operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an audio error
    pub fn audio(msg: impl Into<String>) -> Self {
        Self::Audio(msg.into())
    }

    /// Create an invalid waveform error
    pub fn invalid_waveform(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidWaveform {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a dataset error
    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    /// Create a statistics error
    pub fn statistics(msg: impl Into<String>) -> Self {
        Self::Statistics(msg.into())
    }

    /// Create an archive error
    pub fn archive(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Archive {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a model error
    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    /// Create a checkpoint error
    pub fn checkpoint(msg: impl Into<String>) -> Self {
        Self::Checkpoint(msg.into())
    }

    /// Create a vocoder error
    pub fn vocoder(msg: impl Into<String>) -> Self {
        Self::Vocoder(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
