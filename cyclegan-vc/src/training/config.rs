//! Training configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::preprocessing::FeatureConfig;

/// Configuration for a CycleGAN-VC training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    // === Optimization ===
    /// Generator learning rate (default: 2e-4)
    pub generator_learning_rate: f64,

    /// Discriminator learning rate (default: 1e-4)
    pub discriminator_learning_rate: f64,

    /// Per-iteration generator LR decay once decay starts (default: 2e-4 / 5e6)
    pub generator_learning_rate_decay: f64,

    /// Per-iteration discriminator LR decay once decay starts (default: 1e-4 / 5e6)
    pub discriminator_learning_rate_decay: f64,

    /// Learning rates never decay below this (default: 1e-5)
    pub min_learning_rate: f64,

    // === Schedule ===
    /// Global iteration after which LR decay starts and identity weight drops (default: 100000)
    pub decay_start_iteration: usize,

    /// Number of epochs (default: 500)
    pub num_epochs: usize,

    /// Segments per mini-batch (default: 1)
    pub batch_size: usize,

    /// Frames per training segment (default: 128)
    pub n_frames: usize,

    // === Loss weights ===
    /// Cycle-consistency weight (default: 10.0)
    pub cycle_loss_weight: f64,

    /// Identity-mapping weight before decay starts (default: 5.0)
    pub identity_loss_weight: f64,

    /// Identity-mapping weight after decay starts (default: 0.5)
    pub identity_loss_weight_after_decay: f64,

    // === Features ===
    /// Corpus sample rate in Hz (default: 24000)
    pub sample_rate: u32,

    /// Analysis frame period in milliseconds (default: 5.0)
    pub frame_period: f64,

    /// Coded envelope dimension (default: 24)
    pub coded_dim: usize,

    /// Validation waveforms are padded to a multiple of this many frames (default: 4)
    pub padding_multiple: usize,

    // === Logging & validation ===
    /// Log metrics every N iterations within an epoch (default: 200)
    pub log_every_n_iterations: usize,

    /// Run validation every N epochs (default: 5)
    pub validate_every_n_epochs: usize,

    // === Paths ===
    pub train_a_dir: PathBuf,
    pub train_b_dir: PathBuf,
    /// A→B validation source, `None` disables
    pub validation_a_dir: Option<PathBuf>,
    /// B→A validation source, `None` disables
    pub validation_b_dir: Option<PathBuf>,
    pub model_dir: PathBuf,
    pub model_name: String,
    pub output_dir: PathBuf,
    pub log_dir: PathBuf,

    /// Checkpoint to restore before training
    pub resume_from: Option<PathBuf>,

    /// Random seed for reproducibility
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            // Optimization
            generator_learning_rate: 2e-4,
            discriminator_learning_rate: 1e-4,
            generator_learning_rate_decay: 2e-4 / 5e6,
            discriminator_learning_rate_decay: 1e-4 / 5e6,
            min_learning_rate: 1e-5,

            // Schedule
            decay_start_iteration: 100_000,
            num_epochs: 500,
            batch_size: 1,
            n_frames: 128,

            // Loss weights
            cycle_loss_weight: 10.0,
            identity_loss_weight: 5.0,
            identity_loss_weight_after_decay: 0.5,

            // Features
            sample_rate: 24000,
            frame_period: 5.0,
            coded_dim: 24,
            padding_multiple: 4,

            // Logging & validation
            log_every_n_iterations: 200,
            validate_every_n_epochs: 5,

            // Paths
            train_a_dir: PathBuf::from("./data/training/NEUTRAL"),
            train_b_dir: PathBuf::from("./data/training/SURPRISE"),
            validation_a_dir: Some(PathBuf::from("./data/evaluation_all/NEUTRAL")),
            validation_b_dir: Some(PathBuf::from("./data/evaluation_all/SURPRISE")),
            model_dir: PathBuf::from("./model/neutral_to_surprise_mceps"),
            model_name: "neutral_to_surprise_mceps.safetensors".to_string(),
            output_dir: PathBuf::from("./validation_output"),
            log_dir: PathBuf::from("./log"),
            resume_from: None,

            seed: 0,
        }
    }
}

impl TrainingConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set frames per training segment
    pub fn with_n_frames(mut self, n_frames: usize) -> Self {
        self.n_frames = n_frames;
        self
    }

    /// Set number of epochs
    pub fn with_num_epochs(mut self, num_epochs: usize) -> Self {
        self.num_epochs = num_epochs;
        self
    }

    /// Set batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set both initial learning rates, rescaling their decay to reach zero after 5e6 iterations
    pub fn with_learning_rates(mut self, generator: f64, discriminator: f64) -> Self {
        self.generator_learning_rate = generator;
        self.discriminator_learning_rate = discriminator;
        self.generator_learning_rate_decay = generator / 5e6;
        self.discriminator_learning_rate_decay = discriminator / 5e6;
        self
    }

    /// Set training corpus directories
    pub fn with_train_dirs(mut self, a: impl Into<PathBuf>, b: impl Into<PathBuf>) -> Self {
        self.train_a_dir = a.into();
        self.train_b_dir = b.into();
        self
    }

    /// Set validation directories, `None` disables that direction
    pub fn with_validation_dirs(mut self, a: Option<PathBuf>, b: Option<PathBuf>) -> Self {
        self.validation_a_dir = a;
        self.validation_b_dir = b;
        self
    }

    /// Set model directory and checkpoint name
    pub fn with_model(mut self, dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        self.model_dir = dir.into();
        self.model_name = name.into();
        self
    }

    /// Set validation output directory
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set metrics log directory
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    /// Set checkpoint to resume from
    pub fn with_resume_from(mut self, path: impl Into<PathBuf>) -> Self {
        self.resume_from = Some(path.into());
        self
    }

    /// Set random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set log interval
    pub fn with_log_interval(mut self, iterations: usize) -> Self {
        self.log_every_n_iterations = iterations;
        self
    }

    /// Set validation interval
    pub fn with_validation_interval(mut self, epochs: usize) -> Self {
        self.validate_every_n_epochs = epochs;
        self
    }

    /// Analysis settings derived from this config
    pub fn feature_config(&self) -> FeatureConfig {
        FeatureConfig {
            sample_rate: self.sample_rate,
            frame_period: self.frame_period,
            coded_dim: self.coded_dim,
        }
    }

    /// Name of the per-epoch checkpoint
    pub fn epoch_checkpoint_name(&self) -> String {
        format!("{}_{}", self.n_frames, self.model_name)
    }

    /// Directory holding the metrics log
    pub fn metrics_dir(&self) -> PathBuf {
        self.log_dir.join(self.n_frames.to_string())
    }

    /// Load config from YAML file
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save config to YAML file
    pub fn to_yaml(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.n_frames == 0 {
            return Err(Error::config("n_frames must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be at least 1"));
        }
        if self.num_epochs == 0 {
            return Err(Error::config("num_epochs must be at least 1"));
        }
        if !(self.generator_learning_rate > 0.0 && self.discriminator_learning_rate > 0.0) {
            return Err(Error::config("learning rates must be positive"));
        }
        if self.generator_learning_rate_decay < 0.0 || self.discriminator_learning_rate_decay < 0.0 {
            return Err(Error::config("learning rate decay must not be negative"));
        }
        if self.min_learning_rate < 0.0
            || self.min_learning_rate > self.generator_learning_rate
            || self.min_learning_rate > self.discriminator_learning_rate
        {
            return Err(Error::config(
                "min_learning_rate must be between 0 and the initial learning rates",
            ));
        }
        if self.coded_dim < 2 {
            return Err(Error::config("coded_dim must be at least 2"));
        }
        if !(self.frame_period > 0.0) {
            return Err(Error::config("frame_period must be positive"));
        }
        if self.sample_rate == 0 {
            return Err(Error::config("sample_rate must be positive"));
        }
        if self.padding_multiple == 0 {
            return Err(Error::config("padding_multiple must be at least 1"));
        }
        if self.validate_every_n_epochs == 0 {
            return Err(Error::config("validate_every_n_epochs must be at least 1"));
        }
        if self.log_every_n_iterations == 0 {
            return Err(Error::config("log_every_n_iterations must be at least 1"));
        }
        if self.model_name.is_empty() {
            return Err(Error::config("model_name must not be empty"));
        }
        Ok(())
    }
}
