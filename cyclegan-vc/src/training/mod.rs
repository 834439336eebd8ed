//! CycleGAN-VC training
//!
//! # Overview
//!
//! A training run consists of:
//! 1. Feature extraction and statistics for both training corpora
//! 2. Per-epoch random segment sampling
//! 3. One `train_step` per mini-batch, with learning rates and loss weights
//!    taken from the global iteration counter
//! 4. A checkpoint per epoch and validation conversion every few epochs
//!
//! # Example
//!
//! ```rust,no_run
//! use cyclegan_vc::models::{LinearCycleGan, LinearCycleGanConfig};
//! use cyclegan_vc::training::{CycleGanTrainer, TrainingConfig};
//! use cyclegan_vc::vocoder::WorldVocoder;
//!
//! let config = TrainingConfig::default()
//!     .with_n_frames(128)
//!     .with_train_dirs("data/train_A", "data/train_B");
//!
//! let model = LinearCycleGan::new(LinearCycleGanConfig::default().with_seed(config.seed))?;
//! let vocoder = WorldVocoder::default();
//! let mut trainer = CycleGanTrainer::new(config, model, &vocoder)?;
//! trainer.run()?;
//! # Ok::<(), cyclegan_vc::Error>(())
//! ```

mod config;
mod dataset;
mod metrics;
mod schedule;
mod trainer;

use std::time::Duration;

pub use config::TrainingConfig;
pub use dataset::{sample_train_data, SampledSegments, SegmentBatch};
pub use metrics::{read_metrics, MetricsLog, MetricsRecord, METRICS_FILE};
pub use schedule::{LinearDecayScheduler, ScheduleState, TrainingSchedule};
pub use trainer::{CycleGanTrainer, TrainingState, CONFIG_FILE};

/// Format a duration as `HH:MM:SS`
pub fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
