//! CycleGAN-VC
//!
//! Training orchestration for non-parallel voice-style conversion with a
//! CycleGAN over vocoder features.
//!
//! # Features
//!
//! - **WORLD-style analysis**: pitch, spectral envelope and aperiodicity,
//!   with the envelope compressed to a fixed number of coefficients
//! - **Per-domain statistics**: log-F0 and coded-envelope mean/std, persisted
//!   as safetensors archives next to the checkpoints
//! - **Training loop**: random fixed-length segments, linear LR decay and an
//!   identity-weight switch driven by the global iteration counter
//! - **Validation**: periodic conversion of held-out utterances to WAV
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use cyclegan_vc::models::{LinearCycleGan, LinearCycleGanConfig};
//! use cyclegan_vc::training::{CycleGanTrainer, TrainingConfig};
//! use cyclegan_vc::vocoder::WorldVocoder;
//!
//! let config = TrainingConfig::default().with_n_frames(128).with_num_epochs(10);
//! let model = LinearCycleGan::new(LinearCycleGanConfig::default())?;
//! let vocoder = WorldVocoder::default();
//! CycleGanTrainer::new(config, model, &vocoder)?.run()?;
//! # Ok::<(), cyclegan_vc::Error>(())
//! ```

pub mod audio;
pub mod error;
pub mod models;
pub mod normalization;
pub mod preprocessing;
pub mod synthesis;
pub mod tensor_file;
pub mod training;
pub mod vocoder;

// Re-export main types
pub use error::{Error, Result};
pub use models::{CycleGanModel, Direction, Domain};
pub use training::{CycleGanTrainer, TrainingConfig};
pub use vocoder::{Vocoder, WorldVocoder};
