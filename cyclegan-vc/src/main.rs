//! CycleGAN-VC training CLI
//!
//! # Usage
//!
//! ```bash
//! cyclegan-vc --num-f 128 \
//!     --train-a-dir data/training/NEUTRAL --train-b-dir data/training/SURPRISE \
//!     --validation-a-dir data/evaluation_all/NEUTRAL --validation-b-dir none \
//!     --model-dir model/neutral_to_surprise --model-name neutral_to_surprise.safetensors
//!
//! # Continue from the final checkpoint of a previous run
//! cyclegan-vc --num-f 128 --model-dir model/neutral_to_surprise --resume
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use cyclegan_vc::models::{LinearCycleGan, LinearCycleGanConfig};
use cyclegan_vc::training::{format_hms, CycleGanTrainer, TrainingConfig};
use cyclegan_vc::vocoder::WorldVocoder;

#[derive(Parser, Debug)]
#[command(name = "cyclegan-vc")]
#[command(about = "Train a CycleGAN voice converter between two speaking styles")]
struct Cli {
    /// Frame length of training segments
    #[arg(long = "num-f", visible_alias = "n-frames", value_parser = clap::value_parser!(u64).range(1..))]
    num_f: u64,

    /// Training directory for domain A
    #[arg(long)]
    train_a_dir: Option<PathBuf>,

    /// Training directory for domain B
    #[arg(long)]
    train_b_dir: Option<PathBuf>,

    /// Validation directory for A→B conversion ("none" disables)
    #[arg(long)]
    validation_a_dir: Option<String>,

    /// Validation directory for B→A conversion ("none" disables)
    #[arg(long)]
    validation_b_dir: Option<String>,

    /// Directory for checkpoints and normalization statistics
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// File name of the final checkpoint
    #[arg(long)]
    model_name: Option<String>,

    /// Random seed for model initialization and segment sampling
    #[arg(long)]
    random_seed: Option<u64>,

    /// Output directory for converted validation audio
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Directory for the metrics log
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Number of training epochs
    #[arg(long)]
    num_epochs: Option<usize>,

    /// YAML training config; command-line flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Resume from the final checkpoint in the model directory
    #[arg(long)]
    resume: bool,

    /// Resume from an explicit checkpoint file
    #[arg(long, conflicts_with = "resume")]
    resume_from: Option<PathBuf>,
}

/// "none" (any case) disables a validation direction
fn validation_dir(value: String) -> Option<PathBuf> {
    if value.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

fn build_config(cli: Cli) -> Result<TrainingConfig> {
    let mut config = match &cli.config {
        Some(path) => TrainingConfig::from_yaml(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => TrainingConfig::default(),
    };

    config.n_frames = usize::try_from(cli.num_f).context("--num-f is too large")?;
    if let Some(dir) = cli.train_a_dir {
        config.train_a_dir = dir;
    }
    if let Some(dir) = cli.train_b_dir {
        config.train_b_dir = dir;
    }
    if let Some(value) = cli.validation_a_dir {
        config.validation_a_dir = validation_dir(value);
    }
    if let Some(value) = cli.validation_b_dir {
        config.validation_b_dir = validation_dir(value);
    }
    if let Some(dir) = cli.model_dir {
        config.model_dir = dir;
    }
    if let Some(name) = cli.model_name {
        config.model_name = name;
    }
    if let Some(seed) = cli.random_seed {
        config.seed = seed;
    }
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    if let Some(dir) = cli.log_dir {
        config.log_dir = dir;
    }
    if let Some(epochs) = cli.num_epochs {
        config.num_epochs = epochs;
    }
    if cli.resume {
        config.resume_from = Some(config.model_dir.join(&config.model_name));
    }
    if let Some(path) = cli.resume_from {
        config.resume_from = Some(path);
    }

    config.validate().context("invalid training config")?;
    Ok(config)
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_target(false)
        .init();

    let config = build_config(Cli::parse())?;
    info!(
        n_frames = config.n_frames,
        train_a = %config.train_a_dir.display(),
        train_b = %config.train_b_dir.display(),
        model_dir = %config.model_dir.display(),
        seed = config.seed,
        "Starting CycleGAN-VC training"
    );

    let model = LinearCycleGan::new(
        LinearCycleGanConfig::default()
            .with_coded_dim(config.coded_dim)
            .with_seed(config.seed),
    )
    .context("failed to initialize model")?;
    let vocoder = WorldVocoder::default();

    let mut trainer = CycleGanTrainer::new(config, model, &vocoder)?;
    let state = trainer.run().context("training failed")?;

    info!(
        epochs = state.epochs_completed,
        iterations = state.iterations,
        elapsed = %format_hms(std::time::Duration::from_secs_f64(state.total_time_secs)),
        "Done"
    );
    Ok(())
}
