//! CycleGAN training loop

use std::path::{Path, PathBuf};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{CycleGanModel, Direction, StepLosses};
use crate::preprocessing::{DomainCorpus, PreparedCorpora, PreprocessingPipeline};
use crate::synthesis::{validation_output_dir, ValidationReport, ValidationSynthesizer};
use crate::vocoder::Vocoder;

use super::config::TrainingConfig;
use super::dataset::sample_train_data;
use super::format_hms;
use super::metrics::{MetricsLog, MetricsRecord};
use super::schedule::{ScheduleState, TrainingSchedule};

/// File name of the effective config written into the model directory
pub const CONFIG_FILE: &str = "config.yaml";

/// Progress of a training run
#[derive(Debug, Clone, Default)]
pub struct TrainingState {
    /// Epochs completed
    pub epochs_completed: usize,
    /// Global iterations run
    pub iterations: usize,
    /// Losses of the last step
    pub last_losses: Option<StepLosses>,
    /// Validation passes run
    pub validation_reports: Vec<ValidationReport>,
    /// Final checkpoint, set once training completes
    pub final_checkpoint: Option<PathBuf>,
    /// Total training time in seconds
    pub total_time_secs: f64,
}

/// Drives a [`CycleGanModel`] through preprocessing, training, checkpointing and validation
pub struct CycleGanTrainer<'a, M: CycleGanModel, V: Vocoder> {
    /// Training configuration
    config: TrainingConfig,
    /// Model being trained
    model: M,
    /// Vocoder for feature extraction and validation synthesis
    vocoder: &'a V,
    /// Rates and weights per global iteration
    schedule: TrainingSchedule,
    /// Segment sampling RNG
    rng: StdRng,
    /// Training state
    state: TrainingState,
}

impl<'a, M: CycleGanModel, V: Vocoder> CycleGanTrainer<'a, M, V> {
    /// Create a new trainer
    pub fn new(config: TrainingConfig, model: M, vocoder: &'a V) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            schedule: TrainingSchedule::from_config(&config),
            rng: StdRng::seed_from_u64(config.seed),
            config,
            model,
            vocoder,
            state: TrainingState::default(),
        })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    /// Get current training state
    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    /// Full run: restore, preprocess, train.
    pub fn run(&mut self) -> Result<TrainingState> {
        std::fs::create_dir_all(&self.config.model_dir)?;
        self.config.to_yaml(self.config.model_dir.join(CONFIG_FILE))?;

        if let Some(path) = self.config.resume_from.clone() {
            self.resume(&path)?;
        }

        let pipeline = PreprocessingPipeline::new(self.vocoder, self.config.feature_config());
        let corpora = pipeline.prepare(
            &self.config.train_a_dir,
            &self.config.train_b_dir,
            &self.config.model_dir,
        )?;

        self.train(&corpora)
    }

    /// Restore model state from a checkpoint.
    pub fn resume(&mut self, path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(Error::checkpoint(format!(
                "cannot resume, checkpoint not found: {}",
                path.display()
            )));
        }
        self.model.load(path)?;
        info!(path = %path.display(), "Resumed from checkpoint");
        Ok(())
    }

    /// Train on prepared corpora for `num_epochs` epochs.
    pub fn train(&mut self, corpora: &PreparedCorpora) -> Result<TrainingState> {
        let config = self.config.clone();
        let start_time = Instant::now();

        info!(
            epochs = config.num_epochs,
            batch_size = config.batch_size,
            n_frames = config.n_frames,
            utterances_a = corpora.a.len(),
            utterances_b = corpora.b.len(),
            "Starting training"
        );

        for corpus in [&corpora.a, &corpora.b] {
            let short = short_utterances(corpus, config.n_frames);
            if !short.is_empty() {
                warn!(
                    domain = %corpus.domain,
                    count = short.len(),
                    n_frames = config.n_frames,
                    "Utterances shorter than a segment are never sampled"
                );
                for path in short {
                    debug!(domain = %corpus.domain, file = %path.display(), "Too short to sample");
                }
            }
        }

        let mut metrics = MetricsLog::open(config.metrics_dir())?;
        let synthesizer = ValidationSynthesizer::new(
            self.vocoder,
            &corpora.statistics,
            config.feature_config(),
            config.padding_multiple,
        );
        let epoch_checkpoint = config.epoch_checkpoint_name();

        for epoch in 0..config.num_epochs {
            let epoch_start = Instant::now();

            let segments = sample_train_data(
                &corpora.a.normalized,
                &corpora.b.normalized,
                config.n_frames,
                &mut self.rng,
            )?;
            let batches_per_epoch = segments.num_batches(config.batch_size);
            if batches_per_epoch == 0 {
                return Err(Error::dataset(format!(
                    "{} segment pairs cannot fill a batch of {}",
                    segments.len(),
                    config.batch_size
                )));
            }

            for (i, batch) in segments.batches(config.batch_size).enumerate() {
                let batch = batch?;
                let schedule = self.schedule.state_at(self.state.iterations);

                let losses = self
                    .model
                    .train_step(&batch.a, &batch.b, schedule.weights, schedule.rates)?;
                if !(losses.generator.is_finite() && losses.discriminator.is_finite()) {
                    return Err(Error::model(format!(
                        "training diverged at iteration {}: generator loss {}, discriminator loss {}",
                        schedule.iteration, losses.generator, losses.discriminator
                    )));
                }

                self.state.iterations = schedule.iteration + 1;
                self.state.last_losses = Some(losses);

                if i % config.log_every_n_iterations == 0 {
                    log_iteration(epoch, &schedule, &losses);
                    metrics.append(&MetricsRecord {
                        epoch,
                        iteration: schedule.iteration,
                        generator_learning_rate: schedule.rates.generator,
                        discriminator_learning_rate: schedule.rates.discriminator,
                        cycle_loss_weight: schedule.weights.cycle,
                        identity_loss_weight: schedule.weights.identity,
                        generator_loss: losses.generator,
                        discriminator_loss: losses.discriminator,
                    })?;
                }
            }

            self.model.save(&config.model_dir, &epoch_checkpoint)?;
            self.state.epochs_completed = epoch + 1;
            info!(
                epoch,
                elapsed = %format_hms(epoch_start.elapsed()),
                "Epoch done"
            );

            if epoch % config.validate_every_n_epochs == 0 {
                let reports = self.validate(&synthesizer, epoch)?;
                self.state.validation_reports.extend(reports);
            }
        }

        let final_path = self.model.save(&config.model_dir, &config.model_name)?;
        let epoch_path = config.model_dir.join(&epoch_checkpoint);
        if epoch_path != final_path && epoch_path.exists() {
            std::fs::remove_file(&epoch_path)?;
        }
        self.state.final_checkpoint = Some(final_path.clone());
        self.state.total_time_secs = start_time.elapsed().as_secs_f64();

        info!(
            checkpoint = %final_path.display(),
            iterations = self.state.iterations,
            elapsed = %format_hms(start_time.elapsed()),
            "Training complete"
        );
        Ok(self.state.clone())
    }

    /// Convert every configured validation directory at `epoch`.
    fn validate(&self, synthesizer: &ValidationSynthesizer<'_, V>, epoch: usize) -> Result<Vec<ValidationReport>> {
        let passes = [
            (self.config.validation_a_dir.as_ref(), Direction::AToB),
            (self.config.validation_b_dir.as_ref(), Direction::BToA),
        ];

        let mut reports = Vec::new();
        for (source_dir, direction) in passes {
            let Some(source_dir) = source_dir else {
                continue;
            };
            info!(epoch, direction = %direction, "Generating validation data");
            let output_dir = validation_output_dir(&self.config.output_dir, direction, self.config.n_frames, epoch);
            let report = synthesizer.convert_directory(&self.model, direction, source_dir, &output_dir)?;
            if report.failed > 0 {
                warn!(epoch, direction = %direction, failed = report.failed, "Some validation files failed");
            }
            reports.push(report);
        }
        Ok(reports)
    }
}

/// Source files with fewer than `n_frames` frames
fn short_utterances(corpus: &DomainCorpus, n_frames: usize) -> Vec<&Path> {
    corpus
        .files
        .iter()
        .zip(&corpus.normalized)
        .filter(|(_, coded)| coded.ncols() < n_frames)
        .map(|(path, _)| path.as_path())
        .collect()
}

fn log_iteration(epoch: usize, schedule: &ScheduleState, losses: &StepLosses) {
    info!(
        epoch,
        iteration = schedule.iteration,
        generator_lr = format!("{:.8}", schedule.rates.generator),
        discriminator_lr = format!("{:.8}", schedule.rates.discriminator),
        generator_loss = format!("{:.4}", losses.generator),
        discriminator_loss = format!("{:.4}", losses.discriminator),
        "Training step"
    );
}
