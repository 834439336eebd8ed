//! Integration tests for the CycleGAN-VC training pipeline
//!
//! These run the full pipeline on small synthetic corpora: corpus loading,
//! feature extraction, statistics, training, checkpointing and validation.

use std::collections::BTreeSet;
use std::f64::consts::PI;
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use cyclegan_vc::audio::{load_wav, save_wav};
use cyclegan_vc::error::Error;
use cyclegan_vc::models::{LinearCycleGan, LinearCycleGanConfig};
use cyclegan_vc::normalization::{NormalizationArchive, LOGF0_ARCHIVE, MCEP_ARCHIVE};
use cyclegan_vc::tensor_file::TensorFile;
use cyclegan_vc::training::{read_metrics, CycleGanTrainer, TrainingConfig, CONFIG_FILE, METRICS_FILE};
use cyclegan_vc::vocoder::WorldVocoder;

const SAMPLE_RATE: u32 = 24000;

/// Harmonic glide with a slow amplitude swell and a little noise
fn synthetic_utterance(base_hz: f64, secs: f64, rng: &mut StdRng) -> Vec<f64> {
    let n = (secs * SAMPLE_RATE as f64) as usize;
    let glide = rng.gen_range(0.1..0.4);
    let mut phase = 0.0f64;
    (0..n)
        .map(|i| {
            let progress = i as f64 / n as f64;
            let freq = base_hz * (1.0 + glide * progress);
            phase += 2.0 * PI * freq / SAMPLE_RATE as f64;
            let amp = 0.15 + 0.2 * (PI * progress).sin();
            let voice = phase.sin() + 0.5 * (2.0 * phase).sin() + 0.25 * (3.0 * phase).sin();
            amp * voice + 0.002 * rng.gen_range(-1.0..1.0)
        })
        .collect()
}

fn write_corpus(dir: &Path, base_hz: f64, count: usize, seed: u64) {
    std::fs::create_dir_all(dir).unwrap();
    let mut rng = StdRng::seed_from_u64(seed);
    for i in 0..count {
        let secs = rng.gen_range(1.0..2.0);
        let samples = synthetic_utterance(base_hz, secs, &mut rng);
        save_wav(&samples, SAMPLE_RATE, dir.join(format!("utt_{:02}.wav", i))).unwrap();
    }
}

fn file_names(dir: &Path) -> BTreeSet<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

fn base_config(root: &Path) -> TrainingConfig {
    TrainingConfig::new()
        .with_n_frames(128)
        .with_num_epochs(1)
        .with_train_dirs(root.join("train_A"), root.join("train_B"))
        .with_validation_dirs(None, None)
        .with_model(root.join("model"), "a_to_b.safetensors")
        .with_output_dir(root.join("validation_output"))
        .with_log_dir(root.join("log"))
        .with_log_interval(1)
}

fn new_model(config: &TrainingConfig) -> LinearCycleGan {
    LinearCycleGan::new(
        LinearCycleGanConfig::default()
            .with_coded_dim(config.coded_dim)
            .with_seed(config.seed),
    )
    .unwrap()
}

// ============================================================================
// End-to-end training
// ============================================================================

#[test]
fn test_one_epoch_run_writes_archives_and_single_checkpoint() {
    let root = tempfile::tempdir().unwrap();
    write_corpus(&root.path().join("train_A"), 130.0, 10, 1);
    write_corpus(&root.path().join("train_B"), 220.0, 10, 2);

    let config = base_config(root.path());
    let vocoder = WorldVocoder::default();
    let mut trainer = CycleGanTrainer::new(config.clone(), new_model(&config), &vocoder).unwrap();
    let state = trainer.run().unwrap();

    assert_eq!(state.epochs_completed, 1);
    assert_eq!(state.iterations, 10);

    let pitch = TensorFile::open(config.model_dir.join(LOGF0_ARCHIVE)).unwrap();
    for name in ["mean_A", "std_A", "mean_B", "std_B"] {
        assert_eq!(pitch.tensor(name).unwrap().shape, vec![1], "{}", name);
    }
    let coded = TensorFile::open(config.model_dir.join(MCEP_ARCHIVE)).unwrap();
    for name in ["mean_A", "std_A", "mean_B", "std_B"] {
        assert_eq!(coded.tensor(name).unwrap().shape, vec![24], "{}", name);
    }

    let statistics = NormalizationArchive::load(&config.model_dir).unwrap();
    assert!(statistics.a.coded_sp.std.iter().all(|&s| s > 0.0));
    assert!(statistics.b.log_f0.mean > statistics.a.log_f0.mean);

    let expected: BTreeSet<String> = [CONFIG_FILE, LOGF0_ARCHIVE, MCEP_ARCHIVE, "a_to_b.safetensors"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(file_names(&config.model_dir), expected);

    let records = read_metrics(config.metrics_dir().join(METRICS_FILE)).unwrap();
    assert_eq!(records.len(), 10);
    assert!(records.iter().all(|r| r.generator_loss.is_finite()));

    let saved = TrainingConfig::from_yaml(config.model_dir.join(CONFIG_FILE)).unwrap();
    assert_eq!(saved, config);
}

#[test]
fn test_validation_writes_one_file_per_input() {
    let root = tempfile::tempdir().unwrap();
    write_corpus(&root.path().join("train_A"), 130.0, 4, 3);
    write_corpus(&root.path().join("train_B"), 220.0, 4, 4);
    write_corpus(&root.path().join("val_A"), 130.0, 2, 5);
    write_corpus(&root.path().join("val_B"), 220.0, 3, 6);

    let config = base_config(root.path())
        .with_validation_dirs(Some(root.path().join("val_A")), Some(root.path().join("val_B")));
    let vocoder = WorldVocoder::default();
    let mut trainer = CycleGanTrainer::new(config.clone(), new_model(&config), &vocoder).unwrap();
    let state = trainer.run().unwrap();

    assert_eq!(state.validation_reports.len(), 2);
    assert!(state.validation_reports.iter().all(|r| r.failed == 0));

    let epoch_a = config.output_dir.join("converted_A128").join("epoch_0");
    let epoch_b = config.output_dir.join("converted_B128").join("epoch_0");
    assert_eq!(file_names(&epoch_a), file_names(&root.path().join("val_A")));
    assert_eq!(file_names(&epoch_b).len(), 3);

    for name in file_names(&epoch_a) {
        let (samples, rate) = load_wav(epoch_a.join(&name)).unwrap();
        assert_eq!(rate, SAMPLE_RATE);
        assert!(!samples.is_empty());
        assert!(samples.iter().all(|s| s.is_finite()));
    }
}

#[test]
fn test_resume_continues_from_final_checkpoint() {
    let root = tempfile::tempdir().unwrap();
    write_corpus(&root.path().join("train_A"), 130.0, 3, 7);
    write_corpus(&root.path().join("train_B"), 220.0, 3, 8);

    let config = base_config(root.path());
    let vocoder = WorldVocoder::default();
    let mut first = CycleGanTrainer::new(config.clone(), new_model(&config), &vocoder).unwrap();
    first.run().unwrap();
    let first_step = first.model().step();

    let resumed_config = config.clone().with_resume_from(config.model_dir.join(&config.model_name));
    let mut second = CycleGanTrainer::new(resumed_config.clone(), new_model(&resumed_config), &vocoder).unwrap();
    let state = second.run().unwrap();

    // Iteration counter restarts, model step continues
    assert_eq!(state.iterations, 3);
    assert_eq!(second.model().step(), first_step + 3);
}

// ============================================================================
// Error handling
// ============================================================================

#[test]
fn test_missing_training_directory_fails() {
    let root = tempfile::tempdir().unwrap();
    write_corpus(&root.path().join("train_A"), 130.0, 2, 9);

    let config = base_config(root.path());
    let vocoder = WorldVocoder::default();
    let mut trainer = CycleGanTrainer::new(config.clone(), new_model(&config), &vocoder).unwrap();
    assert!(matches!(trainer.run(), Err(Error::Io(_))));
}

#[test]
fn test_corpus_shorter_than_segment_fails() {
    let root = tempfile::tempdir().unwrap();
    write_corpus(&root.path().join("train_A"), 130.0, 2, 10);
    write_corpus(&root.path().join("train_B"), 220.0, 2, 11);

    // 2 s at 5 ms is at most 401 frames
    let config = base_config(root.path()).with_n_frames(1000);
    let vocoder = WorldVocoder::default();
    let mut trainer = CycleGanTrainer::new(config.clone(), new_model(&config), &vocoder).unwrap();
    assert!(matches!(trainer.run(), Err(Error::Dataset(_))));

    // Statistics are persisted before training starts
    assert!(config.model_dir.join(LOGF0_ARCHIVE).is_file());
}
