//! Training data preparation
//!
//! Runs once at the start of every training run:
//!
//! - **Corpus loading**: every WAV file of both training directories
//! - **Feature extraction**: vocoder decomposition and envelope coding
//! - **Statistics**: log-F0 and coded-envelope statistics per domain,
//!   persisted to the model directory before any training step
//! - **Normalization**: coded envelopes transposed to [coded_dim, frames]
//!   and normalized with their own domain's statistics
//!
//! # Example
//!
//! ```rust,no_run
//! use cyclegan_vc::preprocessing::{FeatureConfig, PreprocessingPipeline};
//! use cyclegan_vc::vocoder::WorldVocoder;
//!
//! let vocoder = WorldVocoder::default();
//! let pipeline = PreprocessingPipeline::new(&vocoder, FeatureConfig::default());
//! let corpora = pipeline.prepare("data/train_A", "data/train_B", "model")?;
//! println!("{} / {} utterances", corpora.a.len(), corpora.b.len());
//! # Ok::<(), cyclegan_vc::Error>(())
//! ```

mod features;

pub use features::{FeatureExtractor, UtteranceFeatures};

use std::path::{Path, PathBuf};
use std::time::Instant;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::audio::load_utterances;
use crate::error::Result;
use crate::models::Domain;
use crate::normalization::{CodedSpStatistics, DomainStatistics, LogF0Statistics, NormalizationArchive};
use crate::training::format_hms;
use crate::vocoder::Vocoder;

/// Analysis settings shared by training and validation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Corpus sample rate in Hz (default: 24000)
    pub sample_rate: u32,
    /// Analysis frame period in milliseconds (default: 5.0)
    pub frame_period: f64,
    /// Coded envelope dimension (default: 24)
    pub coded_dim: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24000,
            frame_period: 5.0,
            coded_dim: 24,
        }
    }
}

/// Normalized training features of one domain
#[derive(Debug, Clone)]
pub struct DomainCorpus {
    pub domain: Domain,
    /// Source file of each utterance
    pub files: Vec<PathBuf>,
    /// Normalized coded envelopes, each [coded_dim, frames]
    pub normalized: Vec<Array2<f64>>,
}

impl DomainCorpus {
    pub fn len(&self) -> usize {
        self.normalized.len()
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }
}

/// Both training domains plus the statistics fitted on them
#[derive(Debug, Clone)]
pub struct PreparedCorpora {
    pub a: DomainCorpus,
    pub b: DomainCorpus,
    pub statistics: NormalizationArchive,
}

/// Fit pitch and coded-envelope statistics of one domain.
pub fn fit_domain(features: &[UtteranceFeatures]) -> Result<DomainStatistics> {
    let log_f0 = LogF0Statistics::fit(features.iter().map(|f| &f.f0))?;
    let transposed: Vec<Array2<f64>> = features.iter().map(|f| f.coded_sp_transposed()).collect();
    let coded_sp = CodedSpStatistics::fit(&transposed)?;
    Ok(DomainStatistics { log_f0, coded_sp })
}

/// Corpus loading, feature extraction and statistics for a training run
pub struct PreprocessingPipeline<'a, V: Vocoder> {
    extractor: FeatureExtractor<'a, V>,
}

impl<'a, V: Vocoder> PreprocessingPipeline<'a, V> {
    pub fn new(vocoder: &'a V, config: FeatureConfig) -> Self {
        Self {
            extractor: FeatureExtractor::new(vocoder, config),
        }
    }

    pub fn config(&self) -> &FeatureConfig {
        self.extractor.config()
    }

    /// Load and extract features for one domain's training directory.
    pub fn extract_domain(&self, domain: Domain, dir: impl AsRef<Path>) -> Result<Vec<UtteranceFeatures>> {
        let start = Instant::now();
        let utterances = load_utterances(dir, self.config().sample_rate)?;
        let features = self.extractor.extract_all(&utterances)?;

        let frames: usize = features.iter().map(|f| f.num_frames()).sum();
        info!(
            domain = %domain,
            utterances = features.len(),
            frames,
            elapsed = %format_hms(start.elapsed()),
            "Extracted features"
        );
        Ok(features)
    }

    /// Prepare both domains, persisting their statistics into `model_dir`.
    pub fn prepare(
        &self,
        train_a_dir: impl AsRef<Path>,
        train_b_dir: impl AsRef<Path>,
        model_dir: impl AsRef<Path>,
    ) -> Result<PreparedCorpora> {
        let start = Instant::now();

        let features_a = self.extract_domain(Domain::A, train_a_dir)?;
        let features_b = self.extract_domain(Domain::B, train_b_dir)?;

        let statistics = NormalizationArchive::new(fit_domain(&features_a)?, fit_domain(&features_b)?);
        info!(
            log_f0_mean_a = statistics.a.log_f0.mean,
            log_f0_std_a = statistics.a.log_f0.std,
            log_f0_mean_b = statistics.b.log_f0.mean,
            log_f0_std_b = statistics.b.log_f0.std,
            "Fitted normalization statistics"
        );
        statistics.save(model_dir)?;

        let a = normalize_domain(Domain::A, &features_a, &statistics.a.coded_sp)?;
        let b = normalize_domain(Domain::B, &features_b, &statistics.b.coded_sp)?;

        info!(elapsed = %format_hms(start.elapsed()), "Preprocessing done");
        Ok(PreparedCorpora { a, b, statistics })
    }
}

fn normalize_domain(
    domain: Domain,
    features: &[UtteranceFeatures],
    stats: &CodedSpStatistics,
) -> Result<DomainCorpus> {
    let normalized = features
        .iter()
        .map(|f| stats.transform(&f.coded_sp_transposed()))
        .collect::<Result<Vec<_>>>()?;

    Ok(DomainCorpus {
        domain,
        files: features.iter().map(|f| f.path.clone()).collect(),
        normalized,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::save_wav;
    use crate::normalization::{LOGF0_ARCHIVE, MCEP_ARCHIVE};
    use crate::vocoder::WorldVocoder;

    fn write_glides(dir: &Path, base: f64, count: usize) {
        for i in 0..count {
            let n = 6000 + 1200 * i;
            let samples: Vec<f64> = (0..n)
                .scan(0.0f64, |phase, t| {
                    let freq = base * (1.0 + 0.3 * t as f64 / n as f64);
                    *phase += 2.0 * std::f64::consts::PI * freq / 24000.0;
                    let envelope = 0.2 + 0.2 * (t as f64 / n as f64);
                    Some(envelope * (phase.sin() + 0.3 * (2.0 * *phase).sin()))
                })
                .collect();
            save_wav(&samples, 24000, dir.join(format!("{:02}.wav", i))).unwrap();
        }
    }

    #[test]
    fn test_prepare_persists_statistics_and_normalizes() {
        let train_a = tempfile::tempdir().unwrap();
        let train_b = tempfile::tempdir().unwrap();
        let model_dir = tempfile::tempdir().unwrap();
        write_glides(train_a.path(), 140.0, 3);
        write_glides(train_b.path(), 230.0, 2);

        let vocoder = WorldVocoder::default();
        let pipeline = PreprocessingPipeline::new(&vocoder, FeatureConfig::default());
        let corpora = pipeline.prepare(train_a.path(), train_b.path(), model_dir.path()).unwrap();

        assert_eq!(corpora.a.len(), 3);
        assert_eq!(corpora.b.len(), 2);
        assert_eq!(corpora.a.domain, Domain::A);
        assert!(corpora.a.normalized.iter().all(|n| n.nrows() == 24));
        assert!(model_dir.path().join(LOGF0_ARCHIVE).is_file());
        assert!(model_dir.path().join(MCEP_ARCHIVE).is_file());

        // Domain B is higher pitched
        assert!(corpora.statistics.b.log_f0.mean > corpora.statistics.a.log_f0.mean);

        let loaded = NormalizationArchive::load(model_dir.path()).unwrap();
        assert_eq!(loaded, corpora.statistics);
    }

    #[test]
    fn test_prepare_fails_on_empty_domain() {
        let train_a = tempfile::tempdir().unwrap();
        let train_b = tempfile::tempdir().unwrap();
        let model_dir = tempfile::tempdir().unwrap();
        write_glides(train_a.path(), 140.0, 1);

        let vocoder = WorldVocoder::default();
        let pipeline = PreprocessingPipeline::new(&vocoder, FeatureConfig::default());
        assert!(pipeline.prepare(train_a.path(), train_b.path(), model_dir.path()).is_err());
        assert!(!model_dir.path().join(LOGF0_ARCHIVE).exists());
    }
}
