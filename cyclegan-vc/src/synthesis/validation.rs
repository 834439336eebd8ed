//! Validation-time voice conversion

use std::path::{Path, PathBuf};

use ndarray::{Array1, Axis};
use tracing::{debug, info, warn};

use crate::audio::{list_wav_files, load_wav_at, save_wav, wav_padding};
use crate::error::{Error, Result};
use crate::models::{CycleGanModel, Direction};
use crate::normalization::{pitch_conversion, NormalizationArchive};
use crate::preprocessing::FeatureConfig;
use crate::vocoder::Vocoder;

/// Outcome of one validation pass over a directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub direction: Direction,
    pub output_dir: PathBuf,
    /// Files converted and written
    pub converted: usize,
    /// Files skipped after an error
    pub failed: usize,
}

/// `{output_dir}/converted_{source}{n_frames}/epoch_{epoch}`
pub fn validation_output_dir(output_dir: &Path, direction: Direction, n_frames: usize, epoch: usize) -> PathBuf {
    output_dir
        .join(format!("converted_{}{}", direction.source(), n_frames))
        .join(format!("epoch_{}", epoch))
}

/// Converts whole utterances with a trained model and the run's statistics.
pub struct ValidationSynthesizer<'a, V: Vocoder> {
    vocoder: &'a V,
    statistics: &'a NormalizationArchive,
    config: FeatureConfig,
    padding_multiple: usize,
}

impl<'a, V: Vocoder> ValidationSynthesizer<'a, V> {
    pub fn new(
        vocoder: &'a V,
        statistics: &'a NormalizationArchive,
        config: FeatureConfig,
        padding_multiple: usize,
    ) -> Self {
        Self {
            vocoder,
            statistics,
            config,
            padding_multiple,
        }
    }

    /// Convert a waveform from the direction's source domain to its target.
    ///
    /// The result has the padded input's length; non-finite samples are zeroed.
    pub fn convert<M: CycleGanModel>(&self, model: &M, wav: &[f64], direction: Direction) -> Result<Vec<f64>> {
        let FeatureConfig {
            sample_rate,
            frame_period,
            coded_dim,
        } = self.config;
        let source = self.statistics.domain(direction.source());
        let target = self.statistics.domain(direction.target());

        let wav = wav_padding(wav, sample_rate, frame_period, self.padding_multiple);
        let decomposition = self.vocoder.decompose(&wav, sample_rate, frame_period)?;

        let f0_converted: Array1<f64> = pitch_conversion(&decomposition.f0, &source.log_f0, &target.log_f0);

        let coded_sp = self
            .vocoder
            .encode_envelope(&decomposition.spectral_envelope, sample_rate, coded_dim)?;
        let normalized = source.coded_sp.transform(&coded_sp.t().to_owned())?;

        let converted = model.infer(&normalized.insert_axis(Axis(0)), direction)?;
        let converted = converted.index_axis(Axis(0), 0).to_owned();
        let coded_converted = target.coded_sp.inverse_transform(&converted)?;

        let coded_converted = coded_converted.t().as_standard_layout().into_owned();
        let sp_converted = self.vocoder.decode_envelope(&coded_converted, sample_rate)?;

        let mut wav_converted = self.vocoder.synthesize(
            &f0_converted,
            &sp_converted,
            &decomposition.aperiodicity,
            sample_rate,
            frame_period,
        )?;

        let mut zeroed = 0usize;
        for sample in wav_converted.iter_mut() {
            if !sample.is_finite() {
                *sample = 0.0;
                zeroed += 1;
            }
        }
        if zeroed > 0 {
            debug!(zeroed, "Replaced non-finite samples");
        }

        Ok(wav_converted)
    }

    /// Convert one file and write it to `output_dir` under the same file name.
    pub fn convert_file<M: CycleGanModel>(
        &self,
        model: &M,
        path: &Path,
        direction: Direction,
        output_dir: &Path,
    ) -> Result<PathBuf> {
        let wav = load_wav_at(path, self.config.sample_rate)?;
        let converted = self.convert(model, &wav, direction)?;

        let file_name = path
            .file_name()
            .ok_or_else(|| Error::audio(format!("'{}' has no file name", path.display())))?;
        let output_path = output_dir.join(file_name);
        save_wav(&converted, self.config.sample_rate, &output_path)?;
        Ok(output_path)
    }

    /// Convert every WAV file of `source_dir` into `output_dir`.
    ///
    /// A file that fails is logged and skipped. An unreadable source
    /// directory or an output directory that cannot be created fails the pass.
    pub fn convert_directory<M: CycleGanModel>(
        &self,
        model: &M,
        direction: Direction,
        source_dir: &Path,
        output_dir: &Path,
    ) -> Result<ValidationReport> {
        let files = list_wav_files(source_dir)?;
        std::fs::create_dir_all(output_dir)?;

        let mut report = ValidationReport {
            direction,
            output_dir: output_dir.to_path_buf(),
            converted: 0,
            failed: 0,
        };

        for path in files {
            match self.convert_file(model, &path, direction, output_dir) {
                Ok(output_path) => {
                    debug!(file = %output_path.display(), "Converted");
                    report.converted += 1;
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Failed to convert file");
                    report.failed += 1;
                }
            }
        }

        info!(
            direction = %direction,
            converted = report.converted,
            failed = report.failed,
            output = %output_dir.display(),
            "Validation pass done"
        );
        Ok(report)
    }
}
