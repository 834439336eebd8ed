//! Per-utterance vocoder features

use std::path::PathBuf;

use ndarray::{Array1, Array2};

use super::FeatureConfig;
use crate::audio::Utterance;
use crate::error::{Error, Result};
use crate::vocoder::Vocoder;

/// Vocoder decomposition plus coded envelope of one utterance.
#[derive(Debug, Clone)]
pub struct UtteranceFeatures {
    pub path: PathBuf,
    pub f0: Array1<f64>,
    pub time_axis: Array1<f64>,
    pub spectral_envelope: Array2<f64>,
    pub aperiodicity: Array2<f64>,
    /// Coded spectral envelope [frames, coded_dim]
    pub coded_sp: Array2<f64>,
}

impl UtteranceFeatures {
    pub fn num_frames(&self) -> usize {
        self.f0.len()
    }

    /// Coded envelope as [coded_dim, frames]
    pub fn coded_sp_transposed(&self) -> Array2<f64> {
        self.coded_sp.t().to_owned()
    }
}

/// Runs vocoder analysis and envelope coding over utterances.
pub struct FeatureExtractor<'a, V: Vocoder> {
    vocoder: &'a V,
    config: FeatureConfig,
}

impl<'a, V: Vocoder> FeatureExtractor<'a, V> {
    pub fn new(vocoder: &'a V, config: FeatureConfig) -> Self {
        Self { vocoder, config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Extract features of a single utterance.
    ///
    /// Empty waveforms and waveforms containing NaN or infinite samples are
    /// rejected with [`Error::InvalidWaveform`].
    pub fn extract(&self, utterance: &Utterance) -> Result<UtteranceFeatures> {
        check_waveform(utterance)?;

        let FeatureConfig {
            sample_rate,
            frame_period,
            coded_dim,
        } = self.config;

        let decomposition = self
            .vocoder
            .decompose(&utterance.samples, sample_rate, frame_period)
            .map_err(|e| Error::invalid_waveform(&utterance.path, e.to_string()))?;
        let coded_sp = self
            .vocoder
            .encode_envelope(&decomposition.spectral_envelope, sample_rate, coded_dim)
            .map_err(|e| Error::invalid_waveform(&utterance.path, e.to_string()))?;

        Ok(UtteranceFeatures {
            path: utterance.path.clone(),
            f0: decomposition.f0,
            time_axis: decomposition.time_axis,
            spectral_envelope: decomposition.spectral_envelope,
            aperiodicity: decomposition.aperiodicity,
            coded_sp,
        })
    }

    /// Extract features of every utterance, stopping at the first failure.
    pub fn extract_all(&self, utterances: &[Utterance]) -> Result<Vec<UtteranceFeatures>> {
        utterances.iter().map(|u| self.extract(u)).collect()
    }
}

fn check_waveform(utterance: &Utterance) -> Result<()> {
    if utterance.samples.is_empty() {
        return Err(Error::invalid_waveform(&utterance.path, "no samples"));
    }
    if let Some(index) = utterance.samples.iter().position(|s| !s.is_finite()) {
        return Err(Error::invalid_waveform(
            &utterance.path,
            format!("non-finite sample at index {}", index),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::frame_count;
    use crate::vocoder::{Decomposition, WorldVocoder};

    fn tone(freq: f64, secs: f64, sample_rate: u32) -> Vec<f64> {
        let n = (secs * sample_rate as f64) as usize;
        (0..n)
            .map(|i| 0.3 * (2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate as f64).sin())
            .collect()
    }

    #[test]
    fn test_extract_shapes() {
        let vocoder = WorldVocoder::default();
        let config = FeatureConfig::default();
        let extractor = FeatureExtractor::new(&vocoder, config);
        let utterance = Utterance::new("tone.wav", tone(180.0, 0.5, config.sample_rate));

        let features = extractor.extract(&utterance).unwrap();
        let frames = frame_count(utterance.samples.len(), config.sample_rate, config.frame_period);
        assert_eq!(features.num_frames(), frames);
        assert_eq!(features.coded_sp.dim(), (frames, config.coded_dim));
        assert_eq!(features.coded_sp_transposed().dim(), (config.coded_dim, frames));
        assert_eq!(features.spectral_envelope.nrows(), frames);
    }

    #[test]
    fn test_extract_is_deterministic() {
        let vocoder = WorldVocoder::default();
        let extractor = FeatureExtractor::new(&vocoder, FeatureConfig::default());
        let utterance = Utterance::new("tone.wav", tone(220.0, 0.3, 24000));

        let first = extractor.extract(&utterance).unwrap();
        let second = extractor.extract(&utterance).unwrap();
        assert_eq!(first.f0, second.f0);
        assert_eq!(first.coded_sp, second.coded_sp);
    }

    #[test]
    fn test_invalid_waveforms_name_the_file() {
        let vocoder = WorldVocoder::default();
        let extractor = FeatureExtractor::new(&vocoder, FeatureConfig::default());

        let empty = Utterance::new("empty.wav", Vec::new());
        match extractor.extract(&empty) {
            Err(Error::InvalidWaveform { path, .. }) => assert_eq!(path, PathBuf::from("empty.wav")),
            other => panic!("unexpected result: {:?}", other.map(|f| f.path)),
        }

        let mut samples = tone(200.0, 0.2, 24000);
        samples[10] = f64::NAN;
        let corrupt = Utterance::new("nan.wav", samples);
        assert!(matches!(extractor.extract(&corrupt), Err(Error::InvalidWaveform { .. })));
    }

    /// Analysis succeeds, envelope coding always fails
    struct BrokenEncoder(WorldVocoder);

    impl Vocoder for BrokenEncoder {
        fn decompose(&self, wav: &[f64], sample_rate: u32, frame_period: f64) -> Result<Decomposition> {
            self.0.decompose(wav, sample_rate, frame_period)
        }

        fn encode_envelope(&self, _sp: &Array2<f64>, _sample_rate: u32, _dim: usize) -> Result<Array2<f64>> {
            Err(Error::vocoder("coding failed"))
        }

        fn decode_envelope(&self, coded: &Array2<f64>, sample_rate: u32) -> Result<Array2<f64>> {
            self.0.decode_envelope(coded, sample_rate)
        }

        fn synthesize(
            &self,
            f0: &Array1<f64>,
            sp: &Array2<f64>,
            ap: &Array2<f64>,
            sample_rate: u32,
            frame_period: f64,
        ) -> Result<Vec<f64>> {
            self.0.synthesize(f0, sp, ap, sample_rate, frame_period)
        }
    }

    #[test]
    fn test_encode_failure_names_the_file() {
        let vocoder = BrokenEncoder(WorldVocoder::default());
        let extractor = FeatureExtractor::new(&vocoder, FeatureConfig::default());
        let utterance = Utterance::new("speaker/utt_07.wav", tone(200.0, 0.2, 24000));

        match extractor.extract(&utterance) {
            Err(Error::InvalidWaveform { path, reason }) => {
                assert_eq!(path, PathBuf::from("speaker/utt_07.wav"));
                assert!(reason.contains("coding failed"));
            }
            other => panic!("unexpected result: {:?}", other.map(|f| f.path)),
        }
    }

    #[test]
    fn test_extract_all_fails_fast() {
        let vocoder = WorldVocoder::default();
        let extractor = FeatureExtractor::new(&vocoder, FeatureConfig::default());
        let utterances = vec![
            Utterance::new("good.wav", tone(200.0, 0.2, 24000)),
            Utterance::new("bad.wav", Vec::new()),
        ];
        assert!(extractor.extract_all(&utterances).is_err());
    }
}
