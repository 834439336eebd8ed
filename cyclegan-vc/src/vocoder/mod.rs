//! Vocoder boundary: analysis, envelope coding and resynthesis
//!
//! The training pipeline only talks to a vocoder through the [`Vocoder`] trait.
//! [`WorldVocoder`] is the bundled implementation, a simplified WORLD-style
//! analyzer/synthesizer built on `rustfft`.

mod world;

pub use world::{WorldConfig, WorldVocoder};

use ndarray::{Array1, Array2};

use crate::error::Result;

/// Vocoder parameters of a single waveform.
#[derive(Debug, Clone)]
pub struct Decomposition {
    /// Fundamental frequency per frame in Hz, 0 for unvoiced frames
    pub f0: Array1<f64>,
    /// Frame timestamps in seconds
    pub time_axis: Array1<f64>,
    /// Power spectral envelope [frames, fft_size / 2 + 1]
    pub spectral_envelope: Array2<f64>,
    /// Aperiodicity ratio in [0, 1], same shape as the envelope
    pub aperiodicity: Array2<f64>,
}

impl Decomposition {
    /// Number of analysis frames
    pub fn num_frames(&self) -> usize {
        self.f0.len()
    }
}

/// Source-filter vocoder capability.
pub trait Vocoder {
    /// Decompose a waveform into pitch, time axis, spectral envelope and aperiodicity.
    fn decompose(&self, wav: &[f64], sample_rate: u32, frame_period: f64) -> Result<Decomposition>;

    /// Compress a spectral envelope [frames, bins] into [frames, dim] coefficients.
    fn encode_envelope(&self, sp: &Array2<f64>, sample_rate: u32, dim: usize) -> Result<Array2<f64>>;

    /// Expand coded coefficients [frames, dim] back into a spectral envelope.
    fn decode_envelope(&self, coded: &Array2<f64>, sample_rate: u32) -> Result<Array2<f64>>;

    /// Resynthesize a waveform of `round((frames - 1) * samples_per_frame)` samples.
    fn synthesize(
        &self,
        f0: &Array1<f64>,
        sp: &Array2<f64>,
        ap: &Array2<f64>,
        sample_rate: u32,
        frame_period: f64,
    ) -> Result<Vec<f64>>;
}
