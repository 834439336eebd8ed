//! Simplified WORLD-style vocoder
//!
//! - **F0**: normalized autocorrelation with window correction, per frame
//! - **Spectral envelope**: cepstrally liftered power spectrum
//! - **Aperiodicity**: band ratio driven by the frame's periodicity strength
//! - **Coding**: mel-warped log envelope followed by an orthonormal DCT
//! - **Synthesis**: pitch-synchronous overlap-add of zero-phase pulses plus shaped noise
//!
//! References: Morise, M. (2016). "WORLD: a vocoder-based high-quality speech
//! synthesis system for real-time applications"

use std::f64::consts::PI;
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustfft::{num_complex::Complex64, Fft, FftPlanner};

use super::{Decomposition, Vocoder};
use crate::audio::{frame_count, samples_per_frame};
use crate::error::{Error, Result};

/// Lowest frequency covered by the coded envelope (Hz)
const FLOOR_FREQUENCY: f64 = 40.0;
/// Pulse rate used to drive noise excitation in unvoiced regions (Hz)
const UNVOICED_PULSE_RATE: f64 = 500.0;
/// Seed for the synthesis noise source; synthesis is deterministic
const NOISE_SEED: u64 = 0x5752_4c44;
/// Power floor applied before taking logarithms
const SPECTRUM_FLOOR: f64 = 1e-16;

/// Analysis parameters for [`WorldVocoder`]
#[derive(Debug, Clone)]
pub struct WorldConfig {
    /// Lowest detectable F0 in Hz (default: 71.0); also sets the FFT size
    pub f0_floor: f64,
    /// Highest detectable F0 in Hz (default: 800.0)
    pub f0_ceil: f64,
    /// Minimum normalized autocorrelation for a voiced frame (default: 0.5)
    pub voicing_threshold: f64,
    /// Frames with RMS below this are unvoiced (default: 1e-4)
    pub silence_rms: f64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            f0_floor: 71.0,
            f0_ceil: 800.0,
            voicing_threshold: 0.5,
            silence_rms: 1e-4,
        }
    }
}

/// WORLD-style vocoder
#[derive(Debug, Clone, Default)]
pub struct WorldVocoder {
    config: WorldConfig,
}

impl WorldVocoder {
    pub fn new(config: WorldConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// FFT size used for envelope analysis at `sample_rate`
    /// (1024 at 24 kHz with the default F0 floor).
    pub fn fft_size(&self, sample_rate: u32) -> usize {
        let ratio = 3.0 * sample_rate as f64 / self.config.f0_floor + 1.0;
        1usize << (1 + ratio.log2() as u32)
    }

    /// Estimate (f0, periodicity strength) from a frame's autocorrelation.
    ///
    /// `window_acf` is the autocorrelation of the analysis window alone and
    /// corrects for the taper's bias toward short lags.
    fn estimate_pitch(&self, acf: &[f64], window_acf: &[f64], sample_rate: u32) -> (f64, f64) {
        if acf[0] <= 0.0 {
            return (0.0, 0.0);
        }

        let fs = sample_rate as f64;
        let min_lag = ((fs / self.config.f0_ceil).floor() as usize).max(2);
        let max_lag = ((fs / self.config.f0_floor).ceil() as usize).min(acf.len() - 2);
        if min_lag >= max_lag {
            return (0.0, 0.0);
        }

        let normalized = |lag: usize| -> f64 {
            let correction = (window_acf[lag] / window_acf[0]).max(1e-3);
            acf[lag] / acf[0] / correction
        };

        let values: Vec<f64> = (min_lag - 1..=max_lag + 1).map(normalized).collect();
        let value_at = |lag: usize| values[lag + 1 - min_lag];

        let global_max = (min_lag..=max_lag).map(value_at).fold(f64::MIN, f64::max);
        if global_max <= 0.0 {
            return (0.0, 0.0);
        }

        // Prefer the shortest strong period to avoid octave-down errors
        let threshold = 0.9 * global_max;
        let best_lag = (min_lag..=max_lag)
            .find(|&lag| {
                let v = value_at(lag);
                v >= threshold && v >= value_at(lag - 1) && v >= value_at(lag + 1)
            })
            .unwrap_or(min_lag);

        let (prev, center, next) = (value_at(best_lag - 1), value_at(best_lag), value_at(best_lag + 1));
        let denom = prev - 2.0 * center + next;
        let offset = if denom.abs() > 1e-12 {
            (0.5 * (prev - next) / denom).clamp(-0.5, 0.5)
        } else {
            0.0
        };

        let period = best_lag as f64 + offset;
        (fs / period, center.clamp(0.0, 1.0))
    }
}

/// Periodic Hann window (no zero endpoints)
fn hann_window(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * (i as f64 + 0.5) / len as f64).cos())
        .collect()
}

/// Windowed excerpt of `wav` centered on `center`, zero outside the signal.
fn windowed_frame(wav: &[f64], center: isize, window: &[f64]) -> Vec<f64> {
    let half = (window.len() / 2) as isize;
    window
        .iter()
        .enumerate()
        .map(|(j, &w)| {
            let idx = center - half + j as isize;
            if idx >= 0 && (idx as usize) < wav.len() {
                wav[idx as usize] * w
            } else {
                0.0
            }
        })
        .collect()
}

/// Linear autocorrelation via a zero-padded FFT of twice the frame length.
fn autocorrelation(frame: &[f64], forward: &Arc<dyn Fft<f64>>, inverse: &Arc<dyn Fft<f64>>) -> Vec<f64> {
    let n = frame.len() * 2;
    let mut buffer: Vec<Complex64> = frame
        .iter()
        .map(|&x| Complex64::new(x, 0.0))
        .chain(std::iter::repeat(Complex64::new(0.0, 0.0)))
        .take(n)
        .collect();

    forward.process(&mut buffer);
    for c in buffer.iter_mut() {
        *c = Complex64::new(c.norm_sqr(), 0.0);
    }
    inverse.process(&mut buffer);

    buffer[..frame.len()].iter().map(|c| c.re / n as f64).collect()
}

fn hz_to_mel(freq: f64) -> f64 {
    1127.01048 * (1.0 + freq / 700.0).ln()
}

/// Orthonormal DCT-II basis, `basis[[k, i]]`
fn dct_basis(dim: usize) -> Array2<f64> {
    Array2::from_shape_fn((dim, dim), |(k, i)| {
        let scale = if k == 0 {
            (1.0 / dim as f64).sqrt()
        } else {
            (2.0 / dim as f64).sqrt()
        };
        scale * (PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * dim as f64)).cos()
    })
}

/// Mel-uniform coding grid between [`FLOOR_FREQUENCY`] and Nyquist.
struct MelGrid {
    floor_mel: f64,
    ceil_mel: f64,
    dim: usize,
}

impl MelGrid {
    fn new(sample_rate: u32, dim: usize) -> Self {
        Self {
            floor_mel: hz_to_mel(FLOOR_FREQUENCY),
            ceil_mel: hz_to_mel(sample_rate as f64 / 2.0),
            dim,
        }
    }

    /// Frequency (Hz) of grid point `i`
    fn frequency(&self, i: usize) -> f64 {
        let mel = self.floor_mel + (self.ceil_mel - self.floor_mel) * i as f64 / (self.dim - 1) as f64;
        700.0 * ((mel / 1127.01048).exp() - 1.0)
    }

    /// Fractional grid position of a frequency, clamped to the grid
    fn position(&self, freq: f64) -> f64 {
        let mel = hz_to_mel(freq.max(FLOOR_FREQUENCY));
        ((mel - self.floor_mel) / (self.ceil_mel - self.floor_mel) * (self.dim - 1) as f64)
            .clamp(0.0, (self.dim - 1) as f64)
    }
}

/// Linear interpolation of `values` at fractional index `pos`
fn interpolate(values: ArrayView1<f64>, pos: f64) -> f64 {
    let last = values.len() - 1;
    let pos = pos.clamp(0.0, last as f64);
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(last);
    let frac = pos - lo as f64;
    values[lo] * (1.0 - frac) + values[hi] * frac
}

impl Vocoder for WorldVocoder {
    fn decompose(&self, wav: &[f64], sample_rate: u32, frame_period: f64) -> Result<Decomposition> {
        if wav.is_empty() {
            return Err(Error::vocoder("cannot analyze an empty waveform"));
        }
        if wav.iter().any(|s| !s.is_finite()) {
            return Err(Error::vocoder("waveform contains non-finite samples"));
        }
        if sample_rate == 0 || frame_period <= 0.0 {
            return Err(Error::vocoder(format!(
                "invalid analysis parameters: sample_rate={}, frame_period={}",
                sample_rate, frame_period
            )));
        }

        let fs = sample_rate as f64;
        let spf = samples_per_frame(sample_rate, frame_period);
        let num_frames = frame_count(wav.len(), sample_rate, frame_period);
        let fft_size = self.fft_size(sample_rate);
        let bins = fft_size / 2 + 1;

        let mut planner = FftPlanner::<f64>::new();
        let acf_forward = planner.plan_fft_forward(fft_size * 2);
        let acf_inverse = planner.plan_fft_inverse(fft_size * 2);
        let forward = planner.plan_fft_forward(fft_size);
        let inverse = planner.plan_fft_inverse(fft_size);

        let window = hann_window(fft_size);
        let window_power: f64 = window.iter().map(|w| w * w).sum();
        let window_acf = autocorrelation(&window, &acf_forward, &acf_inverse);

        let mut f0 = Array1::<f64>::zeros(num_frames);
        let mut sp = Array2::<f64>::zeros((num_frames, bins));
        let mut ap = Array2::<f64>::ones((num_frames, bins));
        let time_axis = Array1::from_shape_fn(num_frames, |i| i as f64 * frame_period / 1000.0);

        let mut buffer = vec![Complex64::new(0.0, 0.0); fft_size];

        for i in 0..num_frames {
            let center = (i as f64 * spf).round() as isize;
            let frame = windowed_frame(wav, center, &window);

            // Pitch
            let acf = autocorrelation(&frame, &acf_forward, &acf_inverse);
            let rms = (acf[0] / window_power).max(0.0).sqrt();
            let (frame_f0, strength) = self.estimate_pitch(&acf, &window_acf, sample_rate);
            let voiced = rms >= self.config.silence_rms
                && strength >= self.config.voicing_threshold
                && frame_f0 > 0.0;
            if voiced {
                f0[i] = frame_f0;
            }

            // Envelope: lifter the real cepstrum below the pitch period
            for (b, &x) in buffer.iter_mut().zip(frame.iter()) {
                *b = Complex64::new(x, 0.0);
            }
            forward.process(&mut buffer);
            for c in buffer.iter_mut() {
                let power = c.norm_sqr() / window_power;
                *c = Complex64::new(power.max(SPECTRUM_FLOOR).ln(), 0.0);
            }
            inverse.process(&mut buffer);

            let pitch_for_lifter = if voiced { frame_f0 } else { UNVOICED_PULSE_RATE };
            let cutoff = ((0.8 * fs / pitch_for_lifter) as usize).clamp(4, fft_size / 2 - 1);
            for (q, c) in buffer.iter_mut().enumerate() {
                if q >= cutoff && q <= fft_size - cutoff {
                    *c = Complex64::new(0.0, 0.0);
                } else {
                    *c /= fft_size as f64;
                }
            }
            forward.process(&mut buffer);
            for k in 0..bins {
                sp[[i, k]] = buffer[k].re.exp();
            }

            // Aperiodicity rises toward Nyquist; fully aperiodic when unvoiced
            if voiced {
                let base = (1.0 - strength).clamp(0.001, 1.0);
                for k in 0..bins {
                    let rel = k as f64 / (bins - 1) as f64;
                    ap[[i, k]] = (base + (1.0 - base) * rel * rel).min(1.0);
                }
            }
        }

        Ok(Decomposition {
            f0,
            time_axis,
            spectral_envelope: sp,
            aperiodicity: ap,
        })
    }

    fn encode_envelope(&self, sp: &Array2<f64>, sample_rate: u32, dim: usize) -> Result<Array2<f64>> {
        if dim < 2 {
            return Err(Error::vocoder(format!("coded dimension must be at least 2, got {}", dim)));
        }
        let bins = sp.ncols();
        if bins < 2 {
            return Err(Error::vocoder("spectral envelope needs at least 2 frequency bins"));
        }

        let fft_size = 2 * (bins - 1);
        let grid = MelGrid::new(sample_rate, dim);
        let basis = dct_basis(dim);
        let bin_positions: Vec<f64> = (0..dim)
            .map(|i| grid.frequency(i) * fft_size as f64 / sample_rate as f64)
            .collect();

        let mut coded = Array2::<f64>::zeros((sp.nrows(), dim));
        for (frame, mut out) in sp.rows().into_iter().zip(coded.rows_mut()) {
            let log_sp = frame.mapv(|p| p.max(SPECTRUM_FLOOR).ln());
            let warped = Array1::from_iter(bin_positions.iter().map(|&pos| interpolate(log_sp.view(), pos)));
            out.assign(&basis.dot(&warped));
        }

        Ok(coded)
    }

    fn decode_envelope(&self, coded: &Array2<f64>, sample_rate: u32) -> Result<Array2<f64>> {
        let dim = coded.ncols();
        if dim < 2 {
            return Err(Error::vocoder(format!("coded dimension must be at least 2, got {}", dim)));
        }

        let fft_size = self.fft_size(sample_rate);
        let bins = fft_size / 2 + 1;
        let grid = MelGrid::new(sample_rate, dim);
        let basis_t = dct_basis(dim).reversed_axes();
        let grid_positions: Vec<f64> = (0..bins)
            .map(|k| grid.position(k as f64 * sample_rate as f64 / fft_size as f64))
            .collect();

        let mut sp = Array2::<f64>::zeros((coded.nrows(), bins));
        for (frame, mut out) in coded.rows().into_iter().zip(sp.rows_mut()) {
            let warped = basis_t.dot(&frame);
            for (value, &pos) in out.iter_mut().zip(grid_positions.iter()) {
                *value = interpolate(warped.view(), pos).exp();
            }
        }

        Ok(sp)
    }

    fn synthesize(
        &self,
        f0: &Array1<f64>,
        sp: &Array2<f64>,
        ap: &Array2<f64>,
        sample_rate: u32,
        frame_period: f64,
    ) -> Result<Vec<f64>> {
        let frames = f0.len();
        if frames == 0 || sp.nrows() != frames || ap.dim() != sp.dim() {
            return Err(Error::vocoder(format!(
                "shape mismatch: f0 {} frames, envelope {:?}, aperiodicity {:?}",
                frames,
                sp.dim(),
                ap.dim()
            )));
        }
        if sp.ncols() < 2 {
            return Err(Error::vocoder("spectral envelope needs at least 2 frequency bins"));
        }

        let fs = sample_rate as f64;
        let spf = samples_per_frame(sample_rate, frame_period);
        let out_len = ((frames - 1) as f64 * spf).round() as usize;
        let mut output = vec![0.0; out_len];

        let fft_size = 2 * (sp.ncols() - 1);
        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(fft_size);
        let inverse = planner.plan_fft_inverse(fft_size);
        let mut rng = StdRng::seed_from_u64(NOISE_SEED);

        let mut noise = vec![Complex64::new(0.0, 0.0); fft_size];
        let mut response = vec![Complex64::new(0.0, 0.0); fft_size];
        let half = (fft_size / 2) as isize;
        let noise_scale = 3.0f64.sqrt();

        let mut phase = 1.0f64;
        for s in 0..out_len {
            let frame = ((s as f64 / spf).round() as usize).min(frames - 1);
            let voiced = f0[frame] > 0.0;
            let rate = if voiced { f0[frame] } else { UNVOICED_PULSE_RATE };

            if phase >= 1.0 {
                phase -= phase.floor();
                let period = fs / rate;

                // Unit-variance noise spanning one period
                let noise_len = (period.round() as usize).clamp(1, fft_size);
                for (j, c) in noise.iter_mut().enumerate() {
                    let value = if j < noise_len {
                        rng.gen_range(-1.0..1.0) * noise_scale
                    } else {
                        0.0
                    };
                    *c = Complex64::new(value, 0.0);
                }
                forward.process(&mut noise);

                for (k, c) in response.iter_mut().enumerate() {
                    let bin = if k <= fft_size / 2 { k } else { fft_size - k };
                    let amplitude = sp[[frame, bin]].max(0.0).sqrt();
                    let aperiodic = ap[[frame, bin]].clamp(0.0, 1.0);
                    let periodic = if voiced {
                        (period * (1.0 - aperiodic * aperiodic)).sqrt()
                    } else {
                        0.0
                    };
                    *c = (Complex64::new(periodic, 0.0) + noise[k] * aperiodic) * amplitude;
                }
                inverse.process(&mut response);

                for j in 0..fft_size {
                    let offset = j as isize - half;
                    let idx = s as isize + offset;
                    if idx < 0 || idx as usize >= out_len {
                        continue;
                    }
                    let wrapped = (offset + fft_size as isize) as usize % fft_size;
                    output[idx as usize] += response[wrapped].re / fft_size as f64;
                }
            }

            phase += rate / fs;
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::wav_padding;

    const SR: u32 = 24000;

    fn harmonic_tone(f0: f64, secs: f64) -> Vec<f64> {
        let n = (SR as f64 * secs) as usize;
        (0..n)
            .map(|i| {
                let t = i as f64 / SR as f64;
                (1..=5)
                    .map(|k| 0.3 / k as f64 * (2.0 * PI * f0 * k as f64 * t).sin())
                    .sum()
            })
            .collect()
    }

    #[test]
    fn test_fft_size() {
        let vocoder = WorldVocoder::default();
        assert_eq!(vocoder.fft_size(24000), 1024);
        assert_eq!(vocoder.fft_size(16000), 1024);
        assert_eq!(vocoder.fft_size(48000), 2048);
    }

    #[test]
    fn test_decompose_shapes() {
        let vocoder = WorldVocoder::default();
        let wav = harmonic_tone(200.0, 0.25);
        let dec = vocoder.decompose(&wav, SR, 5.0).unwrap();

        let frames = wav.len() / 120 + 1;
        assert_eq!(dec.num_frames(), frames);
        assert_eq!(dec.time_axis.len(), frames);
        assert_eq!(dec.spectral_envelope.dim(), (frames, 513));
        assert_eq!(dec.aperiodicity.dim(), (frames, 513));
        assert!((dec.time_axis[2] - 0.010).abs() < 1e-12);
        assert!(dec.spectral_envelope.iter().all(|v| v.is_finite() && *v > 0.0));
    }

    #[test]
    fn test_pitch_of_harmonic_tone() {
        let vocoder = WorldVocoder::default();
        let wav = harmonic_tone(200.0, 0.3);
        let dec = vocoder.decompose(&wav, SR, 5.0).unwrap();

        // Interior frames, away from the zero-padded edges
        let interior = dec.f0.slice(ndarray::s![10..dec.num_frames() - 10]);
        let voiced: Vec<f64> = interior.iter().copied().filter(|&f| f > 0.0).collect();
        assert!(voiced.len() * 10 >= interior.len() * 9, "most interior frames should be voiced");
        for f in voiced {
            assert!((f - 200.0).abs() < 10.0, "estimated {} Hz", f);
        }
    }

    #[test]
    fn test_silence_is_unvoiced() {
        let vocoder = WorldVocoder::default();
        let dec = vocoder.decompose(&vec![0.0; 4800], SR, 5.0).unwrap();
        assert!(dec.f0.iter().all(|&f| f == 0.0));
        assert!(dec.aperiodicity.iter().all(|&a| a == 1.0));
    }

    #[test]
    fn test_decompose_rejects_bad_input() {
        let vocoder = WorldVocoder::default();
        assert!(vocoder.decompose(&[], SR, 5.0).is_err());
        assert!(vocoder.decompose(&[0.0, f64::NAN, 0.0], SR, 5.0).is_err());
    }

    #[test]
    fn test_flat_envelope_codes_to_constant() {
        let vocoder = WorldVocoder::default();
        let sp = Array2::from_elem((3, 513), 0.01);
        let coded = vocoder.encode_envelope(&sp, SR, 24).unwrap();
        assert_eq!(coded.dim(), (3, 24));

        let c0 = (24.0f64).sqrt() * 0.01f64.ln();
        for row in coded.rows() {
            assert!((row[0] - c0).abs() < 1e-9);
            assert!(row.iter().skip(1).all(|c| c.abs() < 1e-9));
        }

        let decoded = vocoder.decode_envelope(&coded, SR).unwrap();
        assert_eq!(decoded.dim(), (3, 513));
        assert!(decoded.iter().all(|v| (v - 0.01).abs() < 1e-9));
    }

    #[test]
    fn test_coding_is_deterministic() {
        let vocoder = WorldVocoder::default();
        let wav = harmonic_tone(150.0, 0.2);
        let dec = vocoder.decompose(&wav, SR, 5.0).unwrap();
        let a = vocoder.encode_envelope(&dec.spectral_envelope, SR, 24).unwrap();
        let b = vocoder.encode_envelope(&dec.spectral_envelope, SR, 24).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_round_trip_preserves_length() {
        let vocoder = WorldVocoder::default();
        for secs in [0.1, 0.37, 1.0] {
            let wav = wav_padding(&harmonic_tone(180.0, secs), SR, 5.0, 4);
            let dec = vocoder.decompose(&wav, SR, 5.0).unwrap();
            let out = vocoder
                .synthesize(&dec.f0, &dec.spectral_envelope, &dec.aperiodicity, SR, 5.0)
                .unwrap();
            assert_eq!(out.len(), wav.len());
            assert!(out.iter().all(|s| s.is_finite()));
        }
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let vocoder = WorldVocoder::default();
        let wav = harmonic_tone(220.0, 0.2);
        let dec = vocoder.decompose(&wav, SR, 5.0).unwrap();
        let a = vocoder.synthesize(&dec.f0, &dec.spectral_envelope, &dec.aperiodicity, SR, 5.0).unwrap();
        let b = vocoder.synthesize(&dec.f0, &dec.spectral_envelope, &dec.aperiodicity, SR, 5.0).unwrap();
        assert_eq!(a, b);
        assert!(a.iter().any(|s| s.abs() > 0.0));
    }

    #[test]
    fn test_synthesize_shape_mismatch() {
        let vocoder = WorldVocoder::default();
        let f0 = Array1::zeros(4);
        let sp = Array2::from_elem((3, 513), 1.0);
        let ap = Array2::from_elem((3, 513), 1.0);
        assert!(vocoder.synthesize(&f0, &sp, &ap, SR, 5.0).is_err());
    }
}
