//! Audio loading, resampling, padding and WAV output

mod corpus;

pub use corpus::{list_wav_files, load_utterances, Utterance};

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{Error, Result};

/// Load a WAV file. Returns mono samples in [-1, 1] and the file's sample rate.
///
/// Integer PCM of any bit depth and 32-bit float files are supported.
/// Multi-channel files are mixed down to mono.
pub fn load_wav(path: impl AsRef<Path>) -> Result<(Vec<f32>, u32)> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut reader = hound::WavReader::new(reader)
        .map_err(|e| Error::audio(format!("failed to read WAV '{}': {}", path.display(), e)))?;

    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(Error::audio(format!("'{}' has sample rate 0", path.display())));
    }

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<_, _>>()
        }
        hound::SampleFormat::Float => reader.samples::<f32>().collect(),
    }
    .map_err(|e| Error::audio(format!("corrupt WAV '{}': {}", path.display(), e)))?;

    let channels = spec.channels.max(1) as usize;
    let samples = if channels > 1 {
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        samples
    };

    Ok((samples, spec.sample_rate))
}

/// Load a WAV file as mono `f64` samples at `sample_rate`, resampling if needed.
pub fn load_wav_at(path: impl AsRef<Path>, sample_rate: u32) -> Result<Vec<f64>> {
    let (samples, file_rate) = load_wav(path)?;
    let samples = resample(&samples, file_rate, sample_rate)?;
    Ok(samples.into_iter().map(f64::from).collect())
}

/// Resample audio to the target sample rate.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    use rubato::{FftFixedInOut, Resampler};

    let mut resampler = FftFixedInOut::<f32>::new(from_rate as usize, to_rate as usize, 1024, 1)
        .map_err(|e| Error::audio(format!("resampler init failed: {}", e)))?;

    let mut output = Vec::new();
    let chunk_size = resampler.input_frames_max();

    for chunk in samples.chunks(chunk_size) {
        let mut padded = chunk.to_vec();
        if padded.len() < chunk_size {
            padded.resize(chunk_size, 0.0);
        }
        let result = resampler
            .process(&[padded], None)
            .map_err(|e| Error::audio(format!("resampling failed: {}", e)))?;
        output.extend_from_slice(&result[0]);
    }

    let expected_len = (samples.len() as f64 * to_rate as f64 / from_rate as f64).round() as usize;
    output.resize(expected_len, 0.0);

    Ok(output)
}

/// Number of samples per analysis frame.
pub fn samples_per_frame(sample_rate: u32, frame_period: f64) -> f64 {
    sample_rate as f64 * frame_period / 1000.0
}

/// Number of analysis frames a waveform of `len` samples decomposes into.
pub fn frame_count(len: usize, sample_rate: u32, frame_period: f64) -> usize {
    (len as f64 / samples_per_frame(sample_rate, frame_period)).floor() as usize + 1
}

/// Zero-pad a waveform so its analysis frame count is a multiple of `multiple`.
///
/// Padding is split evenly, with the extra sample (if any) on the right.
pub fn wav_padding(wav: &[f64], sample_rate: u32, frame_period: f64, multiple: usize) -> Vec<f64> {
    let spf = samples_per_frame(sample_rate, frame_period);
    let frames = frame_count(wav.len(), sample_rate, frame_period) as f64;
    let multiple_f = multiple.max(1) as f64;

    let padded_frames = (frames / multiple_f + 1.0).ceil() * multiple_f - 1.0;
    let padded_len = ((padded_frames * spf).ceil() as usize).max(wav.len());

    let diff = padded_len - wav.len();
    let pad_left = diff / 2;
    let pad_right = diff - pad_left;

    let mut padded = Vec::with_capacity(padded_len);
    padded.resize(pad_left, 0.0);
    padded.extend_from_slice(wav);
    padded.resize(pad_left + wav.len() + pad_right, 0.0);
    padded
}

/// Save audio samples to a 16-bit PCM mono WAV file.
///
/// Samples are clamped to [-1, 1].
pub fn save_wav(samples: &[f64], sample_rate: u32, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let wav_err = |e: hound::Error| Error::audio(format!("failed to write '{}': {}", path.display(), e));

    let mut writer = hound::WavWriter::create(path, spec).map_err(wav_err)?;
    for &sample in samples {
        let pcm = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        writer.write_sample(pcm).map_err(wav_err)?;
    }
    writer.finalize().map_err(wav_err)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padding_frame_count_is_multiple() {
        let sample_rate = 24000;
        let frame_period = 5.0;
        for len in [1usize, 119, 120, 121, 1000, 24000, 36017, 47999] {
            let wav = vec![0.1; len];
            let padded = wav_padding(&wav, sample_rate, frame_period, 4);
            let frames = frame_count(padded.len(), sample_rate, frame_period);
            assert_eq!(frames % 4, 0, "len {} padded to {} gives {} frames", len, padded.len(), frames);
            assert!(padded.len() >= len);
        }
    }

    #[test]
    fn test_padding_keeps_signal_centered() {
        let wav = vec![1.0; 1000];
        let padded = wav_padding(&wav, 24000, 5.0, 4);
        let diff = padded.len() - wav.len();
        let left = diff / 2;
        assert!(padded[..left].iter().all(|&s| s == 0.0));
        assert!(padded[left..left + wav.len()].iter().all(|&s| s == 1.0));
        assert!(padded[left + wav.len()..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_padding_non_integer_frame_hop() {
        // 22050 Hz at 5 ms gives 110.25 samples per frame
        let wav = vec![0.0; 5000];
        let padded = wav_padding(&wav, 22050, 5.0, 4);
        assert_eq!(frame_count(padded.len(), 22050, 5.0) % 4, 0);
    }

    #[test]
    fn test_save_and_load_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<f64> = (0..2400)
            .map(|i| 0.5 * (2.0 * std::f64::consts::PI * 220.0 * i as f64 / 24000.0).sin())
            .collect();

        save_wav(&samples, 24000, &path).unwrap();
        let (loaded, rate) = load_wav(&path).unwrap();

        assert_eq!(rate, 24000);
        assert_eq!(loaded.len(), samples.len());
        for (a, b) in loaded.iter().zip(samples.iter()) {
            assert!((*a as f64 - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_save_wav_clamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loud.wav");
        save_wav(&[2.0, -3.0, 0.0], 16000, &path).unwrap();
        let (loaded, _) = load_wav(&path).unwrap();
        assert!(loaded.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn test_resample_length() {
        let samples = vec![0.0f32; 16000];
        let out = resample(&samples, 16000, 24000).unwrap();
        assert_eq!(out.len(), 24000);

        let same = resample(&samples, 16000, 16000).unwrap();
        assert_eq!(same.len(), samples.len());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(load_wav("/nonexistent/file.wav"), Err(Error::Io(_))));
    }
}
