//! Corpus loading: one directory of WAV files per domain

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::load_wav_at;
use crate::error::{Error, Result};

/// A single loaded recording.
#[derive(Debug, Clone)]
pub struct Utterance {
    /// Source file, kept so failures can name it
    pub path: PathBuf,
    /// Mono samples at the corpus sample rate
    pub samples: Vec<f64>,
}

impl Utterance {
    pub fn new(path: impl Into<PathBuf>, samples: Vec<f64>) -> Self {
        Self {
            path: path.into(),
            samples,
        }
    }
}

/// List WAV files in a directory, sorted by file name.
pub fn list_wav_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let is_wav = path
            .extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("wav"))
            .unwrap_or(false);
        if is_wav {
            files.push(path);
        } else {
            debug!(path = %path.display(), "Skipping non-WAV file");
        }
    }

    files.sort();
    Ok(files)
}

/// Load every WAV file in `dir` at `sample_rate`.
///
/// Any unreadable file aborts the load. An empty directory is an error.
pub fn load_utterances(dir: impl AsRef<Path>, sample_rate: u32) -> Result<Vec<Utterance>> {
    let dir = dir.as_ref();
    let files = list_wav_files(dir)?;
    if files.is_empty() {
        return Err(Error::dataset(format!("no WAV files in {}", dir.display())));
    }

    let utterances = files
        .into_iter()
        .map(|path| {
            let samples = load_wav_at(&path, sample_rate)?;
            Ok(Utterance::new(path, samples))
        })
        .collect::<Result<Vec<_>>>()?;

    let total_secs: f64 = utterances
        .iter()
        .map(|u| u.samples.len() as f64 / sample_rate as f64)
        .sum();
    info!(
        dir = %dir.display(),
        files = utterances.len(),
        duration_secs = format!("{:.1}", total_secs),
        "Loaded corpus"
    );

    Ok(utterances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::save_wav;

    #[test]
    fn test_load_sorted_and_skips_other_files() {
        let dir = tempfile::tempdir().unwrap();
        save_wav(&vec![0.1; 480], 24000, dir.path().join("b.wav")).unwrap();
        save_wav(&vec![0.1; 240], 24000, dir.path().join("a.WAV")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();

        let utterances = load_utterances(dir.path(), 24000).unwrap();
        assert_eq!(utterances.len(), 2);
        assert_eq!(utterances[0].path, dir.path().join("a.WAV"));
        assert_eq!(utterances[0].samples.len(), 240);
        assert_eq!(utterances[1].path, dir.path().join("b.wav"));
    }

    #[test]
    fn test_empty_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load_utterances(dir.path(), 24000), Err(Error::Dataset(_))));
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.wav"), b"not a wav").unwrap();
        assert!(matches!(load_utterances(dir.path(), 24000), Err(Error::Audio(_))));
    }
}
