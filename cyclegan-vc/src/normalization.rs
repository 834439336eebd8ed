//! Per-domain feature statistics
//!
//! Log-F0 mean/std drive pitch conversion at validation time; per-dimension
//! coded-envelope mean/std normalize model inputs and denormalize outputs.
//! Both are fitted once per run and persisted next to the checkpoints.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ndarray::{concatenate, Array1, Array2, ArrayView2, Axis};
use tracing::info;

use crate::error::{Error, Result};
use crate::models::Domain;
use crate::tensor_file::{write_tensors, TensorF64, TensorFile};

/// Pitch statistics archive file name
pub const LOGF0_ARCHIVE: &str = "logf0s_normalization.safetensors";
/// Coded envelope statistics archive file name
pub const MCEP_ARCHIVE: &str = "mcep_normalization.safetensors";

/// Mean and population std of log F0 over voiced frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogF0Statistics {
    pub mean: f64,
    pub std: f64,
}

impl LogF0Statistics {
    /// Fit over every voiced (f0 > 0) frame of a domain.
    pub fn fit<'a>(f0s: impl IntoIterator<Item = &'a Array1<f64>>) -> Result<Self> {
        let pool: Vec<f64> = f0s
            .into_iter()
            .flat_map(|f0| f0.iter().copied())
            .filter(|&f| f > 0.0)
            .map(f64::ln)
            .collect();

        if pool.is_empty() {
            return Err(Error::statistics("no voiced frames to fit pitch statistics"));
        }

        let n = pool.len() as f64;
        let mean = pool.iter().sum::<f64>() / n;
        let var = pool.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        Ok(Self { mean, std: var.sqrt() })
    }
}

/// Map voiced frames from source to target log-F0 statistics.
///
/// Unvoiced frames stay 0. A zero source std maps every voiced frame to the
/// target mean.
pub fn pitch_conversion(f0: &Array1<f64>, source: &LogF0Statistics, target: &LogF0Statistics) -> Array1<f64> {
    f0.mapv(|f| {
        if f <= 0.0 {
            return f;
        }
        let z = if source.std > 0.0 {
            (f.ln() - source.mean) / source.std
        } else {
            0.0
        };
        (z * target.std + target.mean).exp()
    })
}

/// Per-dimension mean and population std of coded envelopes.
#[derive(Debug, Clone, PartialEq)]
pub struct CodedSpStatistics {
    pub mean: Array1<f64>,
    pub std: Array1<f64>,
}

impl CodedSpStatistics {
    /// Fit over transposed coded envelopes, each [coded_dim, frames].
    pub fn fit(coded_sps: &[Array2<f64>]) -> Result<Self> {
        let views: Vec<ArrayView2<f64>> = coded_sps.iter().map(|c| c.view()).collect();
        if views.is_empty() {
            return Err(Error::statistics("no coded envelopes to fit"));
        }

        let all = concatenate(Axis(1), &views)
            .map_err(|e| Error::statistics(format!("coded envelopes disagree on dimension: {}", e)))?;
        if all.ncols() == 0 {
            return Err(Error::statistics("coded envelopes contain no frames"));
        }

        let mean = all
            .mean_axis(Axis(1))
            .ok_or_else(|| Error::statistics("coded envelopes contain no frames"))?;
        let std = all.std_axis(Axis(1), 0.0);

        if let Some(dimension) = std.iter().position(|&s| !(s.is_finite() && s > 0.0)) {
            return Err(Error::DegenerateStatistics { dimension });
        }

        Ok(Self { mean, std })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// (x - mean) / std, broadcast over frames. Input is [coded_dim, frames].
    pub fn transform(&self, coded_t: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_dim(coded_t)?;
        let mean = self.mean.view().insert_axis(Axis(1));
        let std = self.std.view().insert_axis(Axis(1));
        Ok((coded_t - &mean) / &std)
    }

    /// x * std + mean, broadcast over frames. Input is [coded_dim, frames].
    pub fn inverse_transform(&self, normalized: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_dim(normalized)?;
        let mean = self.mean.view().insert_axis(Axis(1));
        let std = self.std.view().insert_axis(Axis(1));
        Ok(normalized * &std + &mean)
    }

    fn check_dim(&self, x: &Array2<f64>) -> Result<()> {
        if x.nrows() != self.dim() {
            return Err(Error::statistics(format!(
                "expected {} coded dimensions, got {}",
                self.dim(),
                x.nrows()
            )));
        }
        Ok(())
    }
}

/// Fitted statistics of one domain.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainStatistics {
    pub log_f0: LogF0Statistics,
    pub coded_sp: CodedSpStatistics,
}

/// Statistics of both domains, persisted as two safetensors archives.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizationArchive {
    pub a: DomainStatistics,
    pub b: DomainStatistics,
}

impl NormalizationArchive {
    pub fn new(a: DomainStatistics, b: DomainStatistics) -> Self {
        Self { a, b }
    }

    pub fn domain(&self, domain: Domain) -> &DomainStatistics {
        match domain {
            Domain::A => &self.a,
            Domain::B => &self.b,
        }
    }

    /// Write both archives into `model_dir`, returning their paths.
    pub fn save(&self, model_dir: impl AsRef<Path>) -> Result<(PathBuf, PathBuf)> {
        let model_dir = model_dir.as_ref();
        std::fs::create_dir_all(model_dir)?;

        let logf0_path = model_dir.join(LOGF0_ARCHIVE);
        let pitch = BTreeMap::from([
            ("mean_A".to_string(), TensorF64::scalar(self.a.log_f0.mean)),
            ("std_A".to_string(), TensorF64::scalar(self.a.log_f0.std)),
            ("mean_B".to_string(), TensorF64::scalar(self.b.log_f0.mean)),
            ("std_B".to_string(), TensorF64::scalar(self.b.log_f0.std)),
        ]);
        write_tensors(&logf0_path, &pitch, None)?;

        let mcep_path = model_dir.join(MCEP_ARCHIVE);
        let coded = BTreeMap::from([
            ("mean_A".to_string(), TensorF64::vector(self.a.coded_sp.mean.to_vec())),
            ("std_A".to_string(), TensorF64::vector(self.a.coded_sp.std.to_vec())),
            ("mean_B".to_string(), TensorF64::vector(self.b.coded_sp.mean.to_vec())),
            ("std_B".to_string(), TensorF64::vector(self.b.coded_sp.std.to_vec())),
        ]);
        write_tensors(&mcep_path, &coded, None)?;

        info!(
            logf0 = %logf0_path.display(),
            mcep = %mcep_path.display(),
            "Saved normalization statistics"
        );
        Ok((logf0_path, mcep_path))
    }

    /// Load both archives from `model_dir`.
    pub fn load(model_dir: impl AsRef<Path>) -> Result<Self> {
        let model_dir = model_dir.as_ref();

        let logf0_path = model_dir.join(LOGF0_ARCHIVE);
        let pitch = ArchiveReader::open(&logf0_path)?;
        let log_f0_a = LogF0Statistics {
            mean: pitch.scalar("mean_A")?,
            std: pitch.scalar("std_A")?,
        };
        let log_f0_b = LogF0Statistics {
            mean: pitch.scalar("mean_B")?,
            std: pitch.scalar("std_B")?,
        };

        let mcep_path = model_dir.join(MCEP_ARCHIVE);
        let coded = ArchiveReader::open(&mcep_path)?;
        let mean_a = coded.vector("mean_A", None)?;
        let dim = mean_a.len();
        let coded_a = CodedSpStatistics {
            mean: mean_a,
            std: coded.vector("std_A", Some(dim))?,
        };
        let coded_b = CodedSpStatistics {
            mean: coded.vector("mean_B", Some(dim))?,
            std: coded.vector("std_B", Some(dim))?,
        };

        Ok(Self {
            a: DomainStatistics {
                log_f0: log_f0_a,
                coded_sp: coded_a,
            },
            b: DomainStatistics {
                log_f0: log_f0_b,
                coded_sp: coded_b,
            },
        })
    }
}

/// Shape-checked reads with errors naming the archive.
struct ArchiveReader<'a> {
    path: &'a Path,
    file: TensorFile,
}

impl<'a> ArchiveReader<'a> {
    fn open(path: &'a Path) -> Result<Self> {
        let file = TensorFile::open(path).map_err(|e| Error::archive(path, e.to_string()))?;
        Ok(Self { path, file })
    }

    fn read(&self, name: &str) -> Result<TensorF64> {
        self.file
            .tensor(name)
            .map_err(|e| Error::archive(self.path, format!("tensor {}: {}", name, e)))
    }

    fn scalar(&self, name: &str) -> Result<f64> {
        let t = self.read(name)?;
        if t.shape != [1] {
            return Err(Error::archive(
                self.path,
                format!("tensor {} has shape {:?}, expected [1]", name, t.shape),
            ));
        }
        Ok(t.data[0])
    }

    fn vector(&self, name: &str, expected_len: Option<usize>) -> Result<Array1<f64>> {
        let t = self.read(name)?;
        let len_ok = expected_len.map_or(true, |len| t.shape == [len]);
        if t.shape.len() != 1 || !len_ok {
            return Err(Error::archive(
                self.path,
                format!("tensor {} has shape {:?}, expected {:?}", name, t.shape, expected_len),
            ));
        }
        Ok(Array1::from(t.data))
    }
}
