//! Trainable model boundary
//!
//! The training loop drives any [`CycleGanModel`]. Network topology and loss
//! formulas live behind the trait:
//!
//! - **LinearCycleGan**: per-dimension affine generators with linear LSGAN
//!   discriminators, trained with Adam. Small enough to run on CPU in tests.

pub mod linear;

pub use linear::{LinearCycleGan, LinearCycleGanConfig};

use std::fmt;
use std::path::{Path, PathBuf};

use ndarray::Array3;

use crate::error::Result;

/// One of the two speaking styles being converted between
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    A,
    B,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::A => write!(f, "A"),
            Domain::B => write!(f, "B"),
        }
    }
}

/// Conversion direction for inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    AToB,
    BToA,
}

impl Direction {
    pub fn source(self) -> Domain {
        match self {
            Direction::AToB => Domain::A,
            Direction::BToA => Domain::B,
        }
    }

    pub fn target(self) -> Domain {
        match self {
            Direction::AToB => Domain::B,
            Direction::BToA => Domain::A,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}2{}", self.source(), self.target())
    }
}

/// Loss multipliers for one training step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossWeights {
    pub cycle: f64,
    pub identity: f64,
}

/// Optimizer learning rates for one training step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearningRates {
    pub generator: f64,
    pub discriminator: f64,
}

/// Losses reported by one training step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepLosses {
    pub generator: f64,
    pub discriminator: f64,
}

/// A CycleGAN trained on normalized coded spectral envelopes.
///
/// All batches are shaped [batch, coded_dim, frames].
pub trait CycleGanModel {
    /// Run one optimization step of generators and discriminators.
    fn train_step(
        &mut self,
        batch_a: &Array3<f64>,
        batch_b: &Array3<f64>,
        weights: LossWeights,
        rates: LearningRates,
    ) -> Result<StepLosses>;

    /// Convert a batch from the direction's source domain to its target domain.
    fn infer(&self, batch: &Array3<f64>, direction: Direction) -> Result<Array3<f64>>;

    /// Persist parameters to `dir/name`, returning the written path.
    fn save(&self, dir: &Path, name: &str) -> Result<PathBuf>;

    /// Restore parameters from a checkpoint written by [`CycleGanModel::save`].
    fn load(&mut self, path: &Path) -> Result<()>;
}
