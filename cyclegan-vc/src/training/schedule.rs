//! Learning rate and loss weight schedules
//!
//! Everything is a pure function of the global iteration counter, so the
//! state for any iteration can be recomputed without replaying the run.

use super::config::TrainingConfig;
use crate::models::{LearningRates, LossWeights};

/// Constant learning rate that decays linearly after `decay_start` steps,
/// clamped at `min_lr`.
#[derive(Debug, Clone)]
pub struct LinearDecayScheduler {
    /// Base learning rate
    base_lr: f64,
    /// Decrease per step once decay has started
    decay_per_step: f64,
    /// Minimum learning rate
    min_lr: f64,
    /// Last step with the base learning rate
    decay_start: usize,
}

impl LinearDecayScheduler {
    pub fn new(base_lr: f64, decay_per_step: f64, decay_start: usize) -> Self {
        Self {
            base_lr,
            decay_per_step,
            min_lr: 0.0,
            decay_start,
        }
    }

    /// Set minimum learning rate
    pub fn with_min_lr(mut self, min_lr: f64) -> Self {
        self.min_lr = min_lr;
        self
    }

    /// Learning rate at an arbitrary step
    pub fn lr_at(&self, step: usize) -> f64 {
        if step <= self.decay_start {
            return self.base_lr;
        }
        let decayed = self.base_lr - self.decay_per_step * (step - self.decay_start) as f64;
        decayed.max(self.min_lr)
    }
}

/// Rates and weights in effect for one training iteration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleState {
    pub iteration: usize,
    pub rates: LearningRates,
    pub weights: LossWeights,
}

/// Learning rates and loss weights as a function of the global iteration.
#[derive(Debug, Clone)]
pub struct TrainingSchedule {
    generator: LinearDecayScheduler,
    discriminator: LinearDecayScheduler,
    cycle_weight: f64,
    identity_weight: f64,
    identity_weight_after_decay: f64,
    decay_start: usize,
}

impl TrainingSchedule {
    pub fn from_config(config: &TrainingConfig) -> Self {
        let decay_start = config.decay_start_iteration;
        Self {
            generator: LinearDecayScheduler::new(
                config.generator_learning_rate,
                config.generator_learning_rate_decay,
                decay_start,
            )
            .with_min_lr(config.min_learning_rate),
            discriminator: LinearDecayScheduler::new(
                config.discriminator_learning_rate,
                config.discriminator_learning_rate_decay,
                decay_start,
            )
            .with_min_lr(config.min_learning_rate),
            cycle_weight: config.cycle_loss_weight,
            identity_weight: config.identity_loss_weight,
            identity_weight_after_decay: config.identity_loss_weight_after_decay,
            decay_start,
        }
    }

    /// Schedule for global iteration `iteration`.
    pub fn state_at(&self, iteration: usize) -> ScheduleState {
        let identity = if iteration > self.decay_start {
            self.identity_weight_after_decay
        } else {
            self.identity_weight
        };

        ScheduleState {
            iteration,
            rates: LearningRates {
                generator: self.generator.lr_at(iteration),
                discriminator: self.discriminator.lr_at(iteration),
            },
            weights: LossWeights {
                cycle: self.cycle_weight,
                identity,
            },
        }
    }
}
