//! Utility functions and helpers for RL agents

use serde::{Deserialize, Serialize};

/// Multiplicative decay toward a floor, applied once per training step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExponentialSchedule {
    /// Starting value
    pub start: f64,
    /// Minimum value
    pub min_value: f64,
    /// Decay rate
    pub decay_rate: f64,
}

impl ExponentialSchedule {
    /// Create a new exponential schedule
    #[must_use]
    pub fn new(start: f64, min_value: f64, decay_rate: f64) -> Self {
        Self {
            start,
            min_value,
            decay_rate,
        }
    }

    /// Value after one more decay from `current`
    #[must_use]
    pub fn next(&self, current: f64) -> f64 {
        (current * self.decay_rate).max(self.min_value)
    }

    /// Value after `t` decays from the start
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn value(&self, t: usize) -> f64 {
        let t = t.min(i32::MAX as usize) as i32;
        (self.start * self.decay_rate.powi(t)).max(self.min_value)
    }
}

/// Mean squared error between predictions and targets
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean_squared_error(predictions: &[f32], targets: &[f32]) -> f32 {
    if predictions.is_empty() {
        return 0.0;
    }
    let sum: f32 = predictions
        .iter()
        .zip(targets)
        .map(|(p, t)| (p - t) * (p - t))
        .sum();
    sum / predictions.len() as f32
}
