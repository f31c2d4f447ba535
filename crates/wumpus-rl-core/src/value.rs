//! Action-value function approximators

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::{RLError, Result};

/// Full copy of an approximator's trainable parameters
///
/// `layer_sizes` identifies the architecture (input, hidden..., output);
/// `values` holds every parameter in the approximator's own order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterSnapshot {
    /// Architecture the values belong to
    pub layer_sizes: Vec<usize>,
    /// Flattened parameters
    pub values: Vec<f32>,
}

impl ParameterSnapshot {
    /// Number of scalar parameters
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the snapshot holds no parameters
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Internal state of the optimizer attached to an approximator
///
/// Carries the step size and decay rates as well as the moments, so a
/// restored optimizer continues with the settings it was trained with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OptimizerSnapshot {
    /// Step size
    pub learning_rate: f32,
    /// Decay rate of the first moment
    pub beta1: f32,
    /// Decay rate of the second moment
    pub beta2: f32,
    /// Number of updates applied so far
    pub step: u64,
    /// Exponential moving average of gradients
    pub first_moment: Vec<f32>,
    /// Exponential moving average of squared gradients
    pub second_moment: Vec<f32>,
}

impl Default for OptimizerSnapshot {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            step: 0,
            first_moment: Vec::new(),
            second_moment: Vec::new(),
        }
    }
}

impl OptimizerSnapshot {
    /// Check the hyperparameters and that both moments have equal length
    ///
    /// # Errors
    ///
    /// [`RLError::Config`] for a non-positive step size or a decay rate
    /// outside `[0, 1)`; [`RLError::DimensionMismatch`] for uneven moments.
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(RLError::Config(format!(
                "optimizer learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        for beta in [self.beta1, self.beta2] {
            if !(0.0..1.0).contains(&beta) {
                return Err(RLError::Config(format!(
                    "optimizer decay rates must be in [0, 1), got {beta}"
                )));
            }
        }
        ensure_dim(self.first_moment.len(), self.second_moment.len())
    }
}

/// Maps an encoded state to one value estimate per action.
///
/// Implementations own their parameters and optimizer. The agent only
/// talks to this trait, so any differentiable model (or a test double)
/// can stand in.
pub trait QFunctionApproximator: Send + Sync {
    /// Length of the state vectors accepted by [`forward`](Self::forward)
    fn input_dim(&self) -> usize;

    /// Number of action values produced
    fn num_actions(&self) -> usize;

    /// Value estimates for a single state
    ///
    /// # Errors
    ///
    /// [`RLError::DimensionMismatch`] if `state` has the wrong length.
    fn forward(&self, state: ArrayView1<f32>) -> Result<Array1<f32>>;

    /// Value estimates for a batch of states, one row per state
    ///
    /// # Errors
    ///
    /// [`RLError::DimensionMismatch`] if the column count is wrong.
    fn forward_batch(&self, states: ArrayView2<f32>) -> Result<Array2<f32>> {
        let mut out = Array2::zeros((states.nrows(), self.num_actions()));
        for (row, state) in states.rows().into_iter().enumerate() {
            out.row_mut(row).assign(&self.forward(state)?);
        }
        Ok(out)
    }

    /// Snapshot of the current parameters
    fn parameters(&self) -> ParameterSnapshot;

    /// Overwrite every parameter from a snapshot
    ///
    /// # Errors
    ///
    /// Fails without modifying anything if the snapshot does not match
    /// this approximator's architecture.
    fn load_parameters(&mut self, snapshot: &ParameterSnapshot) -> Result<()>;

    /// Snapshot of the optimizer state
    fn optimizer_state(&self) -> OptimizerSnapshot;

    /// Restore optimizer state
    ///
    /// # Errors
    ///
    /// Fails without modifying anything if the moment vectors do not
    /// match the parameter count.
    fn load_optimizer_state(&mut self, snapshot: &OptimizerSnapshot) -> Result<()>;

    /// Apply one optimizer update.
    ///
    /// `output_grad` is the gradient of the scalar loss with respect to
    /// [`forward_batch`](Self::forward_batch)`(states)`. The parameter
    /// gradient is clipped to a global L2 norm of [`MAX_GRAD_NORM`]
    /// before the update. Returns the norm measured before clipping.
    ///
    /// # Errors
    ///
    /// Shape errors, or [`RLError::NonFiniteLoss`] when the gradient is
    /// not finite. Parameters are untouched on error.
    fn gradient_step(&mut self, states: ArrayView2<f32>, output_grad: ArrayView2<f32>) -> Result<f32>;
}

/// Gradient-norm ceiling applied by [`QFunctionApproximator::gradient_step`]
pub const MAX_GRAD_NORM: f32 = 1.0;

/// Index of the largest value, first one on ties. `None` for empty input.
#[must_use]
pub fn argmax(values: ArrayView1<f32>) -> Option<usize> {
    if values.is_empty() {
        return None;
    }
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    Some(best.map_or(0, |(i, _)| i))
}

/// Check that `actual` equals `expected`, as a [`RLError::DimensionMismatch`]
///
/// # Errors
///
/// When the two sizes differ.
pub fn ensure_dim(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(RLError::DimensionMismatch { expected, actual })
    }
}
