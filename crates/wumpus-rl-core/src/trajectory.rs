//! Transitions stored for experience replay

use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Single `(s, a, r, s', done)` transition
///
/// Fields are read-only once constructed; the replay buffer hands out
/// shared references and never mutates stored transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    state: Array1<f32>,
    action: usize,
    reward: f32,
    next_state: Array1<f32>,
    done: bool,
}

impl Transition {
    /// Create a new transition
    #[must_use]
    pub fn new(
        state: Array1<f32>,
        action: usize,
        reward: f32,
        next_state: Array1<f32>,
        done: bool,
    ) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            done,
        }
    }

    /// Encoded state the action was taken in
    #[must_use]
    pub fn state(&self) -> &Array1<f32> {
        &self.state
    }

    /// Index of the action taken
    #[must_use]
    pub fn action(&self) -> usize {
        self.action
    }

    /// Reward received
    #[must_use]
    pub fn reward(&self) -> f32 {
        self.reward
    }

    /// Encoded state after the action
    #[must_use]
    pub fn next_state(&self) -> &Array1<f32> {
        &self.next_state
    }

    /// Whether the episode ended on this transition
    #[must_use]
    pub fn done(&self) -> bool {
        self.done
    }

    /// `0.0` for terminal transitions, `1.0` otherwise
    #[must_use]
    pub fn continuation(&self) -> f32 {
        if self.done {
            0.0
        } else {
            1.0
        }
    }
}
