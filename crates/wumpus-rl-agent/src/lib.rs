//! Deep Q-Network agent for the Wumpus grid world
//!
//! This crate provides:
//! - [`ReplayBuffer`], a bounded FIFO store of transitions
//! - [`QNetwork`], a pure-`ndarray` MLP trained with Adam
//! - [`DQNAgent`], epsilon-greedy acting, replay training and target sync
//! - checkpoint persistence and the episode-driven [`train`] loop

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod buffer;
pub mod checkpoint;
pub mod dqn;
pub mod metrics;
pub mod network;
pub mod trainer;
pub mod utils;

// Re-export agents
pub use dqn::{DQNAgent, DQNConfig, ReplayOutcome};

// Re-export utilities
pub use buffer::ReplayBuffer;
pub use checkpoint::{Checkpoint, CHECKPOINT_VERSION};
pub use metrics::{MetricsSummary, TrainingMetrics};
pub use trainer::{evaluate, train, TrainerConfig, TrainingReport, TrainingResults};
pub use utils::{mean_squared_error, ExponentialSchedule};

// Re-export network components
pub use network::{QNetwork, QNetworkConfig};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        DQNAgent, DQNConfig, QNetwork, ReplayBuffer, ReplayOutcome, TrainerConfig,
        TrainingMetrics,
    };
    pub use wumpus_rl_core::prelude::*;
}
