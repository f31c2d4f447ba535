//! Core reinforcement learning traits and types for the Wumpus agent
//!
//! This crate provides the shared vocabulary of the workspace: the
//! observation encoder, transitions, discrete actions, the
//! [`QFunctionApproximator`] capability and the [`Environment`] seam.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod action;
pub mod agent;
pub mod environment;
pub mod error;
pub mod observation;
pub mod trajectory;
pub mod value;

// Re-export core traits and types
pub use action::{DiscreteAction, DiscreteSpace};
pub use agent::AgentConfig;
pub use environment::{Environment, Episode, Step, StepInfo, TrackedEnvironment};
pub use error::{CheckpointError, RLError, Result};
pub use observation::{Observation, StateEncoder, OBSERVATION_FIELDS};
pub use trajectory::Transition;
pub use value::{argmax, OptimizerSnapshot, ParameterSnapshot, QFunctionApproximator, MAX_GRAD_NORM};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        AgentConfig, DiscreteAction, DiscreteSpace, Environment, Observation,
        QFunctionApproximator, Result, StateEncoder, Step, Transition,
    };
}
