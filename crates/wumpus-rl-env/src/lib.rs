//! Hunt the Wumpus environment for the DQN agent
//!
//! This crate provides:
//! - [`WumpusEnv`], a headless grid world emitting the seven-field observation
//! - [`TimeLimit`], a wrapper truncating long episodes

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod wrappers;
pub mod wumpus;

pub use wrappers::TimeLimit;
pub use wumpus::{Cell, Layout, RewardTable, WumpusAction, WumpusConfig, WumpusEnv};

// Re-export core types
pub use wumpus_rl_core::{Environment, Observation, Step};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{TimeLimit, WumpusAction, WumpusConfig, WumpusEnv};
    pub use wumpus_rl_core::prelude::*;
}
