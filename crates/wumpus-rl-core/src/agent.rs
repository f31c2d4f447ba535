//! Hyperparameters shared by value-based agents

use serde::{Deserialize, Serialize};

use crate::{RLError, Result};

/// Configuration for agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Learning rate
    pub learning_rate: f64,
    /// Discount factor
    pub gamma: f64,
    /// Batch size for training
    pub batch_size: usize,
    /// Buffer size for experience replay
    pub buffer_size: usize,
    /// Hard target network sync every N environment steps
    pub target_update_freq: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            gamma: 0.99,
            batch_size: 64,
            buffer_size: 10_000,
            target_update_freq: 100,
        }
    }
}

impl AgentConfig {
    /// Reject values no agent can train with
    ///
    /// # Errors
    ///
    /// [`RLError::Config`] describing the first offending field.
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(RLError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(RLError::Config(format!("gamma must be in [0, 1], got {}", self.gamma)));
        }
        if self.batch_size == 0 {
            return Err(RLError::Config("batch_size must be at least 1".into()));
        }
        if self.batch_size > self.buffer_size {
            return Err(RLError::Config(format!(
                "batch_size {} exceeds buffer_size {}",
                self.batch_size, self.buffer_size
            )));
        }
        if self.target_update_freq == 0 {
            return Err(RLError::Config("target_update_freq must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(AgentConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_batch_larger_than_buffer() {
        let config = AgentConfig {
            batch_size: 128,
            buffer_size: 64,
            ..AgentConfig::default()
        };
        assert!(matches!(config.validate(), Err(RLError::Config(_))));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AgentConfig = serde_json::from_str(r#"{"gamma": 0.9}"#).unwrap();
        assert!((config.gamma - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.batch_size, 64);
    }
}
