//! Environment traits and types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{DiscreteAction, DiscreteSpace, Observation};

/// Result of a single environment step
#[derive(Debug, Clone)]
pub struct Step {
    /// Observation after the action
    pub observation: Observation,
    /// Reward signal
    pub reward: f32,
    /// Whether the episode reached a terminal state
    pub done: bool,
    /// Whether the episode was cut short (e.g., time limit)
    pub truncated: bool,
    /// Additional info from the environment
    pub info: StepInfo,
}

impl Step {
    /// Whether the episode is over for any reason
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.done || self.truncated
    }
}

/// Additional information from a step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepInfo {
    /// Custom fields
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl StepInfo {
    /// Attach a field
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.fields.insert(key.into(), value.into());
    }
}

/// Episode information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    /// Episode ID
    pub id: String,
    /// Total reward
    pub total_reward: f64,
    /// Number of steps
    pub steps: usize,
    /// Whether episode was truncated
    pub truncated: bool,
    /// Start time
    pub start_time: chrono::DateTime<chrono::Utc>,
    /// End time
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl Episode {
    /// Whether the episode has ended
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }
}

/// Environment that the agent steps through with discrete actions.
///
/// The agent never owns an environment; the trainer drives one and feeds
/// observations, rewards and terminal flags to the agent.
#[async_trait]
pub trait Environment: Send + Sync {
    /// Get the action space
    fn action_space(&self) -> DiscreteSpace;

    /// Reset the environment and return the first observation
    async fn reset(&mut self) -> crate::Result<Observation>;

    /// Take a step in the environment
    async fn step(&mut self, action: DiscreteAction) -> crate::Result<Step>;

    /// Close the environment
    async fn close(&mut self) -> crate::Result<()> {
        Ok(())
    }

    /// Get current episode info
    fn episode_info(&self) -> Option<Episode> {
        None
    }
}

/// Wrapper for environments that tracks episodes
pub struct TrackedEnvironment<E> {
    /// Inner environment
    pub env: E,
    /// Current episode
    pub episode: Option<Episode>,
    /// Step counter
    pub step_count: usize,
}

impl<E> TrackedEnvironment<E> {
    /// Create a new tracked environment
    pub fn new(env: E) -> Self {
        Self {
            env,
            episode: None,
            step_count: 0,
        }
    }

    /// Unwrap the inner environment
    pub fn into_inner(self) -> E {
        self.env
    }
}

#[async_trait]
impl<E> Environment for TrackedEnvironment<E>
where
    E: Environment,
{
    fn action_space(&self) -> DiscreteSpace {
        self.env.action_space()
    }

    async fn reset(&mut self) -> crate::Result<Observation> {
        // End current episode if exists
        if let Some(ref mut episode) = self.episode {
            if episode.end_time.is_none() {
                episode.end_time = Some(chrono::Utc::now());
            }
        }

        // Start new episode
        self.episode = Some(Episode {
            id: uuid::Uuid::new_v4().to_string(),
            total_reward: 0.0,
            steps: 0,
            truncated: false,
            start_time: chrono::Utc::now(),
            end_time: None,
        });
        self.step_count = 0;

        self.env.reset().await
    }

    async fn step(&mut self, action: DiscreteAction) -> crate::Result<Step> {
        let step = self.env.step(action).await?;

        self.step_count += 1;
        if let Some(ref mut episode) = self.episode {
            episode.total_reward += f64::from(step.reward);
            episode.steps = self.step_count;

            if step.is_last() {
                episode.truncated = step.truncated;
                episode.end_time = Some(chrono::Utc::now());
                tracing::debug!(
                    episode = %episode.id,
                    steps = episode.steps,
                    reward = episode.total_reward,
                    "episode finished"
                );
            }
        }

        Ok(step)
    }

    async fn close(&mut self) -> crate::Result<()> {
        self.env.close().await
    }

    fn episode_info(&self) -> Option<Episode> {
        self.episode.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts down from `len`, paying 1.0 per step
    struct Countdown {
        len: usize,
        left: usize,
    }

    #[async_trait]
    impl Environment for Countdown {
        fn action_space(&self) -> DiscreteSpace {
            DiscreteSpace::new(2)
        }

        async fn reset(&mut self) -> crate::Result<Observation> {
            self.left = self.len;
            Ok(Observation::new())
        }

        async fn step(&mut self, _action: DiscreteAction) -> crate::Result<Step> {
            self.left -= 1;
            Ok(Step {
                observation: Observation::new(),
                reward: 1.0,
                done: self.left == 0,
                truncated: false,
                info: StepInfo::default(),
            })
        }
    }

    #[test]
    fn test_tracked_environment_records_episode() {
        tokio_test::block_on(async {
            let mut env = TrackedEnvironment::new(Countdown { len: 3, left: 0 });
            assert!(env.episode_info().is_none());

            env.reset().await.unwrap();
            let first_id = env.episode_info().unwrap().id;
            loop {
                if env.step(DiscreteAction(0)).await.unwrap().is_last() {
                    break;
                }
            }

            let episode = env.episode_info().unwrap();
            assert_eq!(episode.steps, 3);
            assert!((episode.total_reward - 3.0).abs() < f64::EPSILON);
            assert!(episode.is_finished());

            env.reset().await.unwrap();
            let next = env.episode_info().unwrap();
            assert_ne!(next.id, first_id);
            assert_eq!(next.steps, 0);
        });
    }
}
