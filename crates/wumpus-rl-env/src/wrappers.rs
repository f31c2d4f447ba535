//! Environment wrappers

use async_trait::async_trait;

use wumpus_rl_core::{DiscreteAction, DiscreteSpace, Environment, Observation, Result, Step};

/// Time limit wrapper
///
/// Marks the step that reaches `max_steps` as truncated. Truncation is not
/// a terminal state, so `done` is left as the inner environment set it.
pub struct TimeLimit<E> {
    /// Inner environment
    pub env: E,
    /// Maximum steps
    pub max_steps: usize,
    /// Current step count
    pub steps: usize,
}

impl<E> TimeLimit<E> {
    /// Create a new time limit wrapper
    pub fn new(env: E, max_steps: usize) -> Self {
        Self {
            env,
            max_steps,
            steps: 0,
        }
    }

    /// Unwrap the inner environment
    pub fn into_inner(self) -> E {
        self.env
    }
}

#[async_trait]
impl<E> Environment for TimeLimit<E>
where
    E: Environment,
{
    fn action_space(&self) -> DiscreteSpace {
        self.env.action_space()
    }

    async fn reset(&mut self) -> Result<Observation> {
        self.steps = 0;
        self.env.reset().await
    }

    async fn step(&mut self, action: DiscreteAction) -> Result<Step> {
        self.steps += 1;
        let mut step = self.env.step(action).await?;

        if self.steps >= self.max_steps && !step.done {
            step.truncated = true;
        }

        Ok(step)
    }

    async fn close(&mut self) -> Result<()> {
        self.env.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Layout, WumpusConfig, WumpusEnv};

    /// Open 3x3 world with nothing to fall into
    fn open_world() -> WumpusEnv {
        WumpusEnv::new(WumpusConfig {
            grid_size: 3,
            num_pits: 0,
            num_wumpus: 1,
            layout: Some(Layout {
                wumpus: vec![(0, 2)],
                pits: vec![],
                gold: (0, 0),
            }),
            ..WumpusConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_truncates_at_limit() {
        let mut env = TimeLimit::new(open_world(), 3);
        env.reset().await.unwrap();

        // bump into the left wall until the limit
        for expected in [false, false, true] {
            let step = env.step(DiscreteAction(2)).await.unwrap();
            assert!(!step.done);
            assert_eq!(step.truncated, expected);
        }

        env.reset().await.unwrap();
        assert_eq!(env.steps, 0);
        assert!(!env.step(DiscreteAction(2)).await.unwrap().truncated);
    }
}
