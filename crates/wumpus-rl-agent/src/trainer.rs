//! Episode-driven training and evaluation loops

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use wumpus_rl_core::{DiscreteAction, Environment, QFunctionApproximator, Result, StateEncoder};

use crate::dqn::DQNAgent;
use crate::metrics::{MetricsSummary, TrainingMetrics};

/// Training loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Episodes to train for
    pub episodes: usize,
    /// Steps after which an episode is cut off
    pub max_steps_per_episode: usize,
    /// Log progress every this many episodes (0 disables)
    pub log_interval: usize,
    /// Checkpoint every this many episodes (0 disables)
    pub checkpoint_interval: usize,
    /// Where checkpoints go; none are written when absent
    pub checkpoint_path: Option<PathBuf>,
    /// Greedy episodes run after training
    pub eval_episodes: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            episodes: 1000,
            max_steps_per_episode: 200,
            log_interval: 10,
            checkpoint_interval: 100,
            checkpoint_path: None,
            eval_episodes: 10,
        }
    }
}

/// Summary of one [`train`] call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Episodes run
    pub episodes: usize,
    /// Environment steps taken
    pub env_steps: u64,
    /// Replay steps that returned an error
    pub replay_failures: usize,
    /// Total reward of each episode in this call
    pub episode_rewards: Vec<f64>,
    /// Length of each episode in this call
    pub episode_lengths: Vec<usize>,
}

/// Train `agent` on `env` for `config.episodes` episodes.
///
/// Each step runs act, step, remember and replay in that order. The target
/// network is synced every `target_update_freq` environment steps. A failed
/// replay step is counted and training carries on.
///
/// # Errors
///
/// Environment, encoding or checkpoint failures abort the run.
pub async fn train<Q, E>(
    agent: &mut DQNAgent<Q>,
    env: &mut E,
    encoder: &StateEncoder,
    config: &TrainerConfig,
) -> Result<TrainingReport>
where
    Q: QFunctionApproximator,
    E: Environment,
{
    let sync_every = agent.config().base.target_update_freq as u64;
    let mut report = TrainingReport::default();

    tracing::info!(
        episodes = config.episodes,
        state_dim = agent.config().state_dim,
        "training started"
    );

    for episode in 1..=config.episodes {
        let mut state = encoder.encode(&env.reset().await?)?;
        let mut total_reward = 0.0f64;
        let mut length = 0;

        for _ in 0..config.max_steps_per_episode {
            let action = agent.act(state.view(), true)?;
            let step = env.step(DiscreteAction(action)).await?;
            let next_state = encoder.encode(&step.observation)?;

            total_reward += f64::from(step.reward);
            length += 1;
            report.env_steps += 1;

            agent.remember(state, action, step.reward, next_state.clone(), step.done);
            if agent.replay().is_err() {
                report.replay_failures += 1;
            }
            if report.env_steps % sync_every == 0 {
                agent.update_target_network()?;
            }

            state = next_state;
            if step.is_last() {
                break;
            }
        }

        agent.record_episode(total_reward, length);
        report.episodes += 1;
        report.episode_rewards.push(total_reward);
        report.episode_lengths.push(length);

        if config.log_interval > 0 && episode % config.log_interval == 0 {
            log_progress(episode, agent.metrics(), config.log_interval, agent.epsilon());
        }
        if let Some(path) = &config.checkpoint_path {
            if config.checkpoint_interval > 0 && episode % config.checkpoint_interval == 0 {
                agent.save(path).await?;
            }
        }
    }

    if let Some(path) = &config.checkpoint_path {
        agent.save(path).await?;
    }
    tracing::info!(
        episodes = report.episodes,
        env_steps = report.env_steps,
        replay_failures = report.replay_failures,
        "training finished"
    );
    Ok(report)
}

fn log_progress(episode: usize, metrics: &TrainingMetrics, window: usize, epsilon: f64) {
    let rewards = metrics.reward_summary(Some(window));
    let loss = metrics.loss_summary(Some(window)).map(|s| s.mean);
    tracing::info!(
        episode,
        mean_reward = rewards.map(|s| s.mean),
        max_reward = rewards.map(|s| s.max),
        mean_length = metrics.mean_episode_length(Some(window)),
        mean_loss = loss,
        epsilon,
        "training progress"
    );
}

/// Run `episodes` greedy episodes and return their total rewards
///
/// # Errors
///
/// Environment or encoding failures.
pub async fn evaluate<Q, E>(
    agent: &mut DQNAgent<Q>,
    env: &mut E,
    encoder: &StateEncoder,
    episodes: usize,
    max_steps: usize,
) -> Result<Vec<f64>>
where
    Q: QFunctionApproximator,
    E: Environment,
{
    let mut rewards = Vec::with_capacity(episodes);
    for _ in 0..episodes {
        let mut state = encoder.encode(&env.reset().await?)?;
        let mut total = 0.0f64;
        for _ in 0..max_steps {
            let action = agent.act(state.view(), false)?;
            let step = env.step(DiscreteAction(action)).await?;
            total += f64::from(step.reward);
            if step.is_last() {
                break;
            }
            state = encoder.encode(&step.observation)?;
        }
        rewards.push(total);
    }

    if let Some(summary) = MetricsSummary::of(&rewards) {
        tracing::info!(%summary, "evaluation finished");
    }
    Ok(rewards)
}

/// Histories handed to the plotting script
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingResults {
    /// Total reward per training episode
    pub episode_rewards: Vec<f64>,
    /// Length per training episode
    pub episode_lengths: Vec<usize>,
    /// Loss per replay step
    pub losses: Vec<f64>,
    /// Total reward per evaluation episode
    pub eval_rewards: Vec<f64>,
}

#[derive(Serialize, Deserialize)]
struct ResultsFile {
    dqn: TrainingResults,
}

impl TrainingResults {
    /// Gather the agent's histories and evaluation rewards
    #[must_use]
    pub fn new(metrics: &TrainingMetrics, eval_rewards: Vec<f64>) -> Self {
        Self {
            episode_rewards: metrics.rewards.clone(),
            episode_lengths: metrics.episode_lengths.clone(),
            losses: metrics.losses.clone(),
            eval_rewards,
        }
    }

    /// Write as `{"dqn": {...}}`
    ///
    /// # Errors
    ///
    /// IO or serialization failures.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let file = ResultsFile { dqn: self.clone() };
        let json = serde_json::to_string_pretty(&file)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    /// Read a file written by [`TrainingResults::save`]
    ///
    /// # Errors
    ///
    /// IO or parse failures.
    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        let file: ResultsFile = serde_json::from_str(&json)?;
        Ok(file.dqn)
    }
}
