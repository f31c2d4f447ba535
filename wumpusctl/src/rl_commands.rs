// Command implementations for wumpusctl

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use wumpus_rl_agent::{
    evaluate, train, Checkpoint, DQNAgent, DQNConfig, MetricsSummary, TrainerConfig,
    TrainingResults,
};
use wumpus_rl_core::{Environment, StateEncoder, TrackedEnvironment};
use wumpus_rl_env::{TimeLimit, WumpusConfig, WumpusEnv};

use crate::Commands;

/// Everything a training run needs, as read from `--config`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RunConfig {
    #[serde(deserialize_with = "strict_agent_config")]
    agent: DQNConfig,
    env: WumpusConfig,
    trainer: TrainerConfig,
}

pub async fn handle_command(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Train {
            config,
            episodes,
            seed,
            checkpoint,
            results,
            resume,
        } => {
            let mut run = load_run_config(config.as_deref()).await?;
            if let Some(episodes) = episodes {
                run.trainer.episodes = episodes;
            }
            if let Some(seed) = seed {
                run.agent.seed = Some(seed);
                run.env.seed = Some(seed.wrapping_add(1));
            }
            if checkpoint.is_some() {
                run.trainer.checkpoint_path = checkpoint;
            }
            tracing::debug!(config = ?run, "run configuration");
            start_training(run, results, resume).await?;
        }

        Commands::Evaluate {
            checkpoint,
            config,
            episodes,
            seed,
        } => {
            let mut run = load_run_config(config.as_deref()).await?;
            if seed.is_some() {
                run.env.seed = seed;
            }
            evaluate_checkpoint(&checkpoint, run, episodes).await?;
        }

        Commands::Inspect { checkpoint, window } => {
            inspect_checkpoint(&checkpoint, window).await?;
        }
    }

    Ok(())
}

/// `DQNConfig` flattens its base settings, so serde cannot reject unknown keys itself
fn strict_agent_config<'de, D>(deserializer: D) -> std::result::Result<DQNConfig, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    DQNConfig::from_json(value).map_err(serde::de::Error::custom)
}

async fn load_run_config(path: Option<&Path>) -> Result<RunConfig> {
    let Some(path) = path else {
        return Ok(RunConfig::default());
    };
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))
}

/// Wrap the world the way both training and evaluation play it.
///
/// Also returns the encoded state length, measured on the initial layout
/// so that no tracked episode is opened.
fn build_env(
    config: WumpusConfig,
    max_steps: usize,
    encoder: &StateEncoder,
) -> Result<(TrackedEnvironment<TimeLimit<WumpusEnv>>, usize)> {
    let env = WumpusEnv::new(config).context("Invalid environment config")?;
    let state_dim = encoder.encode(&env.observation())?.len();
    Ok((TrackedEnvironment::new(TimeLimit::new(env, max_steps)), state_dim))
}

async fn start_training(mut run: RunConfig, results: Option<PathBuf>, resume: bool) -> Result<()> {
    let encoder = StateEncoder;
    let (mut env, state_dim) =
        build_env(run.env.clone(), run.trainer.max_steps_per_episode, &encoder)?;
    run.agent.state_dim = state_dim;
    run.agent.num_actions = env.action_space().len();

    println!("🤖 Starting DQN training");
    println!("   Grid: {0}x{0}, pits: {1}", run.env.grid_size, run.env.num_pits);
    println!("   State size: {state_dim}, actions: {}", run.agent.num_actions);
    println!("   Episodes: {}", run.trainer.episodes);
    if let Some(path) = &run.trainer.checkpoint_path {
        println!("   Checkpoint: {}", path.display());
    }

    let mut agent = DQNAgent::new(run.agent.clone()).context("Invalid agent config")?;
    if resume {
        if let Some(path) = &run.trainer.checkpoint_path {
            agent
                .load(path)
                .await
                .with_context(|| format!("Failed to resume from {}", path.display()))?;
            println!("   Resumed at epsilon {:.4}", agent.epsilon());
        }
    }

    let report = train(&mut agent, &mut env, &encoder, &run.trainer)
        .await
        .context("Training failed")?;
    let eval_rewards = evaluate(
        &mut agent,
        &mut env,
        &encoder,
        run.trainer.eval_episodes,
        run.trainer.max_steps_per_episode,
    )
    .await
    .context("Evaluation failed")?;

    println!("\n✅ Training complete");
    println!("   Environment steps: {}", report.env_steps);
    println!("   Failed replay steps: {}", report.replay_failures);
    println!("   Final epsilon: {:.4}", agent.epsilon());
    if let Some(summary) = MetricsSummary::of(&report.episode_rewards) {
        println!("   Training reward: {summary}");
    }
    if let Some(summary) = MetricsSummary::of(&eval_rewards) {
        println!("   Greedy reward:   {summary}");
    }

    if let Some(path) = results {
        TrainingResults::new(agent.metrics(), eval_rewards)
            .save(&path)
            .await
            .with_context(|| format!("Failed to write results to {}", path.display()))?;
        println!("   Results: {}", path.display());
    }

    Ok(())
}

/// Agent settings matching the networks stored in a checkpoint
fn config_for(checkpoint: &Checkpoint) -> Result<DQNConfig> {
    let sizes = &checkpoint.policy_params.layer_sizes;
    let [input, hidden @ .., output] = sizes.as_slice() else {
        bail!("Checkpoint has fewer than two layers: {sizes:?}");
    };
    Ok(DQNConfig {
        state_dim: *input,
        num_actions: *output,
        hidden_dims: hidden.to_vec(),
        // evaluation is greedy; accept any stored exploration rate
        epsilon_start: 1.0,
        epsilon_end: 0.0,
        ..DQNConfig::default()
    })
}

async fn evaluate_checkpoint(path: &Path, run: RunConfig, episodes: usize) -> Result<()> {
    let checkpoint = Checkpoint::read(path)
        .await
        .with_context(|| format!("Failed to read checkpoint {}", path.display()))?;
    let mut agent = DQNAgent::new(config_for(&checkpoint)?)?;
    agent.load(path).await?;

    let encoder = StateEncoder;
    let (mut env, state_dim) = build_env(run.env, run.trainer.max_steps_per_episode, &encoder)?;
    if state_dim != agent.config().state_dim {
        bail!(
            "Checkpoint expects {} state features but this world produces {state_dim}",
            agent.config().state_dim
        );
    }

    println!("🎯 Evaluating {} for {episodes} episodes", path.display());
    let rewards = evaluate(
        &mut agent,
        &mut env,
        &encoder,
        episodes,
        run.trainer.max_steps_per_episode,
    )
    .await?;

    for (i, reward) in rewards.iter().enumerate() {
        println!("   Episode {}: {reward:.1}", i + 1);
    }
    if let Some(summary) = MetricsSummary::of(&rewards) {
        println!("\n   {summary}");
    }
    Ok(())
}

async fn inspect_checkpoint(path: &Path, window: usize) -> Result<()> {
    let checkpoint = Checkpoint::read(path)
        .await
        .with_context(|| format!("Failed to read checkpoint {}", path.display()))?;
    let metrics = &checkpoint.metrics;

    println!("📋 Checkpoint {}", path.display());
    println!("   Version: {}", checkpoint.version);
    println!("   Saved: {}", checkpoint.saved_at);
    println!("   Layers: {:?}", checkpoint.policy_params.layer_sizes);
    println!("   Optimizer steps: {}", checkpoint.optimizer_state.step);
    println!("   Epsilon: {:.4}", checkpoint.epsilon);
    println!("   Episodes: {}", metrics.rewards.len());
    println!("   Replay steps: {}", metrics.losses.len());

    match metrics.reward_summary(Some(window)) {
        Some(summary) => println!("   Reward (last {window}): {summary}"),
        None => println!("   No episodes recorded"),
    }
    if let Some(length) = metrics.mean_episode_length(Some(window)) {
        println!("   Mean length (last {window}): {length:.1}");
    }
    if let Some(summary) = metrics.loss_summary(Some(window)) {
        println!("   Loss (last {window}): {summary}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_config_sections() {
        let run: RunConfig = serde_json::from_str(
            r#"{"agent": {"batch_size": 16, "hidden_dims": [32]}, "trainer": {"episodes": 5}}"#,
        )
        .unwrap();
        assert_eq!(run.agent.base.batch_size, 16);
        assert_eq!(run.agent.hidden_dims, vec![32]);
        assert_eq!(run.trainer.episodes, 5);
        assert_eq!(run.env.grid_size, WumpusConfig::default().grid_size);
    }

    #[test]
    fn test_run_config_rejects_misspelled_agent_key() {
        let err = serde_json::from_str::<RunConfig>(r#"{"agent": {"learning_rat": 0.1}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("learning_rat"), "{err}");
        assert!(serde_json::from_str::<RunConfig>(r#"{"agnet": {}}"#).is_err());
    }

    #[test]
    fn test_build_env_opens_no_episode() {
        let (env, state_dim) = build_env(WumpusConfig::default(), 50, &StateEncoder).unwrap();
        assert!(env.episode_info().is_none());
        assert_eq!(state_dim, DQNConfig::default().state_dim);
    }
}
