//! End-to-end checks of the agent against the Wumpus world

use ndarray::{arr1, Array1};
use proptest::prelude::*;
use tempfile::tempdir;

use wumpus_rl_agent::{train, DQNAgent, DQNConfig, ReplayOutcome, TrainerConfig};
use wumpus_rl_core::{
    AgentConfig, CheckpointError, Environment, QFunctionApproximator, RLError, StateEncoder,
    OBSERVATION_FIELDS,
};
use wumpus_rl_env::{WumpusConfig, WumpusEnv};

fn small_world(seed: u64) -> WumpusEnv {
    WumpusEnv::new(WumpusConfig {
        grid_size: 4,
        num_pits: 2,
        seed: Some(seed),
        ..WumpusConfig::default()
    })
    .unwrap()
}

/// 1 + 2 + 2 + 4 + 2 + 1 + 16 features for the 4x4 world
const SMALL_STATE_DIM: usize = 28;

fn config(seed: u64) -> DQNConfig {
    DQNConfig {
        base: AgentConfig {
            batch_size: 8,
            buffer_size: 64,
            target_update_freq: 10,
            ..AgentConfig::default()
        },
        state_dim: SMALL_STATE_DIM,
        hidden_dims: vec![16, 16],
        epsilon_decay: 0.9,
        seed: Some(seed),
        ..DQNConfig::default()
    }
}

fn state(fill: f32) -> Array1<f32> {
    Array1::from_elem(SMALL_STATE_DIM, fill)
}

async fn trained_agent() -> DQNAgent {
    let mut agent = DQNAgent::new(config(1)).unwrap();
    let mut env = small_world(2);
    let trainer = TrainerConfig {
        episodes: 20,
        max_steps_per_episode: 25,
        log_interval: 0,
        ..TrainerConfig::default()
    };
    train(&mut agent, &mut env, &StateEncoder, &trainer).await.unwrap();
    agent
}

#[test]
fn test_buffer_keeps_newest_transitions() {
    let mut agent = DQNAgent::new(DQNConfig {
        base: AgentConfig {
            batch_size: 1,
            buffer_size: 3,
            ..AgentConfig::default()
        },
        ..config(0)
    })
    .unwrap();

    for tag in 1u8..=4 {
        let tag = f32::from(tag);
        agent.remember(state(tag), 0, tag, state(tag), false);
    }

    let rewards: Vec<f32> = agent.buffer().iter().map(|t| t.reward()).collect();
    assert_eq!(rewards, vec![2.0, 3.0, 4.0]);
}

#[test]
fn test_greedy_action_is_deterministic() {
    let mut agent = DQNAgent::new(config(3)).unwrap();
    let s = state(0.25);

    let first = agent.act(s.view(), false).unwrap();
    for _ in 0..10 {
        assert_eq!(agent.act(s.view(), false).unwrap(), first);
    }
}

#[test]
fn test_replay_noop_below_batch_size() {
    let mut agent = DQNAgent::new(config(4)).unwrap();
    for i in 0..7u8 {
        agent.remember(state(f32::from(i)), 1, 1.0, state(0.0), true);
    }
    let epsilon = agent.epsilon().to_bits();
    let metrics = serde_json::to_vec(agent.metrics()).unwrap();

    for _ in 0..5 {
        assert!(matches!(agent.replay().unwrap(), ReplayOutcome::Skipped { buffered: 7, required: 8 }));
    }
    assert_eq!(agent.epsilon().to_bits(), epsilon);
    assert_eq!(serde_json::to_vec(agent.metrics()).unwrap(), metrics);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_epsilon_monotone_and_bounded(
        start in 0.2f64..=1.0,
        end_frac in 0.0f64..=1.0,
        decay in 0.5f64..=1.0,
        steps in 1usize..40,
    ) {
        let end = start * end_frac;
        let mut agent = DQNAgent::new(DQNConfig {
            base: AgentConfig { batch_size: 2, buffer_size: 8, ..AgentConfig::default() },
            state_dim: 2,
            num_actions: 2,
            hidden_dims: vec![4],
            epsilon_start: start,
            epsilon_end: end,
            epsilon_decay: decay,
            seed: Some(9),
        }).unwrap();
        for i in 0..4u8 {
            let x = f32::from(i);
            agent.remember(arr1(&[x, -x]), usize::from(i % 2), x, arr1(&[-x, x]), i == 3);
        }

        let mut previous = agent.epsilon();
        for _ in 0..steps {
            agent.replay().unwrap();
            let eps = agent.epsilon();
            prop_assert!(eps <= previous);
            prop_assert!(eps >= end && eps <= start);
            previous = eps;
        }
    }
}

#[tokio::test]
async fn test_checkpoint_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("agent.json");

    let original = trained_agent().await;
    assert!(!original.metrics().losses.is_empty(), "training should have run replay steps");
    original.save(&path).await.unwrap();

    // different seed, so different initial weights
    let mut restored = DQNAgent::new(config(99)).unwrap();
    restored.load(&path).await.unwrap();

    assert_eq!(restored.epsilon().to_bits(), original.epsilon().to_bits());
    assert_eq!(restored.metrics(), original.metrics());
    assert_eq!(restored.policy().parameters(), original.policy().parameters());
    assert_eq!(restored.target().parameters(), original.target().parameters());

    let mut original = original;
    for fill in [-1.0, 0.0, 0.5, 3.0] {
        let s = state(fill);
        assert_eq!(
            restored.act(s.view(), false).unwrap(),
            original.act(s.view(), false).unwrap()
        );
        let a = restored.q_values(s.view()).unwrap();
        let b = original.q_values(s.view()).unwrap();
        assert!(a.iter().zip(&b).all(|(x, y)| x.to_bits() == y.to_bits()));
    }
}

#[tokio::test]
async fn test_load_failures_leave_agent_untouched() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wide.json");

    let mut agent = DQNAgent::new(config(5)).unwrap();
    let before = agent.policy().parameters();

    let missing = agent.load(&dir.path().join("nothing.json")).await.unwrap_err();
    assert!(matches!(missing, RLError::Checkpoint(CheckpointError::NotFound(_))));

    let wide = DQNAgent::new(DQNConfig {
        hidden_dims: vec![32, 32],
        ..config(5)
    })
    .unwrap();
    wide.save(&path).await.unwrap();
    let mismatch = agent.load(&path).await.unwrap_err();
    assert!(matches!(mismatch, RLError::Checkpoint(CheckpointError::ShapeMismatch(_))));

    tokio::fs::write(&path, b"{\"version\": 1}").await.unwrap();
    let partial = agent.load(&path).await.unwrap_err();
    assert!(matches!(partial, RLError::Checkpoint(CheckpointError::IncompatibleSchema(_))));

    assert_eq!(agent.policy().parameters(), before);
    assert_eq!(agent.epsilon().to_bits(), 1.0f64.to_bits());
}

#[tokio::test]
async fn test_load_rejects_epsilon_outside_agent_range() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("decayed.json");

    let mut decayed = DQNAgent::new(DQNConfig {
        epsilon_end: 0.0,
        epsilon_decay: 0.5,
        ..config(6)
    })
    .unwrap();
    for i in 0..8u8 {
        decayed.remember(state(f32::from(i)), 1, 1.0, state(0.0), i % 2 == 0);
    }
    for _ in 0..10 {
        decayed.replay().unwrap();
    }
    assert!(decayed.epsilon() < 0.01);
    decayed.save(&path).await.unwrap();

    // floor above the stored epsilon
    let mut floored = DQNAgent::new(DQNConfig {
        epsilon_end: 0.1,
        ..config(7)
    })
    .unwrap();
    let before = floored.policy().parameters();
    let err = floored.load(&path).await.unwrap_err();
    assert!(matches!(err, RLError::Checkpoint(CheckpointError::IncompatibleSchema(_))));
    assert_eq!(floored.policy().parameters(), before);
    assert_eq!(floored.epsilon().to_bits(), 1.0f64.to_bits());

    // ceiling below the stored epsilon
    let fresh = DQNAgent::new(config(8)).unwrap();
    fresh.save(&path).await.unwrap();
    let mut capped = DQNAgent::new(DQNConfig {
        epsilon_start: 0.5,
        ..config(9)
    })
    .unwrap();
    let err = capped.load(&path).await.unwrap_err();
    assert!(matches!(err, RLError::Checkpoint(CheckpointError::IncompatibleSchema(_))));

    // within range: resumes and keeps decaying from the stored value
    let mut resumed = DQNAgent::new(DQNConfig {
        epsilon_end: 0.0,
        ..config(10)
    })
    .unwrap();
    decayed.save(&path).await.unwrap();
    resumed.load(&path).await.unwrap();
    assert_eq!(resumed.epsilon().to_bits(), decayed.epsilon().to_bits());
    for i in 0..8u8 {
        resumed.remember(state(f32::from(i)), 0, 0.0, state(1.0), true);
    }
    resumed.replay().unwrap();
    assert!(resumed.epsilon() <= decayed.epsilon());
}

#[tokio::test]
async fn test_encoder_is_stable_on_wumpus_observations() {
    let mut env = small_world(7);
    let obs = env.reset().await.unwrap();

    let a = StateEncoder.encode(&obs).unwrap();
    let b = StateEncoder.encode(&obs).unwrap();
    assert!(a.iter().zip(&b).all(|(x, y)| x.to_bits() == y.to_bits()));

    let expected: usize = OBSERVATION_FIELDS
        .iter()
        .map(|key| obs.get(key).unwrap().len())
        .sum();
    assert_eq!(a.len(), expected);
    assert_eq!(a.len(), SMALL_STATE_DIM);
}
