//! Deep Q-Network (DQN) agent implementation
//!
//! The agent owns two independent approximators: the *policy* network,
//! trained on every [`DQNAgent::replay`], and the *target* network, which
//! only changes on [`DQNAgent::update_target_network`]. Exploration is
//! epsilon-greedy with a multiplicative decay applied after each
//! successful training step.

use ndarray::{Array1, Array2, ArrayView1};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;

use wumpus_rl_core::value::ensure_dim;
use wumpus_rl_core::{
    argmax, AgentConfig, CheckpointError, DiscreteSpace, QFunctionApproximator, RLError, Result,
    Transition,
};

use crate::buffer::ReplayBuffer;
use crate::checkpoint::Checkpoint;
use crate::metrics::TrainingMetrics;
use crate::network::{QNetwork, QNetworkConfig};
use crate::utils::{mean_squared_error, ExponentialSchedule};

/// DQN-specific configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DQNConfig {
    /// Base agent configuration
    #[serde(flatten)]
    pub base: AgentConfig,
    /// Length of encoded state vectors
    pub state_dim: usize,
    /// Number of discrete actions
    pub num_actions: usize,
    /// Hidden layer sizes of the default Q-network
    pub hidden_dims: Vec<usize>,
    /// Initial exploration rate
    pub epsilon_start: f64,
    /// Exploration floor
    pub epsilon_end: f64,
    /// Multiplicative epsilon decay per training step
    pub epsilon_decay: f64,
    /// Seed for exploration, sampling and weight init; entropy when absent
    pub seed: Option<u64>,
}

impl Default for DQNConfig {
    /// Dimensions match the default 10x10 Wumpus world
    fn default() -> Self {
        Self {
            base: AgentConfig::default(),
            state_dim: 128,
            num_actions: 5,
            hidden_dims: vec![128, 128],
            epsilon_start: 1.0,
            epsilon_end: 0.01,
            epsilon_decay: 0.995,
            seed: None,
        }
    }
}

impl DQNConfig {
    /// Check every hyperparameter
    ///
    /// # Errors
    ///
    /// [`RLError::Config`] describing the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.base.validate()?;
        if self.state_dim == 0 || self.num_actions == 0 {
            return Err(RLError::Config(format!(
                "state_dim and num_actions must be non-zero, got {} and {}",
                self.state_dim, self.num_actions
            )));
        }
        if !(0.0..=1.0).contains(&self.epsilon_end)
            || !(0.0..=1.0).contains(&self.epsilon_start)
            || self.epsilon_end > self.epsilon_start
        {
            return Err(RLError::Config(format!(
                "need 0 <= epsilon_end <= epsilon_start <= 1, got {} and {}",
                self.epsilon_end, self.epsilon_start
            )));
        }
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0) {
            return Err(RLError::Config(format!(
                "epsilon_decay must be in (0, 1], got {}",
                self.epsilon_decay
            )));
        }
        Ok(())
    }

    /// Deserialize from JSON, rejecting keys this configuration does not have.
    ///
    /// Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// [`RLError::Config`] naming the first unknown key, or
    /// [`RLError::Serialization`] for values of the wrong type.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let known = serde_json::to_value(Self::default())?;
        if let (Some(given), Some(known)) = (value.as_object(), known.as_object()) {
            if let Some(key) = given.keys().find(|key| !known.contains_key(*key)) {
                return Err(RLError::Config(format!("unknown agent setting `{key}`")));
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Configuration of the default Q-network
    #[must_use]
    pub fn network_config(&self) -> QNetworkConfig {
        QNetworkConfig {
            input_dim: self.state_dim,
            hidden_dims: self.hidden_dims.clone(),
            output_dim: self.num_actions,
            learning_rate: self.base.learning_rate,
        }
    }

    fn schedule(&self) -> ExponentialSchedule {
        ExponentialSchedule::new(self.epsilon_start, self.epsilon_end, self.epsilon_decay)
    }
}

/// What a call to [`DQNAgent::replay`] did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReplayOutcome {
    /// Not enough stored transitions; nothing changed
    Skipped {
        /// Transitions currently stored
        buffered: usize,
        /// Transitions needed for one batch
        required: usize,
    },
    /// One gradient update was applied
    Trained {
        /// Mean squared TD error of the batch
        loss: f64,
        /// Gradient norm before clipping
        grad_norm: f32,
        /// Exploration rate after decay
        epsilon: f64,
    },
}

impl ReplayOutcome {
    /// Loss of the step, if one ran
    #[must_use]
    pub fn loss(&self) -> Option<f64> {
        match self {
            Self::Trained { loss, .. } => Some(*loss),
            Self::Skipped { .. } => None,
        }
    }
}

/// DQN agent with experience replay and a hard-synced target network
pub struct DQNAgent<Q = QNetwork> {
    config: DQNConfig,
    policy: Q,
    target: Q,
    buffer: ReplayBuffer,
    action_space: DiscreteSpace,
    schedule: ExponentialSchedule,
    epsilon: f64,
    metrics: TrainingMetrics,
    train_steps: u64,
    rng: StdRng,
}

impl DQNAgent<QNetwork> {
    /// Create an agent with freshly initialized [`QNetwork`]s
    ///
    /// # Errors
    ///
    /// [`RLError::Config`] if the configuration is invalid.
    pub fn new(config: DQNConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = seeded_rng(config.seed);
        let policy = QNetwork::new(config.network_config(), &mut rng)?;
        let target = QNetwork::new(config.network_config(), &mut rng)?;
        Self::build(config, policy, target, rng)
    }
}

impl<Q: QFunctionApproximator> DQNAgent<Q> {
    /// Create an agent around caller-supplied approximators.
    ///
    /// The target starts as a copy of the policy's parameters.
    ///
    /// # Errors
    ///
    /// [`RLError::Config`] for invalid settings, or a dimension error if
    /// the approximators disagree with `config`.
    pub fn with_approximators(config: DQNConfig, policy: Q, target: Q) -> Result<Self> {
        config.validate()?;
        let rng = seeded_rng(config.seed);
        Self::build(config, policy, target, rng)
    }

    fn build(config: DQNConfig, policy: Q, mut target: Q, rng: StdRng) -> Result<Self> {
        ensure_dim(config.state_dim, policy.input_dim())?;
        ensure_dim(config.num_actions, policy.num_actions())?;
        ensure_dim(config.state_dim, target.input_dim())?;
        ensure_dim(config.num_actions, target.num_actions())?;
        target.load_parameters(&policy.parameters())?;

        Ok(Self {
            buffer: ReplayBuffer::new(config.base.buffer_size),
            action_space: DiscreteSpace::new(config.num_actions),
            schedule: config.schedule(),
            epsilon: config.epsilon_start,
            metrics: TrainingMetrics::default(),
            train_steps: 0,
            policy,
            target,
            rng,
            config,
        })
    }

    /// Pick an action for an encoded state.
    ///
    /// With `training` set, a uniformly random action is returned with
    /// probability epsilon. Otherwise the action with the highest policy
    /// value is returned; this path uses no randomness.
    ///
    /// # Errors
    ///
    /// [`RLError::DimensionMismatch`] if `state` has the wrong length.
    pub fn act(&mut self, state: ArrayView1<f32>, training: bool) -> Result<usize> {
        ensure_dim(self.config.state_dim, state.len())?;

        if training && self.rng.gen::<f64>() < self.epsilon {
            return Ok(self.action_space.sample(&mut self.rng).index());
        }

        self.greedy_action(state)
    }

    /// Action with the highest policy value
    ///
    /// # Errors
    ///
    /// Propagates approximator errors.
    pub fn greedy_action(&self, state: ArrayView1<f32>) -> Result<usize> {
        let q_values = self.policy.forward(state)?;
        argmax(q_values.view())
            .ok_or_else(|| RLError::InvalidAction("policy produced no action values".into()))
    }

    /// Policy value estimates for an encoded state
    ///
    /// # Errors
    ///
    /// Propagates approximator errors.
    pub fn q_values(&self, state: ArrayView1<f32>) -> Result<Array1<f32>> {
        self.policy.forward(state)
    }

    /// Store a transition in the replay buffer
    pub fn remember(
        &mut self,
        state: Array1<f32>,
        action: usize,
        reward: f32,
        next_state: Array1<f32>,
        done: bool,
    ) {
        self.buffer
            .push(Transition::new(state, action, reward, next_state, done));
    }

    /// Run one training step on a sampled batch.
    ///
    /// Does nothing when fewer than `batch_size` transitions are stored.
    /// Otherwise samples a batch, regresses the policy's value of each
    /// taken action toward `r + (1 - done) * gamma * max_a' Q_target(s', a')`,
    /// applies one clipped gradient update, records the loss and decays
    /// epsilon.
    ///
    /// # Errors
    ///
    /// Any failure inside the step is logged and returned. The loss
    /// history, epsilon and parameters are left as they were, so the
    /// caller may keep training; see [`RLError::is_recoverable`].
    pub fn replay(&mut self) -> Result<ReplayOutcome> {
        let required = self.config.base.batch_size;
        if self.buffer.len() < required {
            return Ok(ReplayOutcome::Skipped {
                buffered: self.buffer.len(),
                required,
            });
        }

        match self.train_on_batch(required) {
            Ok((loss, grad_norm)) => {
                self.metrics.losses.push(loss);
                self.epsilon = self.schedule.next(self.epsilon);
                self.train_steps += 1;
                tracing::debug!(
                    step = self.train_steps,
                    loss,
                    grad_norm,
                    epsilon = self.epsilon,
                    "replay step"
                );
                Ok(ReplayOutcome::Trained {
                    loss,
                    grad_norm,
                    epsilon: self.epsilon,
                })
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    recoverable = err.is_recoverable(),
                    "replay step failed"
                );
                Err(err)
            }
        }
    }

    /// Sample, compute TD targets and update the policy.
    ///
    /// Mutates nothing but the RNG and (as its last action) the policy.
    fn train_on_batch(&mut self, batch_size: usize) -> Result<(f64, f32)> {
        let dim = self.config.state_dim;
        let num_actions = self.config.num_actions;

        let mut states = Array2::<f32>::zeros((batch_size, dim));
        let mut next_states = Array2::<f32>::zeros((batch_size, dim));
        let mut actions = Vec::with_capacity(batch_size);
        let mut rewards = Vec::with_capacity(batch_size);
        let mut continuations = Vec::with_capacity(batch_size);

        for (i, transition) in self
            .buffer
            .sample(batch_size, &mut self.rng)?
            .into_iter()
            .enumerate()
        {
            ensure_dim(dim, transition.state().len())?;
            ensure_dim(dim, transition.next_state().len())?;
            if transition.action() >= num_actions {
                return Err(RLError::InvalidAction(format!(
                    "stored action {} outside 0..{num_actions}",
                    transition.action()
                )));
            }
            states.row_mut(i).assign(transition.state());
            next_states.row_mut(i).assign(transition.next_state());
            actions.push(transition.action());
            rewards.push(transition.reward());
            continuations.push(transition.continuation());
        }

        let current = self.policy.forward_batch(states.view())?;
        // Target values are constants: the target network is only read
        let next = self.target.forward_batch(next_states.view())?;

        #[allow(clippy::cast_possible_truncation)]
        let gamma = self.config.base.gamma as f32;
        let mut predicted = Vec::with_capacity(batch_size);
        let mut targets = Vec::with_capacity(batch_size);
        for i in 0..batch_size {
            let next_value = next.row(i).fold(f32::NEG_INFINITY, |a, &b| a.max(b));
            predicted.push(current[[i, actions[i]]]);
            targets.push(rewards[i] + continuations[i] * gamma * next_value);
        }

        let loss = mean_squared_error(&predicted, &targets);
        if !loss.is_finite() {
            return Err(RLError::NonFiniteLoss(format!("batch loss is {loss}")));
        }

        // d(mean (q - y)^2) / dq
        #[allow(clippy::cast_precision_loss)]
        let scale = 2.0 / batch_size as f32;
        let mut output_grad = Array2::<f32>::zeros((batch_size, num_actions));
        for i in 0..batch_size {
            output_grad[[i, actions[i]]] = scale * (predicted[i] - targets[i]);
        }

        let grad_norm = self.policy.gradient_step(states.view(), output_grad.view())?;
        Ok((f64::from(loss), grad_norm))
    }

    /// Copy every policy parameter into the target network
    ///
    /// # Errors
    ///
    /// Only if the two approximators have diverging architectures, which
    /// construction rules out for the built-in network.
    pub fn update_target_network(&mut self) -> Result<()> {
        self.target.load_parameters(&self.policy.parameters())?;
        tracing::info!(train_steps = self.train_steps, "synced target network");
        Ok(())
    }

    /// Append one finished episode to the metric histories
    pub fn record_episode(&mut self, reward: f64, length: usize) {
        self.metrics.rewards.push(reward);
        self.metrics.episode_lengths.push(length);
    }

    /// Persist networks, optimizer state, epsilon and metrics as one file.
    ///
    /// # Errors
    ///
    /// IO or serialization failures.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let checkpoint = Checkpoint::new(
            self.policy.parameters(),
            self.target.parameters(),
            self.policy.optimizer_state(),
            self.epsilon,
            self.metrics.clone(),
        );
        checkpoint.write(path).await?;
        tracing::info!(
            path = %path.display(),
            epsilon = self.epsilon,
            episodes = self.metrics.rewards.len(),
            "saved checkpoint"
        );
        Ok(())
    }

    /// Restore everything written by [`DQNAgent::save`].
    ///
    /// The checkpoint is fully validated before the agent is touched, so
    /// a failed load leaves the agent unchanged.
    ///
    /// # Errors
    ///
    /// [`RLError::Checkpoint`] when the file is missing, malformed, from
    /// another schema version, shaped for different networks, or holds an
    /// epsilon outside `[epsilon_end, epsilon_start]`.
    pub async fn load(&mut self, path: &Path) -> Result<()> {
        let checkpoint = Checkpoint::read(path).await?;
        self.restore(checkpoint)?;
        tracing::info!(
            path = %path.display(),
            epsilon = self.epsilon,
            episodes = self.metrics.rewards.len(),
            "loaded checkpoint"
        );
        Ok(())
    }

    fn restore(&mut self, checkpoint: Checkpoint) -> Result<()> {
        let expected = self.policy.parameters();
        let expected_opt = self.policy.optimizer_state();
        for (name, params) in [
            ("policy_params", &checkpoint.policy_params),
            ("target_params", &checkpoint.target_params),
        ] {
            if params.layer_sizes != expected.layer_sizes || params.len() != expected.len() {
                return Err(CheckpointError::ShapeMismatch(format!(
                    "{name} has layers {:?} ({} values), agent expects {:?} ({} values)",
                    params.layer_sizes,
                    params.len(),
                    expected.layer_sizes,
                    expected.len()
                ))
                .into());
            }
        }
        let opt = &checkpoint.optimizer_state;
        if opt.first_moment.len() != expected_opt.first_moment.len()
            || opt.second_moment.len() != expected_opt.second_moment.len()
        {
            return Err(CheckpointError::ShapeMismatch(format!(
                "optimizer_state holds {} moments, agent expects {}",
                opt.first_moment.len(),
                expected_opt.first_moment.len()
            ))
            .into());
        }
        opt.validate()
            .map_err(|e| CheckpointError::Malformed(format!("optimizer_state: {e}")))?;
        if !(0.0..=1.0).contains(&checkpoint.epsilon) {
            return Err(CheckpointError::Malformed(format!(
                "epsilon {} outside [0, 1]",
                checkpoint.epsilon
            ))
            .into());
        }
        // decay only moves epsilon down toward epsilon_end, never back up
        let (low, high) = (self.config.epsilon_end, self.config.epsilon_start);
        if !(low..=high).contains(&checkpoint.epsilon) {
            return Err(CheckpointError::IncompatibleSchema(format!(
                "epsilon {} outside this agent's range [{low}, {high}]",
                checkpoint.epsilon
            ))
            .into());
        }
        let configured_rate = self.config.base.learning_rate;
        if (f64::from(opt.learning_rate) - configured_rate).abs() > configured_rate * 1e-6 {
            tracing::warn!(
                checkpoint = opt.learning_rate,
                configured = configured_rate,
                "resuming with the checkpoint's learning rate"
            );
        }

        self.policy.load_parameters(&checkpoint.policy_params)?;
        self.target.load_parameters(&checkpoint.target_params)?;
        self.policy.load_optimizer_state(&checkpoint.optimizer_state)?;
        self.epsilon = checkpoint.epsilon;
        self.metrics = checkpoint.metrics;
        Ok(())
    }

    /// Current exploration rate
    #[must_use]
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Loss, reward and episode-length histories
    #[must_use]
    pub fn metrics(&self) -> &TrainingMetrics {
        &self.metrics
    }

    /// Replay buffer
    #[must_use]
    pub fn buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    /// Agent configuration
    #[must_use]
    pub fn config(&self) -> &DQNConfig {
        &self.config
    }

    /// Action space the agent chooses from
    #[must_use]
    pub fn action_space(&self) -> DiscreteSpace {
        self.action_space
    }

    /// Number of successful replay steps since construction
    #[must_use]
    pub fn train_steps(&self) -> u64 {
        self.train_steps
    }

    /// The trained network
    #[must_use]
    pub fn policy(&self) -> &Q {
        &self.policy
    }

    /// The frozen network used for TD targets
    #[must_use]
    pub fn target(&self) -> &Q {
        &self.target
    }
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
