//! Multilayer perceptron Q-network
//!
//! Pure ndarray implementation of [`QFunctionApproximator`]: ReLU hidden
//! layers, a linear head with one output per action, hand-written
//! backpropagation and an Adam optimizer.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use wumpus_rl_core::value::ensure_dim;
use wumpus_rl_core::{
    OptimizerSnapshot, ParameterSnapshot, QFunctionApproximator, RLError, Result, MAX_GRAD_NORM,
};

/// Q-network configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QNetworkConfig {
    /// Input dimension (encoded state length)
    pub input_dim: usize,
    /// Hidden layer sizes
    pub hidden_dims: Vec<usize>,
    /// Output dimension (number of actions)
    pub output_dim: usize,
    /// Adam step size
    pub learning_rate: f64,
}

impl Default for QNetworkConfig {
    fn default() -> Self {
        Self {
            input_dim: 4,
            hidden_dims: vec![128, 128],
            output_dim: 2,
            learning_rate: 1e-3,
        }
    }
}

impl QNetworkConfig {
    /// Input, hidden and output sizes in order
    #[must_use]
    pub fn layer_sizes(&self) -> Vec<usize> {
        let mut sizes = Vec::with_capacity(self.hidden_dims.len() + 2);
        sizes.push(self.input_dim);
        sizes.extend_from_slice(&self.hidden_dims);
        sizes.push(self.output_dim);
        sizes
    }

    /// Total number of weights and biases
    #[must_use]
    pub fn num_parameters(&self) -> usize {
        self.layer_sizes()
            .windows(2)
            .map(|pair| pair[0] * pair[1] + pair[1])
            .sum()
    }
}

/// Adam optimizer over a flat parameter vector
#[derive(Debug, Clone)]
struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    step: u64,
    first_moment: Vec<f32>,
    second_moment: Vec<f32>,
}

impl Adam {
    fn new(learning_rate: f32, num_parameters: usize) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step: 0,
            first_moment: vec![0.0; num_parameters],
            second_moment: vec![0.0; num_parameters],
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn update(&mut self, params: &mut [f32], grads: &[f32]) {
        self.step += 1;
        let t = self.step.min(i32::MAX as u64) as i32;
        let bias1 = 1.0 - self.beta1.powi(t);
        let bias2 = 1.0 - self.beta2.powi(t);

        for (i, (p, &g)) in params.iter_mut().zip(grads).enumerate() {
            let m = &mut self.first_moment[i];
            let v = &mut self.second_moment[i];
            *m = self.beta1 * *m + (1.0 - self.beta1) * g;
            *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;

            let m_hat = *m / bias1;
            let v_hat = *v / bias2;
            *p -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }
    }

    fn snapshot(&self) -> OptimizerSnapshot {
        OptimizerSnapshot {
            learning_rate: self.learning_rate,
            beta1: self.beta1,
            beta2: self.beta2,
            step: self.step,
            first_moment: self.first_moment.clone(),
            second_moment: self.second_moment.clone(),
        }
    }

    fn restore(&mut self, snapshot: &OptimizerSnapshot) -> Result<()> {
        snapshot.validate()?;
        ensure_dim(self.first_moment.len(), snapshot.first_moment.len())?;
        self.learning_rate = snapshot.learning_rate;
        self.beta1 = snapshot.beta1;
        self.beta2 = snapshot.beta2;
        self.step = snapshot.step;
        self.first_moment.clone_from(&snapshot.first_moment);
        self.second_moment.clone_from(&snapshot.second_moment);
        Ok(())
    }
}

/// Feed-forward Q-network
#[derive(Debug, Clone)]
pub struct QNetwork {
    config: QNetworkConfig,
    /// Weights for each layer, shaped `(in, out)`
    weights: Vec<Array2<f32>>,
    /// Biases for each layer
    biases: Vec<Array1<f32>>,
    optimizer: Adam,
}

impl QNetwork {
    /// Create a network with weights drawn from `rng`
    ///
    /// # Errors
    ///
    /// [`RLError::Config`] if any layer size is zero or the learning rate
    /// is not positive.
    pub fn new<R: Rng + ?Sized>(config: QNetworkConfig, rng: &mut R) -> Result<Self> {
        let sizes = config.layer_sizes();
        if sizes.contains(&0) {
            return Err(RLError::Config(format!("layer sizes must be non-zero, got {sizes:?}")));
        }
        if !(config.learning_rate > 0.0) {
            return Err(RLError::Config("learning_rate must be positive".into()));
        }

        let mut weights = Vec::with_capacity(sizes.len() - 1);
        let mut biases = Vec::with_capacity(sizes.len() - 1);
        for pair in sizes.windows(2) {
            weights.push(Self::he_uniform(pair[0], pair[1], rng));
            biases.push(Array1::zeros(pair[1]));
        }

        #[allow(clippy::cast_possible_truncation)]
        let optimizer = Adam::new(config.learning_rate as f32, config.num_parameters());

        Ok(Self {
            config,
            weights,
            biases,
            optimizer,
        })
    }

    /// Network configuration
    #[must_use]
    pub fn config(&self) -> &QNetworkConfig {
        &self.config
    }

    /// Total number of trainable parameters
    #[must_use]
    pub fn num_parameters(&self) -> usize {
        self.config.num_parameters()
    }

    /// He-uniform initialization, suited to ReLU layers
    #[allow(clippy::cast_precision_loss)]
    fn he_uniform<R: Rng + ?Sized>(in_dim: usize, out_dim: usize, rng: &mut R) -> Array2<f32> {
        let limit = (6.0 / in_dim as f32).sqrt();
        let dist = Uniform::new_inclusive(-limit, limit);
        Array2::from_shape_fn((in_dim, out_dim), |_| dist.sample(rng))
    }

    /// Forward pass keeping every layer input for backpropagation.
    ///
    /// Returns the inputs of each layer (post-activation) and the output.
    fn forward_cached(&self, states: ArrayView2<f32>) -> (Vec<Array2<f32>>, Array2<f32>) {
        let last = self.weights.len() - 1;
        let mut inputs = Vec::with_capacity(self.weights.len());
        let mut hidden = states.to_owned();

        for (i, (w, b)) in self.weights.iter().zip(&self.biases).enumerate() {
            let mut z = hidden.dot(w) + b;
            if i < last {
                z.mapv_inplace(|v| v.max(0.0));
            }
            inputs.push(std::mem::replace(&mut hidden, z));
        }

        (inputs, hidden)
    }

    /// Flattened gradient of the loss, in [`ParameterSnapshot`] order
    fn backward(&self, inputs: &[Array2<f32>], output_grad: ArrayView2<f32>) -> Vec<f32> {
        let mut grad_w = Vec::with_capacity(self.weights.len());
        let mut grad_b = Vec::with_capacity(self.weights.len());
        let mut delta = output_grad.to_owned();

        for layer in (0..self.weights.len()).rev() {
            let input = &inputs[layer];
            grad_w.push(input.t().dot(&delta));
            grad_b.push(delta.sum_axis(Axis(0)));

            if layer > 0 {
                // ReLU passes gradient only where its output was positive
                let mask = input.mapv(|a| if a > 0.0 { 1.0 } else { 0.0 });
                delta = delta.dot(&self.weights[layer].t()) * &mask;
            }
        }
        grad_w.reverse();
        grad_b.reverse();

        let mut flat = Vec::with_capacity(self.num_parameters());
        for (w, b) in grad_w.iter().zip(&grad_b) {
            flat.extend(w.iter().copied());
            flat.extend(b.iter().copied());
        }
        flat
    }

    fn flat_parameters(&self) -> Vec<f32> {
        let mut flat = Vec::with_capacity(self.num_parameters());
        for (w, b) in self.weights.iter().zip(&self.biases) {
            flat.extend(w.iter().copied());
            flat.extend(b.iter().copied());
        }
        flat
    }

    fn set_flat_parameters(&mut self, values: &[f32]) -> Result<()> {
        ensure_dim(self.num_parameters(), values.len())?;

        let mut weights = Vec::with_capacity(self.weights.len());
        let mut biases = Vec::with_capacity(self.biases.len());
        let mut offset = 0;
        for w in &self.weights {
            let (rows, cols) = w.dim();
            let w_len = rows * cols;
            let w_new = Array2::from_shape_vec((rows, cols), values[offset..offset + w_len].to_vec())
                .map_err(|e| RLError::Other(e.into()))?;
            offset += w_len;
            weights.push(w_new);
            biases.push(Array1::from_vec(values[offset..offset + cols].to_vec()));
            offset += cols;
        }

        self.weights = weights;
        self.biases = biases;
        Ok(())
    }
}

impl QFunctionApproximator for QNetwork {
    fn input_dim(&self) -> usize {
        self.config.input_dim
    }

    fn num_actions(&self) -> usize {
        self.config.output_dim
    }

    fn forward(&self, state: ArrayView1<f32>) -> Result<Array1<f32>> {
        let values = self.forward_batch(state.insert_axis(Axis(0)))?;
        Ok(values.row(0).to_owned())
    }

    fn forward_batch(&self, states: ArrayView2<f32>) -> Result<Array2<f32>> {
        ensure_dim(self.config.input_dim, states.ncols())?;
        Ok(self.forward_cached(states).1)
    }

    fn parameters(&self) -> ParameterSnapshot {
        ParameterSnapshot {
            layer_sizes: self.config.layer_sizes(),
            values: self.flat_parameters(),
        }
    }

    fn load_parameters(&mut self, snapshot: &ParameterSnapshot) -> Result<()> {
        let sizes = self.config.layer_sizes();
        if snapshot.layer_sizes != sizes {
            return Err(RLError::Config(format!(
                "parameter snapshot for layers {:?} does not fit network {:?}",
                snapshot.layer_sizes, sizes
            )));
        }
        self.set_flat_parameters(&snapshot.values)
    }

    fn optimizer_state(&self) -> OptimizerSnapshot {
        self.optimizer.snapshot()
    }

    fn load_optimizer_state(&mut self, snapshot: &OptimizerSnapshot) -> Result<()> {
        self.optimizer.restore(snapshot)
    }

    fn gradient_step(&mut self, states: ArrayView2<f32>, output_grad: ArrayView2<f32>) -> Result<f32> {
        ensure_dim(self.config.input_dim, states.ncols())?;
        ensure_dim(self.config.output_dim, output_grad.ncols())?;
        ensure_dim(states.nrows(), output_grad.nrows())?;

        let (inputs, _) = self.forward_cached(states);
        let mut grads = self.backward(&inputs, output_grad);

        let norm = grads.iter().map(|g| g * g).sum::<f32>().sqrt();
        if !norm.is_finite() {
            return Err(RLError::NonFiniteLoss(format!("gradient norm is {norm}")));
        }
        if norm > MAX_GRAD_NORM {
            let scale = MAX_GRAD_NORM / (norm + 1e-6);
            grads.iter_mut().for_each(|g| *g *= scale);
        }

        let mut params = self.flat_parameters();
        self.optimizer.update(&mut params, &grads);
        self.set_flat_parameters(&params)?;

        tracing::trace!(grad_norm = norm, step = self.optimizer.step, "applied gradient step");
        Ok(norm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{arr1, arr2};
    use rand::{rngs::StdRng, SeedableRng};

    fn small_config() -> QNetworkConfig {
        QNetworkConfig {
            input_dim: 3,
            hidden_dims: vec![8],
            output_dim: 2,
            learning_rate: 1e-2,
        }
    }

    fn network(seed: u64) -> QNetwork {
        QNetwork::new(small_config(), &mut StdRng::seed_from_u64(seed)).unwrap()
    }

    #[test]
    fn test_forward_shape_and_determinism() {
        let net = network(1);
        let state = arr1(&[0.1, -0.2, 0.3]);

        let first = net.forward(state.view()).unwrap();
        let second = net.forward(state.view()).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_forward_rejects_wrong_length() {
        let net = network(1);
        assert!(matches!(
            net.forward(arr1(&[1.0, 2.0]).view()),
            Err(RLError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_batch_matches_single() {
        let net = network(2);
        let states = arr2(&[[0.1, 0.2, 0.3], [1.0, -1.0, 0.5]]);
        let batch = net.forward_batch(states.view()).unwrap();

        for (row, state) in states.rows().into_iter().enumerate() {
            let single = net.forward(state).unwrap();
            for a in 0..2 {
                assert_relative_eq!(batch[[row, a]], single[a], epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_parameter_round_trip() {
        let source = network(3);
        let mut target = network(4);
        let state = arr1(&[0.5, 0.5, -0.5]);
        assert_ne!(source.forward(state.view()).unwrap(), target.forward(state.view()).unwrap());

        target.load_parameters(&source.parameters()).unwrap();
        assert_eq!(source.parameters(), target.parameters());
        assert_eq!(source.forward(state.view()).unwrap(), target.forward(state.view()).unwrap());
    }

    #[test]
    fn test_load_rejects_other_architecture() {
        let mut net = network(5);
        let other = QNetwork::new(
            QNetworkConfig {
                hidden_dims: vec![4],
                ..small_config()
            },
            &mut StdRng::seed_from_u64(5),
        )
        .unwrap();
        let before = net.parameters();

        assert!(net.load_parameters(&other.parameters()).is_err());
        assert_eq!(net.parameters(), before);
    }

    #[test]
    fn test_backward_matches_finite_difference() {
        let mut net = network(6);
        let states = arr2(&[[0.3, -0.7, 0.2], [0.9, 0.1, -0.4]]);
        // loss = sum of output column 1
        let output_grad = arr2(&[[0.0, 1.0], [0.0, 1.0]]);
        let (inputs, _) = net.forward_cached(states.view());
        let analytic = net.backward(&inputs, output_grad.view());

        let loss = |n: &QNetwork| n.forward_batch(states.view()).unwrap().column(1).sum();
        let base = net.flat_parameters();
        let h = 1e-2;
        for idx in [0, 5, base.len() - 3, base.len() - 1] {
            let mut plus = base.clone();
            plus[idx] += h;
            net.set_flat_parameters(&plus).unwrap();
            let up = loss(&net);
            let mut minus = base.clone();
            minus[idx] -= h;
            net.set_flat_parameters(&minus).unwrap();
            let down = loss(&net);
            net.set_flat_parameters(&base).unwrap();

            let numeric = (up - down) / (2.0 * h);
            assert_relative_eq!(analytic[idx], numeric, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_gradient_step_reduces_loss() {
        let mut net = network(7);
        let states = arr2(&[[0.2, 0.4, 0.6]]);
        let target = 5.0;

        let error = |n: &QNetwork| n.forward_batch(states.view()).unwrap()[[0, 0]] - target;
        let before = error(&net).abs();
        for _ in 0..50 {
            let e = error(&net);
            let grad = arr2(&[[2.0 * e, 0.0]]);
            net.gradient_step(states.view(), grad.view()).unwrap();
        }
        assert!(error(&net).abs() < before);
        assert_eq!(net.optimizer_state().step, 50);
    }

    #[test]
    fn test_gradient_step_clips_large_gradients() {
        let mut clipped = network(8);
        let states = arr2(&[[1.0, 1.0, 1.0]]);
        let before = clipped.flat_parameters();

        let norm = clipped
            .gradient_step(states.view(), arr2(&[[1e6, -1e6]]).view())
            .unwrap();
        assert!(norm > MAX_GRAD_NORM);

        // first moment after one step is (1 - beta1) * clipped gradient
        let moment = clipped.optimizer_state().first_moment;
        let moment_norm = moment.iter().map(|m| m * m).sum::<f32>().sqrt();
        assert_relative_eq!(moment_norm, 0.1 * MAX_GRAD_NORM, epsilon = 1e-4);

        let after = clipped.flat_parameters();
        for (a, b) in after.iter().zip(&before) {
            assert!((a - b).abs() <= 1e-2 + 1e-6);
        }
    }

    #[test]
    fn test_non_finite_gradient_leaves_parameters() {
        let mut net = network(9);
        let before = net.parameters();
        let states = arr2(&[[1.0, 0.0, 0.0]]);

        let result = net.gradient_step(states.view(), arr2(&[[f32::NAN, 0.0]]).view());
        assert!(matches!(result, Err(RLError::NonFiniteLoss(_))));
        assert_eq!(net.parameters(), before);
        assert_eq!(net.optimizer_state().step, 0);
    }

    #[test]
    fn test_optimizer_state_round_trip() {
        let mut trained = network(10);
        let states = arr2(&[[0.1, 0.2, 0.3]]);
        trained.gradient_step(states.view(), arr2(&[[0.5, -0.5]]).view()).unwrap();

        let mut fresh = network(10);
        fresh.load_optimizer_state(&trained.optimizer_state()).unwrap();
        assert_eq!(fresh.optimizer_state(), trained.optimizer_state());

        let bad = OptimizerSnapshot {
            step: 1,
            first_moment: vec![0.0; 3],
            second_moment: vec![0.0; 3],
            ..OptimizerSnapshot::default()
        };
        assert!(fresh.load_optimizer_state(&bad).is_err());
    }

    #[test]
    fn test_restored_optimizer_keeps_its_step_size() {
        let mut slow = QNetwork::new(
            QNetworkConfig {
                learning_rate: 1e-4,
                ..small_config()
            },
            &mut StdRng::seed_from_u64(11),
        )
        .unwrap();
        let states = arr2(&[[0.1, 0.2, 0.3]]);
        slow.gradient_step(states.view(), arr2(&[[0.5, -0.5]]).view()).unwrap();

        // resumed under a different configured rate
        let mut resumed = network(11);
        resumed.load_parameters(&slow.parameters()).unwrap();
        resumed.load_optimizer_state(&slow.optimizer_state()).unwrap();
        assert_relative_eq!(resumed.optimizer_state().learning_rate, 1e-4);

        let grad = arr2(&[[1.0, 0.0]]);
        slow.gradient_step(states.view(), grad.view()).unwrap();
        resumed.gradient_step(states.view(), grad.view()).unwrap();
        assert_eq!(resumed.parameters(), slow.parameters());

        let before = resumed.optimizer_state();
        let invalid = OptimizerSnapshot {
            learning_rate: -1.0,
            ..before.clone()
        };
        assert!(resumed.load_optimizer_state(&invalid).is_err());
        assert_eq!(resumed.optimizer_state(), before);
    }
}
