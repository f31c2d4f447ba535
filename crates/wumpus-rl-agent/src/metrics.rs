//! Training metric histories and summaries

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Distribution, Max, Min};

/// Append-only diagnostics recorded by the agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingMetrics {
    /// Loss of every successful replay step
    pub losses: Vec<f64>,
    /// Total reward of every recorded episode
    pub rewards: Vec<f64>,
    /// Step count of every recorded episode
    pub episode_lengths: Vec<usize>,
}

impl TrainingMetrics {
    /// Summary of the last `window` episode rewards (all when `None`)
    #[must_use]
    pub fn reward_summary(&self, window: Option<usize>) -> Option<MetricsSummary> {
        MetricsSummary::of(tail(&self.rewards, window))
    }

    /// Summary of the last `window` losses (all when `None`)
    #[must_use]
    pub fn loss_summary(&self, window: Option<usize>) -> Option<MetricsSummary> {
        MetricsSummary::of(tail(&self.losses, window))
    }

    /// Mean length of the last `window` episodes
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean_episode_length(&self, window: Option<usize>) -> Option<f64> {
        let lengths = tail(&self.episode_lengths, window);
        if lengths.is_empty() {
            return None;
        }
        Some(lengths.iter().sum::<usize>() as f64 / lengths.len() as f64)
    }
}

fn tail<T>(values: &[T], window: Option<usize>) -> &[T] {
    match window {
        Some(n) if n < values.len() => &values[values.len() - n..],
        _ => values,
    }
}

/// Descriptive statistics over a series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    /// Number of samples
    pub count: usize,
    /// Arithmetic mean
    pub mean: f64,
    /// Sample standard deviation (0 for a single sample)
    pub std_dev: f64,
    /// Smallest value
    pub min: f64,
    /// Largest value
    pub max: f64,
}

impl MetricsSummary {
    /// Summarize `values`, `None` when empty
    #[must_use]
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let data = Data::new(values.to_vec());
        Some(Self {
            count: values.len(),
            mean: data.mean().unwrap_or(f64::NAN),
            std_dev: if values.len() > 1 {
                data.std_dev().unwrap_or(0.0)
            } else {
                0.0
            },
            min: data.min(),
            max: data.max(),
        })
    }
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "n={} mean={:.3} std={:.3} min={:.3} max={:.3}",
            self.count, self.mean, self.std_dev, self.min, self.max
        )
    }
}
