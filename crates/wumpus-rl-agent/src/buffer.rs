//! Experience replay buffer

use rand::Rng;
use std::collections::VecDeque;

use wumpus_rl_core::{RLError, Result, Transition};

/// Fixed-capacity FIFO ring of transitions with uniform sampling
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    /// Buffer storage, oldest first
    buffer: VecDeque<Transition>,
    /// Maximum capacity
    capacity: usize,
}

impl ReplayBuffer {
    /// Create a new replay buffer
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a transition, evicting the oldest one when full
    pub fn push(&mut self, transition: Transition) {
        if self.capacity == 0 {
            return;
        }
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(transition);
    }

    /// Draw `batch_size` distinct transitions uniformly at random.
    ///
    /// Sampling is without replacement within one call; separate calls
    /// are independent.
    ///
    /// # Errors
    ///
    /// [`RLError::InsufficientData`] if fewer than `batch_size`
    /// transitions are stored.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<Vec<&Transition>> {
        if self.buffer.len() < batch_size {
            return Err(RLError::InsufficientData {
                available: self.buffer.len(),
                requested: batch_size,
            });
        }

        let batch = rand::seq::index::sample(rng, self.buffer.len(), batch_size)
            .into_iter()
            .map(|i| &self.buffer[i])
            .collect();

        Ok(batch)
    }

    /// Stored transitions, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.buffer.iter()
    }

    /// Get the current size of the buffer
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Maximum number of transitions kept
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the next push will evict
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.capacity
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
