//! Discrete actions and action spaces

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Index of a discrete action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DiscreteAction(pub usize);

impl DiscreteAction {
    /// The raw action index
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl From<usize> for DiscreteAction {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

/// Discrete action space `{0, .., n - 1}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscreteSpace {
    /// Number of discrete actions
    pub n: usize,
}

impl DiscreteSpace {
    /// Create a new discrete action space
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self { n }
    }

    /// Sample an action uniformly using the supplied random source
    ///
    /// # Panics
    ///
    /// Panics if the space is empty.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> DiscreteAction {
        DiscreteAction(rng.gen_range(0..self.n))
    }

    /// Check if an action is valid within this space
    #[must_use]
    pub fn contains(&self, action: DiscreteAction) -> bool {
        action.0 < self.n
    }

    /// Number of actions
    #[must_use]
    pub fn len(&self) -> usize {
        self.n
    }

    /// Whether the space has no actions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_sample_stays_in_space() {
        let space = DiscreteSpace::new(5);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            assert!(space.contains(space.sample(&mut rng)));
        }
        assert!(!space.contains(DiscreteAction(5)));
    }

    #[test]
    fn test_sample_is_reproducible() {
        let space = DiscreteSpace::new(4);
        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..16).map(|_| space.sample(&mut rng).index()).collect::<Vec<_>>()
        };
        assert_eq!(draw(11), draw(11));
    }
}
