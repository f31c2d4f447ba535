//! Structured observations and their flat feature encoding

use indexmap::IndexMap;
use ndarray::{Array, Array1, ArrayD, Dimension};
use serde::{Deserialize, Serialize};

use crate::{RLError, Result};

/// Observation fields consumed by [`StateEncoder`], in encoding order
pub const OBSERVATION_FIELDS: [&str; 7] = [
    "grid_size",
    "player_pos",
    "wumpus_positions",
    "pit_positions",
    "gold_position",
    "has_gold",
    "visited_cells",
];

/// Named numeric arrays describing one environment state
///
/// Field order is preserved for display and serialization only; encoding
/// always follows [`OBSERVATION_FIELDS`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    fields: IndexMap<String, ArrayD<f32>>,
}

impl Observation {
    /// Create an empty observation
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field
    pub fn insert<D: Dimension>(&mut self, key: impl Into<String>, value: Array<f32, D>) {
        self.fields.insert(key.into(), value.into_dyn());
    }

    /// Builder-style [`Observation::insert`]
    #[must_use]
    pub fn with<D: Dimension>(mut self, key: impl Into<String>, value: Array<f32, D>) -> Self {
        self.insert(key, value);
        self
    }

    /// Look up a field
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ArrayD<f32>> {
        self.fields.get(key)
    }

    /// Remove a field, returning it if present
    pub fn remove(&mut self, key: &str) -> Option<ArrayD<f32>> {
        self.fields.shift_remove(key)
    }

    /// Field names in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Number of fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the observation has no fields
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Flattens an [`Observation`] into the feature vector fed to the Q-function.
///
/// Each field is flattened in row-major order and the results are
/// concatenated in [`OBSERVATION_FIELDS`] order. Fields outside that list
/// are ignored. Encoding is a pure function of the observation.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateEncoder;

impl StateEncoder {
    /// Create a new encoder
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Encode an observation into a flat `f32` vector
    ///
    /// # Errors
    ///
    /// Returns [`RLError::MissingField`] naming the first required field
    /// that is absent.
    pub fn encode(&self, observation: &Observation) -> Result<Array1<f32>> {
        let len = self.encoded_len(observation)?;
        let mut features = Vec::with_capacity(len);
        for key in OBSERVATION_FIELDS {
            let value = Self::field(observation, key)?;
            features.extend(value.iter().copied());
        }
        Ok(Array1::from_vec(features))
    }

    /// Length of the vector [`StateEncoder::encode`] would produce
    ///
    /// # Errors
    ///
    /// Returns [`RLError::MissingField`] if a required field is absent.
    pub fn encoded_len(&self, observation: &Observation) -> Result<usize> {
        OBSERVATION_FIELDS
            .iter()
            .map(|key| Self::field(observation, key).map(ArrayD::len))
            .sum()
    }

    fn field<'a>(observation: &'a Observation, key: &str) -> Result<&'a ArrayD<f32>> {
        observation
            .get(key)
            .ok_or_else(|| RLError::MissingField(key.to_string()))
    }
}
