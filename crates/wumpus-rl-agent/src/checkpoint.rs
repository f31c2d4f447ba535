//! On-disk agent checkpoints
//!
//! A checkpoint is one JSON document holding both networks, the optimizer
//! moments, epsilon and the metric histories. Floats are written with
//! shortest round-trip formatting, so a restored agent is bit-identical
//! to the saved one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use wumpus_rl_core::{CheckpointError, OptimizerSnapshot, ParameterSnapshot, Result};

use crate::metrics::TrainingMetrics;

/// Schema version written by this crate
pub const CHECKPOINT_VERSION: u32 = 1;

/// Serialized agent state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Checkpoint {
    /// Schema version, always [`CHECKPOINT_VERSION`] when written
    pub version: u32,
    /// Time the checkpoint was taken
    pub saved_at: DateTime<Utc>,
    /// Policy network parameters
    pub policy_params: ParameterSnapshot,
    /// Target network parameters
    pub target_params: ParameterSnapshot,
    /// Policy optimizer moments
    pub optimizer_state: OptimizerSnapshot,
    /// Exploration rate
    pub epsilon: f64,
    /// Loss, reward and episode-length histories
    pub metrics: TrainingMetrics,
}

impl Checkpoint {
    /// Build a checkpoint stamped with the current time
    #[must_use]
    pub fn new(
        policy_params: ParameterSnapshot,
        target_params: ParameterSnapshot,
        optimizer_state: OptimizerSnapshot,
        epsilon: f64,
        metrics: TrainingMetrics,
    ) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            saved_at: Utc::now(),
            policy_params,
            target_params,
            optimizer_state,
            epsilon,
            metrics,
        }
    }

    /// Write to `path`, replacing any existing file.
    ///
    /// The document goes to a sibling temporary file first and is then
    /// renamed over `path`, so readers never observe a partial write.
    ///
    /// # Errors
    ///
    /// IO or serialization failures.
    pub async fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec(self)?;
        let tmp = temp_path(path);
        tokio::fs::write(&tmp, json).await?;
        if let Err(err) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        Ok(())
    }

    /// Read and parse a checkpoint.
    ///
    /// # Errors
    ///
    /// - [`CheckpointError::NotFound`] if `path` does not exist
    /// - [`CheckpointError::Malformed`] if the file is not a JSON object
    /// - [`CheckpointError::IncompatibleSchema`] for another version, or
    ///   missing and unknown fields
    pub async fn read(path: &Path) -> Result<Self> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(CheckpointError::NotFound(path.display().to_string()).into());
            }
            Err(err) => return Err(err.into()),
        };
        Self::parse(&text)
    }

    /// Parse a checkpoint document
    ///
    /// # Errors
    ///
    /// As for [`Checkpoint::read`], minus `NotFound`.
    pub fn parse(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| CheckpointError::Malformed(e.to_string()))?;
        let Some(object) = value.as_object() else {
            return Err(CheckpointError::Malformed("top level is not an object".into()).into());
        };

        match object.get("version").and_then(serde_json::Value::as_u64) {
            Some(v) if v == u64::from(CHECKPOINT_VERSION) => {}
            Some(v) => {
                return Err(CheckpointError::IncompatibleSchema(format!(
                    "version {v}, expected {CHECKPOINT_VERSION}"
                ))
                .into());
            }
            None => {
                return Err(CheckpointError::IncompatibleSchema("missing version".into()).into());
            }
        }

        serde_json::from_value(value)
            .map_err(|e| CheckpointError::IncompatibleSchema(e.to_string()).into())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(ToOwned::to_owned).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
