//! Error types for the RL core library

use thiserror::Error;

/// Core error type for RL operations
#[derive(Error, Debug)]
pub enum RLError {
    /// A required observation field was absent
    #[error("Observation is missing required field `{0}`")]
    MissingField(String),

    /// Environment-related errors
    #[error("Environment error: {0}")]
    Environment(String),

    /// Invalid action
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Not enough stored transitions to satisfy a sample request
    #[error("Insufficient data: requested {requested} transitions but only {available} stored")]
    InsufficientData { available: usize, requested: usize },

    /// Loss or gradient became NaN or infinite during a training step
    #[error("Non-finite value during training: {0}")]
    NonFiniteLoss(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Checkpoint persistence errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl RLError {
    /// Whether the failure is transient and training may continue.
    ///
    /// Numerical blow-ups in a single batch are recoverable. Shape and
    /// contract violations point to a bug in the caller and are not.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NonFiniteLoss(_))
    }
}

/// Failures while reading or restoring a checkpoint
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// No checkpoint at the given path
    #[error("no checkpoint found at {0}")]
    NotFound(String),

    /// File exists but is not a valid checkpoint document
    #[error("malformed checkpoint: {0}")]
    Malformed(String),

    /// Schema version or field set differs from what this build writes
    #[error("incompatible checkpoint schema: {0}")]
    IncompatibleSchema(String),

    /// Stored parameters do not fit the agent's networks
    #[error("checkpoint shape mismatch: {0}")]
    ShapeMismatch(String),
}

/// Result type alias for RL operations
pub type Result<T> = std::result::Result<T, RLError>;
