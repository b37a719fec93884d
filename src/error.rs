//! Error types for Waggle
//!
//! Defines the crate-wide error enum covering all failure modes across the
//! coordination subsystem. Uses thiserror for ergonomic error handling.

use crate::store::StoreError;
use crate::swarm::SwarmId;
use thiserror::Error;

/// Result type alias for Waggle operations
pub type Result<T> = std::result::Result<T, WaggleError>;

/// Crate-wide error type for Waggle operations
#[derive(Error, Debug)]
pub enum WaggleError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Task Store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Swarm plan rejected at submission
    #[error("Invalid swarm plan: {0}")]
    InvalidPlan(String),

    /// Circular dependency detected in a swarm's task graph
    #[error("Dependency cycle in swarm {swarm}: {path}")]
    CycleDetected {
        swarm: SwarmId,
        /// Task ids along the cycle, starting at the revisited node
        path: String,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),

    /// Anyhow errors (for more context)
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}
