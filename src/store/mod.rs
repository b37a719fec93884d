//! Task Store - durable record of swarms, agents, tasks and events
//!
//! The store is the single source of truth; the coordinator and scheduler
//! hold only transient views derived from it. All loops (dispatch,
//! scheduling, recovery) share one [`SwarmStore`] behind an `Arc`.

mod events;
mod sqlite;

pub use events::{EventKind, InterventionEvent};
pub use sqlite::SwarmStore;

use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store initialization failed: {0}")]
    Init(String),

    #[error("swarm not found: {0}")]
    SwarmNotFound(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
