//! Type-safe ID wrappers for swarms, agents and tasks

use serde::{Deserialize, Serialize};
use std::fmt;

/// Generate a short unique suffix (timestamp nanos + process-local counter)
pub(crate) fn unique_suffix() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:x}{:04x}", nanos, counter)
}

/// Type-safe wrapper for swarm IDs
///
/// Format: swarm-suffix (e.g., "swarm-18f2a90c1")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwarmId(String);

impl SwarmId {
    /// Create a new SwarmId from a string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh unique SwarmId
    pub fn generate() -> Self {
        Self(format!("swarm-{}", unique_suffix()))
    }

    /// Get the underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SwarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SwarmId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SwarmId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Type-safe wrapper for agent IDs
///
/// Format: typically role-flavored (e.g., "coder-1", "agent-planner-3fa2")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(String);

impl AgentId {
    /// Create a new AgentId from a string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The coordinator's own sender identity for pings and system messages
    pub fn coordinator() -> Self {
        Self("coordinator".to_string())
    }

    /// Get the underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Type-safe wrapper for task IDs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Create a new TaskId from a string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh unique TaskId
    pub fn generate() -> Self {
        Self(format!("task-{}", unique_suffix()))
    }

    /// Get the underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
