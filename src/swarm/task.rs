//! Task data structure and execution results
//!
//! A task is one node in a swarm's dependency graph: assigned to exactly
//! one agent, carrying a typed payload, and scheduled only once every
//! dependency has completed.

use super::{AgentId, SwarmId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default task priority (higher = more urgent)
pub const DEFAULT_PRIORITY: i32 = 5;

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    /// Not yet dispatched
    Pending,

    /// Currently executing on its assigned agent
    InProgress,

    /// Finished successfully
    Completed,

    /// Finished unsuccessfully; eligible for monitor retry
    Failed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub(crate) fn from_str(s: &str) -> Self {
        match s {
            "in-progress" => Self::InProgress,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }

    /// Check if the task has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Kind of work a task represents, used for routing to agent roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Research,
    Design,
    Code,
    Review,
    Test,
    Deploy,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Research => write!(f, "research"),
            Self::Design => write!(f, "design"),
            Self::Code => write!(f, "code"),
            Self::Review => write!(f, "review"),
            Self::Test => write!(f, "test"),
            Self::Deploy => write!(f, "deploy"),
        }
    }
}

/// Typed task payload, validated at the planner boundary
///
/// One variant per task kind; planners submit structured data instead of
/// free-form JSON blobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum TaskPayload {
    /// Research comparable systems or prior art
    Research {
        /// Comparable products/projects to look at
        #[serde(default)]
        comparables: Vec<String>,
    },

    /// Design a schema, wireframe or architecture
    Design {
        /// Target stack description, if already inferred
        #[serde(skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
    },

    /// Implement features
    Code {
        /// Feature list to implement
        #[serde(default)]
        features: Vec<String>,
    },

    /// Review the output of another task
    Review {
        /// Task whose output is under review
        #[serde(skip_serializing_if = "Option::is_none")]
        target_task: Option<TaskId>,
    },

    /// Run tests against a coverage target
    Test {
        /// Required coverage percentage
        coverage_target: f64,
    },

    /// Deploy the result
    Deploy {
        /// Deployment target (URL or environment name)
        target: String,
    },
}

impl TaskPayload {
    /// The task kind this payload represents
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Research { .. } => TaskKind::Research,
            Self::Design { .. } => TaskKind::Design,
            Self::Code { .. } => TaskKind::Code,
            Self::Review { .. } => TaskKind::Review,
            Self::Test { .. } => TaskKind::Test,
            Self::Deploy { .. } => TaskKind::Deploy,
        }
    }
}

/// One unit of work inside a swarm
///
/// # Invariants
///
/// - The dependency lists of a swarm's tasks must form a DAG; cycles are
///   rejected at plan submission and detectable at any time afterwards.
/// - A task may only move to `in-progress` once every dependency is
///   `completed`; a `failed` dependency blocks it entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,

    /// Owning swarm
    pub swarm_id: SwarmId,

    /// Agent this task is assigned to
    pub agent_id: AgentId,

    /// Free-text description
    pub description: String,

    /// Current status
    pub status: TaskStatus,

    /// Priority (higher = more urgent)
    pub priority: i32,

    /// Tasks that must complete before this one may start
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<TaskId>,

    /// Typed payload
    pub payload: TaskPayload,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new pending task
    pub fn new(
        id: impl Into<TaskId>,
        swarm_id: impl Into<SwarmId>,
        agent_id: impl Into<AgentId>,
        description: impl Into<String>,
        payload: TaskPayload,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            swarm_id: swarm_id.into(),
            agent_id: agent_id.into(),
            description: description.into(),
            status: TaskStatus::default(),
            priority: DEFAULT_PRIORITY,
            dependencies: Vec::new(),
            payload,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Add a dependency (deduplicated)
    pub fn with_dependency(mut self, dep: impl Into<TaskId>) -> Self {
        self.add_dependency(dep);
        self
    }

    /// Add a dependency (deduplicated)
    pub fn add_dependency(&mut self, dep: impl Into<TaskId>) {
        let dep_id = dep.into();
        if !self.dependencies.contains(&dep_id) {
            self.dependencies.push(dep_id);
        }
        self.update_timestamp();
    }

    /// The kind of work this task represents
    pub fn kind(&self) -> TaskKind {
        self.payload.kind()
    }

    /// Update the timestamp to now
    pub fn update_timestamp(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Outcome of executing a task on an agent
///
/// This is the shape the agent execution interface returns; the
/// coordinator converts thrown errors into a failed result so agent
/// crashes never propagate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Task that was executed
    pub task_id: TaskId,

    /// Terminal status (`completed` or `failed`)
    pub status: TaskStatus,

    /// Structured output from the agent
    #[serde(default)]
    pub output: serde_json::Value,

    /// Error message when the execution failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Wall-clock execution time
    #[serde(with = "duration_seconds")]
    pub elapsed: Duration,
}

impl TaskResult {
    /// Create a successful result
    pub fn completed(task_id: TaskId, output: serde_json::Value, elapsed: Duration) -> Self {
        Self {
            task_id,
            status: TaskStatus::Completed,
            output,
            error: None,
            elapsed,
        }
    }

    /// Create a failed result carrying the error message
    pub fn failed(task_id: TaskId, error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            task_id,
            status: TaskStatus::Failed,
            output: serde_json::Value::Null,
            error: Some(error.into()),
            elapsed,
        }
    }

    /// Check if the execution succeeded
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

// Custom serialization for Duration as (fractional) seconds
pub(crate) mod duration_seconds {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
