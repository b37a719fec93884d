//! Agent roles, capabilities and health tracking
//!
//! An agent is a capability-tagged worker that executes tasks assigned to
//! it. The coordinator keeps an [`AgentHealth`] record per registered agent;
//! the Task Store persists the same record for cross-process consistency.

use super::AgentId;
use super::SwarmId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Typed role an agent can advertise
///
/// Roles are validated against task kinds at swarm-creation time rather
/// than resolved from ad hoc strings per task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Decomposes work and researches approaches
    Planner,

    /// Writes implementation code
    Coder,

    /// Reviews produced work
    Reviewer,

    /// Writes and runs tests
    Tester,

    /// Ships the result
    Deployer,

    /// Custom role with name
    Custom(String),
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Planner => write!(f, "planner"),
            Self::Coder => write!(f, "coder"),
            Self::Reviewer => write!(f, "reviewer"),
            Self::Tester => write!(f, "tester"),
            Self::Deployer => write!(f, "deployer"),
            Self::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// Capability set announced by an agent during its handshake
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    /// Roles this agent can fill
    pub roles: HashSet<AgentRole>,

    /// Optional model backing the agent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Free-form capability tags
    #[serde(default, skip_serializing_if = "HashSet::is_empty")]
    pub tags: HashSet<String>,
}

impl CapabilitySet {
    /// Create a capability set from a list of roles
    pub fn new(roles: impl IntoIterator<Item = AgentRole>) -> Self {
        Self {
            roles: roles.into_iter().collect(),
            model: None,
            tags: HashSet::new(),
        }
    }

    /// Set the backing model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Add a free-form tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Check whether the set covers a role
    pub fn has_role(&self, role: &AgentRole) -> bool {
        self.roles.contains(role)
    }
}

/// Agent status indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Registered and available for work
    Idle,

    /// Currently executing a task
    Working,

    /// Finished its last task successfully
    Completed,

    /// Its last task failed
    Failed,

    /// Blocked on something external (dependency, input)
    Waiting,
}

impl AgentStatus {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Working => "working",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Waiting => "waiting",
        }
    }

    pub(crate) fn from_str(s: &str) -> Self {
        match s {
            "working" => Self::Working,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "waiting" => Self::Waiting,
            _ => Self::Idle,
        }
    }

    /// Check if the agent can accept new work
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// Health record for a registered agent
///
/// Mutated by the coordinator on dispatch/completion and read by the
/// recovery monitor for liveness checks. Never deleted mid-swarm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealth {
    /// Declared capability set
    pub capabilities: CapabilitySet,

    /// Current status
    pub status: AgentStatus,

    /// Last heartbeat timestamp
    pub last_heartbeat: DateTime<Utc>,

    /// Cumulative completed task count
    pub tasks_completed: u64,

    /// Cumulative failed task count
    pub tasks_failed: u64,

    /// Running average task execution time in seconds
    pub avg_execution_secs: f64,
}

impl AgentHealth {
    /// Create a fresh health record (idle, heartbeat = now)
    pub fn new(capabilities: CapabilitySet) -> Self {
        Self {
            capabilities,
            status: AgentStatus::Idle,
            last_heartbeat: Utc::now(),
            tasks_completed: 0,
            tasks_failed: 0,
            avg_execution_secs: 0.0,
        }
    }

    /// Refresh the heartbeat timestamp
    pub fn touch(&mut self) {
        self.last_heartbeat = Utc::now();
    }

    /// Record a successful task execution
    pub fn record_success(&mut self, elapsed: Duration) {
        self.tasks_completed += 1;
        self.fold_execution_time(elapsed);
        self.status = AgentStatus::Completed;
        self.touch();
    }

    /// Record a failed task execution
    pub fn record_failure(&mut self, elapsed: Duration) {
        self.tasks_failed += 1;
        self.fold_execution_time(elapsed);
        self.status = AgentStatus::Failed;
        self.touch();
    }

    /// Check whether the heartbeat is younger than the staleness threshold
    ///
    /// A soft liveness hint: a busy agent can be silent and still alive.
    pub fn is_alive(&self, staleness: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.last_heartbeat);
        age.to_std().map(|age| age < staleness).unwrap_or(true)
    }

    fn fold_execution_time(&mut self, elapsed: Duration) {
        let executed = self.tasks_completed + self.tasks_failed;
        let prior = self.avg_execution_secs * (executed.saturating_sub(1)) as f64;
        self.avg_execution_secs = (prior + elapsed.as_secs_f64()) / executed as f64;
    }
}

/// Durable agent record as held by the Task Store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Unique agent identifier
    pub id: AgentId,

    /// Owning swarm
    pub swarm_id: SwarmId,

    /// Health and capability state
    pub health: AgentHealth,
}

impl AgentRecord {
    /// Create a record for a newly registered agent
    pub fn new(id: impl Into<AgentId>, swarm_id: SwarmId, capabilities: CapabilitySet) -> Self {
        Self {
            id: id.into(),
            swarm_id,
            health: AgentHealth::new(capabilities),
        }
    }
}
