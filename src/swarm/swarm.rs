//! Swarm aggregate, planner submissions and role routing
//!
//! A swarm is a bounded unit of work: a handful of capability-tagged
//! agents plus a dependency graph of tasks. Its overall status is a coarse
//! aggregate computed from constituent task states, never independently
//! mutated.

use super::{AgentId, AgentRecord, AgentRole, CapabilitySet, SwarmId, Task, TaskId, TaskKind, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Overall swarm status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwarmStatus {
    Idle,
    Running,
    Paused,
    Completed,
    Error,
}

impl Default for SwarmStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl SwarmStatus {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub(crate) fn from_str(s: &str) -> Self {
        match s {
            "running" => Self::Running,
            "paused" => Self::Paused,
            "completed" => Self::Completed,
            "error" => Self::Error,
            _ => Self::Idle,
        }
    }
}

/// Free-form swarm metadata supplied by the planner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwarmMetadata {
    /// Project name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    /// Overall goal description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,

    /// Feature list
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
}

/// Durable swarm record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Swarm {
    /// Unique identifier
    pub id: SwarmId,

    /// Human-readable name
    pub name: String,

    /// Derived overall status
    pub status: SwarmStatus,

    /// Planner-supplied metadata
    pub metadata: SwarmMetadata,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Compute the coarse aggregate status from a swarm's task states
///
/// `Paused` is never derived here; it is set externally and preserved by
/// the store's refresh.
pub fn derive_status(tasks: &[Task]) -> SwarmStatus {
    if tasks.is_empty() {
        return SwarmStatus::Idle;
    }

    let mut pending = 0usize;
    let mut in_progress = 0usize;
    let mut completed = 0usize;
    let mut failed = 0usize;
    for task in tasks {
        match task.status {
            TaskStatus::Pending => pending += 1,
            TaskStatus::InProgress => in_progress += 1,
            TaskStatus::Completed => completed += 1,
            TaskStatus::Failed => failed += 1,
        }
    }

    if in_progress > 0 {
        SwarmStatus::Running
    } else if pending == tasks.len() {
        SwarmStatus::Idle
    } else if completed == tasks.len() {
        SwarmStatus::Completed
    } else if failed > 0 && pending == 0 {
        // Failures are final once nothing is left to run or retry
        SwarmStatus::Error
    } else {
        SwarmStatus::Running
    }
}

/// Full swarm view as returned by the Task Store query interface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmSnapshot {
    /// The swarm record
    pub swarm: Swarm,

    /// All agents in the swarm
    pub agents: Vec<AgentRecord>,

    /// All tasks in the swarm
    pub tasks: Vec<Task>,
}

impl SwarmSnapshot {
    /// Build a task-id -> status map for readiness checks
    pub fn task_status_map(&self) -> HashMap<TaskId, TaskStatus> {
        self.tasks
            .iter()
            .map(|t| (t.id.clone(), t.status))
            .collect()
    }

    /// Look up a task by id
    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }
}

/// Static routing table mapping task kinds onto agent roles
///
/// Validated once at swarm creation rather than resolved ad hoc per task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRoutes {
    routes: HashMap<TaskKind, AgentRole>,
}

impl Default for RoleRoutes {
    fn default() -> Self {
        let mut routes = HashMap::new();
        routes.insert(TaskKind::Research, AgentRole::Planner);
        routes.insert(TaskKind::Design, AgentRole::Planner);
        routes.insert(TaskKind::Code, AgentRole::Coder);
        routes.insert(TaskKind::Review, AgentRole::Reviewer);
        routes.insert(TaskKind::Test, AgentRole::Tester);
        routes.insert(TaskKind::Deploy, AgentRole::Deployer);
        Self { routes }
    }
}

impl RoleRoutes {
    /// The role that serves a task kind
    pub fn role_for(&self, kind: TaskKind) -> Option<&AgentRole> {
        self.routes.get(&kind)
    }

    /// Override the route for a task kind
    pub fn set(&mut self, kind: TaskKind, role: AgentRole) {
        self.routes.insert(kind, role);
    }
}

/// Agent declaration inside a swarm plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    /// Agent identifier
    pub id: AgentId,

    /// Declared capability set
    pub capabilities: CapabilitySet,
}

impl AgentSpec {
    /// Declare an agent with its roles
    pub fn new(id: impl Into<AgentId>, capabilities: CapabilitySet) -> Self {
        Self {
            id: id.into(),
            capabilities,
        }
    }
}

/// Initial task graph submitted by the external planner
///
/// Carries ids, dependencies, priorities and per-agent assignments; the
/// store validates it before any scheduling happens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmPlan {
    /// Swarm name
    pub name: String,

    /// Free-form metadata
    #[serde(default)]
    pub metadata: SwarmMetadata,

    /// Declared agents
    pub agents: Vec<AgentSpec>,

    /// Task graph
    pub tasks: Vec<Task>,
}

impl SwarmPlan {
    /// Create an empty plan
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: SwarmMetadata::default(),
            agents: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// Set the metadata
    pub fn with_metadata(mut self, metadata: SwarmMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Declare an agent
    pub fn with_agent(mut self, spec: AgentSpec) -> Self {
        self.agents.push(spec);
        self
    }

    /// Add a task
    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    /// Structural validation, run at submission
    ///
    /// Checks id uniqueness, that every assignment names a declared agent,
    /// that every dependency names a task in the plan, and that every task
    /// kind routes onto a role some declared agent covers. Cycle detection
    /// is performed separately by the store using the scheduler's graph
    /// walk.
    pub fn validate(&self, routes: &RoleRoutes) -> crate::Result<()> {
        if self.agents.is_empty() {
            return Err(crate::WaggleError::InvalidPlan(
                "plan declares no agents".to_string(),
            ));
        }

        let mut task_ids: HashSet<&TaskId> = HashSet::new();
        for task in &self.tasks {
            if !task_ids.insert(&task.id) {
                return Err(crate::WaggleError::InvalidPlan(format!(
                    "duplicate task id {}",
                    task.id
                )));
            }
        }

        let agent_ids: HashSet<&AgentId> = self.agents.iter().map(|a| &a.id).collect();
        for task in &self.tasks {
            if !agent_ids.contains(&task.agent_id) {
                return Err(crate::WaggleError::InvalidPlan(format!(
                    "task {} assigned to undeclared agent {}",
                    task.id, task.agent_id
                )));
            }

            for dep in &task.dependencies {
                if !task_ids.contains(dep) {
                    return Err(crate::WaggleError::InvalidPlan(format!(
                        "task {} depends on unknown task {}",
                        task.id, dep
                    )));
                }
            }

            let kind = task.kind();
            let role = routes.role_for(kind).ok_or_else(|| {
                crate::WaggleError::InvalidPlan(format!("no role route for task kind {}", kind))
            })?;
            if !self.agents.iter().any(|a| a.capabilities.has_role(role)) {
                return Err(crate::WaggleError::InvalidPlan(format!(
                    "no declared agent covers role {} required by task {}",
                    role, task.id
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::TaskPayload;

    fn code_task(id: &str, agent: &str) -> Task {
        Task::new(
            id,
            "swarm-1",
            agent,
            format!("Task {}", id),
            TaskPayload::Code { features: vec![] },
        )
    }

    fn coder_plan() -> SwarmPlan {
        SwarmPlan::new("demo")
            .with_agent(AgentSpec::new(
                "coder-1",
                CapabilitySet::new([AgentRole::Coder]),
            ))
            .with_task(code_task("t1", "coder-1"))
    }

    #[test]
    fn test_derive_status_empty_is_idle() {
        assert_eq!(derive_status(&[]), SwarmStatus::Idle);
    }

    #[test]
    fn test_derive_status_transitions() {
        let mut tasks = vec![code_task("t1", "a"), code_task("t2", "a")];
        assert_eq!(derive_status(&tasks), SwarmStatus::Idle);

        tasks[0].status = TaskStatus::InProgress;
        assert_eq!(derive_status(&tasks), SwarmStatus::Running);

        tasks[0].status = TaskStatus::Completed;
        assert_eq!(derive_status(&tasks), SwarmStatus::Running);

        tasks[1].status = TaskStatus::Completed;
        assert_eq!(derive_status(&tasks), SwarmStatus::Completed);

        tasks[1].status = TaskStatus::Failed;
        assert_eq!(derive_status(&tasks), SwarmStatus::Error);
    }

    #[test]
    fn test_default_routes() {
        let routes = RoleRoutes::default();
        assert_eq!(routes.role_for(TaskKind::Code), Some(&AgentRole::Coder));
        assert_eq!(routes.role_for(TaskKind::Test), Some(&AgentRole::Tester));
    }

    #[test]
    fn test_plan_validation_happy_path() {
        let plan = coder_plan();
        assert!(plan.validate(&RoleRoutes::default()).is_ok());
    }

    #[test]
    fn test_plan_rejects_undeclared_agent() {
        let plan = coder_plan().with_task(code_task("t2", "ghost"));
        let err = plan.validate(&RoleRoutes::default()).unwrap_err();
        assert!(err.to_string().contains("undeclared agent"));
    }

    #[test]
    fn test_plan_rejects_unknown_dependency() {
        let plan = coder_plan().with_task(code_task("t2", "coder-1").with_dependency("nope"));
        let err = plan.validate(&RoleRoutes::default()).unwrap_err();
        assert!(err.to_string().contains("unknown task"));
    }

    #[test]
    fn test_plan_rejects_uncovered_role() {
        let plan = coder_plan().with_task(Task::new(
            "t2",
            "swarm-1",
            "coder-1",
            "Deploy it",
            TaskPayload::Deploy {
                target: "prod".to_string(),
            },
        ));
        let err = plan.validate(&RoleRoutes::default()).unwrap_err();
        assert!(err.to_string().contains("covers role"));
    }

    #[test]
    fn test_plan_rejects_duplicate_ids() {
        let plan = coder_plan().with_task(code_task("t1", "coder-1"));
        let err = plan.validate(&RoleRoutes::default()).unwrap_err();
        assert!(err.to_string().contains("duplicate task id"));
    }
}
