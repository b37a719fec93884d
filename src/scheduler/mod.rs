//! Dependency-aware task scheduler
//!
//! Computes which pending tasks are unblocked, detects cycles in the
//! dependency graph, and reports aggregate progress. Readiness is always
//! derived fresh from current task states - there is no cached ready set
//! that could go stale across concurrent updates.

use crate::store::SwarmStore;
use crate::swarm::{AgentId, SwarmId, Task, TaskId, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Why a task can or cannot start right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Every dependency is completed
    Ready,

    /// A dependency has not completed yet (but has not failed)
    Waiting { dep: TaskId, status: TaskStatus },

    /// A dependency failed; the task is blocked until that dependency is
    /// externally retried back to completed
    Blocked { dep: TaskId },
}

impl Readiness {
    /// True only for [`Readiness::Ready`]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Aggregate progress over a swarm's task graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmProgress {
    /// Completed percentage, rounded to one decimal
    pub percent: f64,
    pub completed: usize,
    pub in_progress: usize,
    pub pending: usize,
    pub failed: usize,
    pub total: usize,
}

/// Outcome of an agent's request to start a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartCheck {
    /// Whether the agent may start the task
    pub can_start: bool,

    /// Human-readable block reason when denied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StartCheck {
    fn allowed() -> Self {
        Self {
            can_start: true,
            reason: None,
        }
    }

    fn denied(reason: impl Into<String>) -> Self {
        Self {
            can_start: false,
            reason: Some(reason.into()),
        }
    }
}

/// Scheduler snapshot for dashboards and CLIs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStats {
    #[serde(flatten)]
    pub progress: SwarmProgress,

    /// Number of tasks currently ready to execute
    pub ready_tasks: usize,

    /// Whether the dependency graph currently contains a cycle
    pub has_cycle: bool,

    /// The cycle path, starting at the revisited node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle: Option<Vec<TaskId>>,
}

/// Detect a circular dependency among the given tasks using DFS with a
/// recursion stack
///
/// Returns the cycle's task ids starting at the revisited node, or `None`
/// for an acyclic graph. Runs in time proportional to nodes + edges.
/// Dependencies pointing outside the task set cannot form part of a cycle
/// and are ignored.
pub fn find_cycle(tasks: &[Task]) -> Option<Vec<TaskId>> {
    let adj: HashMap<&TaskId, &[TaskId]> = tasks
        .iter()
        .map(|t| (&t.id, t.dependencies.as_slice()))
        .collect();

    let mut visited: HashSet<&TaskId> = HashSet::new();
    let mut rec_stack: HashSet<&TaskId> = HashSet::new();

    // Iterate in task order so repeated calls report the same cycle
    for task in tasks {
        if !visited.contains(&task.id) {
            let mut path = Vec::new();
            if let Some(cycle) =
                cycle_dfs(&task.id, &adj, &mut visited, &mut rec_stack, &mut path)
            {
                return Some(cycle);
            }
        }
    }

    None
}

fn cycle_dfs<'a>(
    node: &'a TaskId,
    adj: &HashMap<&'a TaskId, &'a [TaskId]>,
    visited: &mut HashSet<&'a TaskId>,
    rec_stack: &mut HashSet<&'a TaskId>,
    path: &mut Vec<&'a TaskId>,
) -> Option<Vec<TaskId>> {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(neighbors) = adj.get(node) {
        for neighbor in *neighbors {
            let Some((&known, _)) = adj.get_key_value(neighbor) else {
                continue;
            };
            if !visited.contains(known) {
                if let Some(cycle) = cycle_dfs(known, adj, visited, rec_stack, path) {
                    return Some(cycle);
                }
            } else if rec_stack.contains(known) {
                let start = path.iter().position(|p| *p == known).unwrap();
                return Some(path[start..].iter().map(|id| (*id).clone()).collect());
            }
        }
    }

    path.pop();
    rec_stack.remove(node);
    None
}

/// Compute a task's readiness against a status map
fn readiness_in(task: &Task, statuses: &HashMap<TaskId, TaskStatus>) -> Readiness {
    for dep in &task.dependencies {
        // An unknown dependency counts as pending, same as a dependency
        // that simply has not run yet
        let status = statuses.get(dep).copied().unwrap_or(TaskStatus::Pending);
        match status {
            TaskStatus::Failed => {
                return Readiness::Blocked { dep: dep.clone() };
            }
            TaskStatus::Completed => {}
            other => {
                return Readiness::Waiting {
                    dep: dep.clone(),
                    status: other,
                };
            }
        }
    }
    Readiness::Ready
}

/// Dependency scheduler over a shared Task Store
pub struct TaskScheduler {
    store: Arc<SwarmStore>,
}

impl TaskScheduler {
    /// Create a scheduler over the shared store
    pub fn new(store: Arc<SwarmStore>) -> Self {
        Self { store }
    }

    /// Compute a task's readiness from current store state
    pub fn readiness(&self, task: &Task) -> crate::Result<Readiness> {
        let snapshot = self.store.snapshot(&task.swarm_id)?;
        let readiness = readiness_in(task, &snapshot.task_status_map());

        match &readiness {
            Readiness::Blocked { dep } => {
                tracing::warn!(task = %task.id, dep = %dep, "Task blocked: dependency failed");
            }
            Readiness::Waiting { dep, status } => {
                tracing::debug!(
                    task = %task.id,
                    dep = %dep,
                    status = status.as_str(),
                    "Task waiting on dependency"
                );
            }
            Readiness::Ready => {
                tracing::debug!(task = %task.id, "All dependencies met");
            }
        }

        Ok(readiness)
    }

    /// True iff every dependency of the task is completed
    pub fn dependencies_met(&self, task: &Task) -> crate::Result<bool> {
        Ok(self.readiness(task)?.is_ready())
    }

    /// All pending tasks whose dependencies are met, sorted descending by
    /// priority (stable: ties keep store order)
    pub fn ready_tasks(&self, swarm_id: &SwarmId) -> crate::Result<Vec<Task>> {
        let snapshot = self.store.snapshot(swarm_id)?;
        let statuses = snapshot.task_status_map();

        let mut ready: Vec<Task> = snapshot
            .tasks
            .into_iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter(|t| readiness_in(t, &statuses).is_ready())
            .collect();

        ready.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(ready)
    }

    /// Detect a dependency cycle in the swarm's current task graph
    ///
    /// Callable at any time, since dependency edges may be mutated after
    /// submission.
    pub fn detect_cycle(&self, swarm_id: &SwarmId) -> crate::Result<Option<Vec<TaskId>>> {
        let snapshot = self.store.snapshot(swarm_id)?;
        Ok(find_cycle(&snapshot.tasks))
    }

    /// Aggregate progress over the swarm's tasks
    ///
    /// An empty task set yields 0% rather than a division error.
    pub fn progress(&self, swarm_id: &SwarmId) -> crate::Result<SwarmProgress> {
        let snapshot = self.store.snapshot(swarm_id)?;
        let total = snapshot.tasks.len();

        let mut progress = SwarmProgress {
            percent: 0.0,
            completed: 0,
            in_progress: 0,
            pending: 0,
            failed: 0,
            total,
        };
        for task in &snapshot.tasks {
            match task.status {
                TaskStatus::Completed => progress.completed += 1,
                TaskStatus::InProgress => progress.in_progress += 1,
                TaskStatus::Pending => progress.pending += 1,
                TaskStatus::Failed => progress.failed += 1,
            }
        }

        if total > 0 {
            progress.percent = (progress.completed as f64 / total as f64 * 1000.0).round() / 10.0;
        }
        Ok(progress)
    }

    /// Check whether an agent may start a specific task
    ///
    /// Ownership mismatch and unmet dependencies are distinguished in the
    /// returned reason.
    pub fn can_agent_start(
        &self,
        agent_id: &AgentId,
        task_id: &TaskId,
        swarm_id: &SwarmId,
    ) -> crate::Result<StartCheck> {
        let snapshot = self.store.snapshot(swarm_id)?;
        let Some(task) = snapshot.task(task_id) else {
            return Ok(StartCheck::denied(format!(
                "Task {} not found in swarm {}",
                task_id, swarm_id
            )));
        };

        if &task.agent_id != agent_id {
            return Ok(StartCheck::denied(format!(
                "Task {} not assigned to agent {}",
                task_id, agent_id
            )));
        }

        match readiness_in(task, &snapshot.task_status_map()) {
            Readiness::Ready => Ok(StartCheck::allowed()),
            Readiness::Blocked { dep } => Ok(StartCheck::denied(format!(
                "Dependency {} failed",
                dep
            ))),
            Readiness::Waiting { dep, status } => Ok(StartCheck::denied(format!(
                "Dependency {} is {}",
                dep,
                status.as_str()
            ))),
        }
    }

    /// Scheduler snapshot for dashboards
    pub fn stats(&self, swarm_id: &SwarmId) -> crate::Result<SchedulerStats> {
        let progress = self.progress(swarm_id)?;
        let ready = self.ready_tasks(swarm_id)?;
        let cycle = self.detect_cycle(swarm_id)?;

        Ok(SchedulerStats {
            progress,
            ready_tasks: ready.len(),
            has_cycle: cycle.is_some(),
            cycle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::{
        AgentRole, AgentSpec, CapabilitySet, RoleRoutes, SwarmPlan, TaskPayload,
    };

    fn code_task(id: &str, priority: i32, deps: &[&str]) -> Task {
        let mut task = Task::new(
            id,
            "unset",
            "coder-1",
            format!("Task {}", id),
            TaskPayload::Code { features: vec![] },
        )
        .with_priority(priority);
        for dep in deps {
            task.add_dependency(*dep);
        }
        task
    }

    fn plan_with_tasks(tasks: Vec<Task>) -> SwarmPlan {
        let mut plan = SwarmPlan::new("sched-test").with_agent(AgentSpec::new(
            "coder-1",
            CapabilitySet::new([AgentRole::Coder]),
        ));
        for task in tasks {
            plan = plan.with_task(task);
        }
        plan
    }

    fn scheduler_with(tasks: Vec<Task>) -> (TaskScheduler, Arc<SwarmStore>, SwarmId) {
        let store = Arc::new(SwarmStore::open_in_memory().unwrap());
        let swarm_id = store
            .start_swarm(&plan_with_tasks(tasks), &RoleRoutes::default())
            .unwrap();
        (TaskScheduler::new(store.clone()), store, swarm_id)
    }

    #[test]
    fn test_no_dependencies_is_ready_immediately() {
        let (scheduler, store, _) = scheduler_with(vec![code_task("a", 5, &[])]);
        let task = store.task(&TaskId::new("a")).unwrap();
        assert!(scheduler.dependencies_met(&task).unwrap());
    }

    #[test]
    fn test_waiting_vs_blocked_are_distinct() {
        let (scheduler, store, _) = scheduler_with(vec![
            code_task("dep", 5, &[]),
            code_task("child", 5, &["dep"]),
        ]);

        let child = store.task(&TaskId::new("child")).unwrap();
        assert_eq!(
            scheduler.readiness(&child).unwrap(),
            Readiness::Waiting {
                dep: TaskId::new("dep"),
                status: TaskStatus::Pending
            }
        );

        store
            .update_task_status(&TaskId::new("dep"), TaskStatus::Failed)
            .unwrap();
        assert_eq!(
            scheduler.readiness(&child).unwrap(),
            Readiness::Blocked {
                dep: TaskId::new("dep")
            }
        );
        assert!(!scheduler.dependencies_met(&child).unwrap());

        // Externally retried back to completed unblocks the child
        store
            .update_task_status(&TaskId::new("dep"), TaskStatus::Completed)
            .unwrap();
        assert!(scheduler.dependencies_met(&child).unwrap());
    }

    #[test]
    fn test_ready_tasks_sorted_and_stable() {
        let (scheduler, _, swarm_id) = scheduler_with(vec![
            code_task("low", 2, &[]),
            code_task("high", 9, &[]),
            code_task("mid-1", 5, &[]),
            code_task("mid-2", 5, &[]),
        ]);

        let first = scheduler.ready_tasks(&swarm_id).unwrap();
        let ids: Vec<&str> = first.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid-1", "mid-2", "low"]);

        // Stable across repeated calls with unchanged input
        let second = scheduler.ready_tasks(&swarm_id).unwrap();
        let ids2: Vec<&str> = second.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ids2);
    }

    #[test]
    fn test_ready_tasks_excludes_waiting_and_blocked() {
        let (scheduler, store, swarm_id) = scheduler_with(vec![
            code_task("a", 5, &[]),
            code_task("b", 9, &["a"]),
        ]);

        let ready = scheduler.ready_tasks(&swarm_id).unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id.as_str(), "a");

        store
            .update_task_status(&TaskId::new("a"), TaskStatus::Completed)
            .unwrap();
        let ready = scheduler.ready_tasks(&swarm_id).unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id.as_str(), "b");
    }

    #[test]
    fn test_three_node_cycle_detected() {
        // The store rejects cyclic plans, so exercise the graph walk
        // directly: A -> B -> C -> A
        let tasks = vec![
            code_task("a", 5, &["b"]),
            code_task("b", 5, &["c"]),
            code_task("c", 5, &["a"]),
        ];
        let cycle = find_cycle(&tasks).unwrap();
        assert_eq!(cycle.len(), 3);
        let ids: HashSet<&str> = cycle.iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, HashSet::from(["a", "b", "c"]));
    }

    #[test]
    fn test_acyclic_graph_has_no_cycle() {
        let (scheduler, _, swarm_id) = scheduler_with(vec![
            code_task("a", 5, &[]),
            code_task("b", 5, &["a"]),
            code_task("c", 5, &["a", "b"]),
        ]);
        assert!(scheduler.detect_cycle(&swarm_id).unwrap().is_none());
    }

    #[test]
    fn test_self_cycle_detected() {
        let tasks = vec![code_task("a", 5, &["a"])];
        let cycle = find_cycle(&tasks).unwrap();
        assert_eq!(cycle, vec![TaskId::new("a")]);
    }

    #[test]
    fn test_unknown_dependency_is_not_a_cycle() {
        let tasks = vec![code_task("a", 5, &["ghost"])];
        assert!(find_cycle(&tasks).is_none());
    }

    #[test]
    fn test_progress_empty_swarm() {
        let (scheduler, _, swarm_id) = scheduler_with(vec![]);
        let progress = scheduler.progress(&swarm_id).unwrap();
        assert_eq!(progress.percent, 0.0);
        assert_eq!(progress.total, 0);
    }

    #[test]
    fn test_progress_four_of_ten() {
        let tasks: Vec<Task> = (0..10)
            .map(|i| code_task(&format!("t{}", i), 5, &[]))
            .collect();
        let (scheduler, store, swarm_id) = scheduler_with(tasks);

        for i in 0..4 {
            store
                .update_task_status(&TaskId::new(format!("t{}", i)), TaskStatus::Completed)
                .unwrap();
        }

        let progress = scheduler.progress(&swarm_id).unwrap();
        assert_eq!(progress.percent, 40.0);
        assert_eq!(progress.completed, 4);
        assert_eq!(progress.pending, 6);
        assert_eq!(progress.total, 10);
    }

    #[test]
    fn test_progress_one_decimal_rounding() {
        let tasks: Vec<Task> = (0..3)
            .map(|i| code_task(&format!("t{}", i), 5, &[]))
            .collect();
        let (scheduler, store, swarm_id) = scheduler_with(tasks);
        store
            .update_task_status(&TaskId::new("t0"), TaskStatus::Completed)
            .unwrap();

        let progress = scheduler.progress(&swarm_id).unwrap();
        assert_eq!(progress.percent, 33.3);
    }

    #[test]
    fn test_can_agent_start_distinguishes_reasons() {
        let (scheduler, store, swarm_id) = scheduler_with(vec![
            code_task("dep", 5, &[]),
            code_task("child", 5, &["dep"]),
        ]);

        // Wrong owner
        let check = scheduler
            .can_agent_start(&AgentId::new("stranger"), &TaskId::new("child"), &swarm_id)
            .unwrap();
        assert!(!check.can_start);
        assert!(check.reason.unwrap().contains("not assigned"));

        // Right owner, dependency still pending
        let check = scheduler
            .can_agent_start(&AgentId::new("coder-1"), &TaskId::new("child"), &swarm_id)
            .unwrap();
        assert!(!check.can_start);
        assert!(check.reason.unwrap().contains("is pending"));

        // Dependency failed
        store
            .update_task_status(&TaskId::new("dep"), TaskStatus::Failed)
            .unwrap();
        let check = scheduler
            .can_agent_start(&AgentId::new("coder-1"), &TaskId::new("child"), &swarm_id)
            .unwrap();
        assert!(!check.can_start);
        assert!(check.reason.unwrap().contains("failed"));

        // Dependency completed
        store
            .update_task_status(&TaskId::new("dep"), TaskStatus::Completed)
            .unwrap();
        let check = scheduler
            .can_agent_start(&AgentId::new("coder-1"), &TaskId::new("child"), &swarm_id)
            .unwrap();
        assert!(check.can_start);
        assert!(check.reason.is_none());
    }

    #[test]
    fn test_stats_snapshot() {
        let (scheduler, store, swarm_id) = scheduler_with(vec![
            code_task("a", 5, &[]),
            code_task("b", 5, &["a"]),
        ]);
        store
            .update_task_status(&TaskId::new("a"), TaskStatus::Completed)
            .unwrap();

        let stats = scheduler.stats(&swarm_id).unwrap();
        assert_eq!(stats.progress.percent, 50.0);
        assert_eq!(stats.ready_tasks, 1);
        assert!(!stats.has_cycle);
        assert!(stats.cycle.is_none());
    }
}
