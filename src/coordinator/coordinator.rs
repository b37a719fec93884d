//! Swarm coordinator - inbox registry, liveness and task routing
//!
//! The coordinator owns one unbounded FIFO inbox per registered agent and
//! an in-memory health map derived from dispatch outcomes. It is an
//! explicitly constructed, injectable instance whose lifecycle belongs to
//! the hosting service; the in-memory structures are private to one
//! process, with the Task Store remaining the point of truth across
//! processes.

use super::message::{
    AgentMessage, HandshakePayload, MessagePayload, PingPayload,
};
use crate::swarm::{
    AgentHealth, AgentId, AgentStatus, CapabilitySet, RoleRoutes, Task, TaskId, TaskResult,
};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Default heartbeat staleness threshold (30 seconds)
pub const DEFAULT_HEARTBEAT_STALENESS: Duration = Duration::from_secs(30);

/// Coordinator configuration
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Heartbeats older than this make an agent look dead to `ping_all`
    pub heartbeat_staleness: Duration,

    /// Task-kind to agent-role routing table
    pub routes: RoleRoutes,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            heartbeat_staleness: DEFAULT_HEARTBEAT_STALENESS,
            routes: RoleRoutes::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Set the heartbeat staleness threshold
    pub fn with_heartbeat_staleness(mut self, staleness: Duration) -> Self {
        self.heartbeat_staleness = staleness;
        self
    }

    /// Set the routing table
    pub fn with_routes(mut self, routes: RoleRoutes) -> Self {
        self.routes = routes;
        self
    }
}

/// Execution entry point implemented by agent runtimes
///
/// The coordinator invokes this and catches every error; agent failures
/// become failed [`TaskResult`]s instead of propagating.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Execute a task and return its outcome
    async fn execute(&self, task: &Task) -> anyhow::Result<TaskResult>;
}

/// Registry of executors, keyed by the agent they embody
pub type ExecutorRegistry = HashMap<AgentId, Arc<dyn AgentExecutor>>;

/// Receiving side of an agent's inbox
///
/// Cloneable handle; `register` returns the same inbox for repeated calls
/// with the same agent id.
#[derive(Debug, Clone)]
pub struct Inbox {
    receiver: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<AgentMessage>>>,
}

impl Inbox {
    fn new(receiver: mpsc::UnboundedReceiver<AgentMessage>) -> Self {
        Self {
            receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
        }
    }

    /// Wait for the next message
    ///
    /// Returns `None` once the coordinator side has been dropped.
    pub async fn recv(&self) -> Option<AgentMessage> {
        self.receiver.lock().await.recv().await
    }

    /// Take the next message if one is already queued
    pub fn try_recv(&self) -> Option<AgentMessage> {
        self.receiver.try_lock().ok()?.try_recv().ok()
    }

    /// Number of queued messages
    pub async fn len(&self) -> usize {
        self.receiver.lock().await.len()
    }

    /// Whether the inbox is currently empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Polling-friendly health snapshot of all registered agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmStats {
    /// Number of registered agents
    pub total_agents: usize,

    /// Per-agent health (status, counters, last heartbeat)
    pub agents: HashMap<AgentId, AgentHealth>,
}

struct Registry {
    /// Registration order, for deterministic routing fallbacks
    order: Vec<AgentId>,
    senders: HashMap<AgentId, mpsc::UnboundedSender<AgentMessage>>,
    inboxes: HashMap<AgentId, Inbox>,
    health: HashMap<AgentId, AgentHealth>,
}

/// The swarm coordinator
pub struct SwarmCoordinator {
    config: CoordinatorConfig,
    registry: RwLock<Registry>,
    results: RwLock<HashMap<TaskId, TaskResult>>,
}

impl Default for SwarmCoordinator {
    fn default() -> Self {
        Self::new(CoordinatorConfig::default())
    }
}

impl SwarmCoordinator {
    /// Create a coordinator with the given configuration
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            registry: RwLock::new(Registry {
                order: Vec::new(),
                senders: HashMap::new(),
                inboxes: HashMap::new(),
                health: HashMap::new(),
            }),
            results: RwLock::new(HashMap::new()),
        }
    }

    /// Register an agent, creating its inbox and health record
    ///
    /// Idempotent: re-registering returns the existing inbox and leaves
    /// the health record untouched.
    pub fn register(&self, agent_id: impl Into<AgentId>, capabilities: CapabilitySet) -> Inbox {
        let agent_id = agent_id.into();
        let mut registry = self.registry.write().unwrap();

        if let Some(inbox) = registry.inboxes.get(&agent_id) {
            return inbox.clone();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let inbox = Inbox::new(rx);
        registry.order.push(agent_id.clone());
        registry.senders.insert(agent_id.clone(), tx);
        registry.inboxes.insert(agent_id.clone(), inbox.clone());
        registry
            .health
            .insert(agent_id.clone(), AgentHealth::new(capabilities));

        tracing::info!(agent = %agent_id, "Agent registered");
        inbox
    }

    /// Enqueue a message onto the target agent's inbox
    ///
    /// Unknown targets are logged and dropped; the caller is unaffected.
    /// Suspends only until the message is enqueued, never until delivery.
    pub async fn send(&self, message: AgentMessage) {
        let registry = self.registry.read().unwrap();
        match registry.senders.get(&message.to) {
            Some(sender) => {
                if sender.send(message).is_err() {
                    tracing::warn!("Dropping message: inbox closed");
                }
            }
            None => {
                tracing::warn!(
                    to = %message.to,
                    kind = %message.kind(),
                    "Dropping message to unregistered agent"
                );
            }
        }
    }

    /// Fan out a payload to every registered agent except the sender
    ///
    /// All sends are issued concurrently; completes once every message is
    /// enqueued. No delivery-order guarantee across receivers. Returns the
    /// number of receivers.
    pub async fn broadcast(&self, from: &AgentId, payload: MessagePayload) -> usize {
        let targets: Vec<AgentId> = {
            let registry = self.registry.read().unwrap();
            registry
                .order
                .iter()
                .filter(|id| *id != from)
                .cloned()
                .collect()
        };

        join_all(
            targets
                .iter()
                .map(|to| self.send(AgentMessage::new(from.clone(), to.clone(), payload.clone()))),
        )
        .await;

        targets.len()
    }

    /// Announce an agent's capabilities to the rest of the swarm
    ///
    /// Registers the agent if necessary, then broadcasts the capability
    /// set. Used once per agent per swarm lifetime; returns the broadcast
    /// receiver count without waiting for acknowledgements.
    pub async fn handshake(&self, agent_id: impl Into<AgentId>, capabilities: CapabilitySet) -> usize {
        let agent_id = agent_id.into();
        self.register(agent_id.clone(), capabilities.clone());

        {
            let mut registry = self.registry.write().unwrap();
            if let Some(health) = registry.health.get_mut(&agent_id) {
                health.capabilities = capabilities.clone();
                health.touch();
            }
        }

        let count = self
            .broadcast(
                &agent_id,
                MessagePayload::Handshake(HandshakePayload::new(capabilities)),
            )
            .await;
        tracing::info!(agent = %agent_id, receivers = count, "Handshake broadcast");
        count
    }

    /// Select the agent that should execute a task
    ///
    /// Uses the static kind-to-role mapping; when the mapped agent is not
    /// idle, falls back to the first idle agent in registration order, and
    /// under full contention returns the originally mapped agent (the
    /// caller must handle queuing). The idle fallback may pick an agent
    /// without the required capability; that gap is logged, not resolved.
    /// Marks the selected agent as working.
    pub fn route_task(&self, task: &Task) -> AgentId {
        let mut registry = self.registry.write().unwrap();

        let role = self.config.routes.role_for(task.kind()).cloned();
        let mapped: Option<AgentId> = role.as_ref().and_then(|role| {
            registry
                .order
                .iter()
                .find(|id| {
                    registry
                        .health
                        .get(*id)
                        .map(|h| h.capabilities.has_role(role))
                        .unwrap_or(false)
                })
                .cloned()
        });

        let mapped_is_idle = mapped
            .as_ref()
            .and_then(|id| registry.health.get(id))
            .map(|h| h.status.is_available())
            .unwrap_or(false);

        let selected = match mapped {
            Some(id) if mapped_is_idle => id,
            mapped => {
                let idle = registry
                    .order
                    .iter()
                    .find(|id| {
                        registry
                            .health
                            .get(*id)
                            .map(|h| h.status.is_available())
                            .unwrap_or(false)
                    })
                    .cloned();

                match idle {
                    Some(id) => {
                        if let (Some(role), Some(health)) = (&role, registry.health.get(&id)) {
                            if !health.capabilities.has_role(role) {
                                tracing::warn!(
                                    task = %task.id,
                                    agent = %id,
                                    role = %role,
                                    "Idle fallback routed task to agent without required role"
                                );
                            }
                        }
                        id
                    }
                    // Full contention: hand back the mapped agent (or the
                    // planner's assignment when nothing covers the role)
                    None => mapped.unwrap_or_else(|| task.agent_id.clone()),
                }
            }
        };

        if let Some(health) = registry.health.get_mut(&selected) {
            health.status = AgentStatus::Working;
            health.touch();
        }

        tracing::debug!(task = %task.id, agent = %selected, "Task routed");
        selected
    }

    /// Route and execute a task, converting any agent error into a failed
    /// result
    ///
    /// Updates the selected agent's health counters and caches the result
    /// by task id. This is the sole blocking point in the dispatch path.
    pub async fn execute_swarm_task(
        &self,
        task: &Task,
        executors: &ExecutorRegistry,
    ) -> TaskResult {
        let agent_id = self.route_task(task);
        let start = Instant::now();

        let outcome = match executors.get(&agent_id) {
            Some(executor) => executor.execute(task).await,
            None => Err(anyhow::anyhow!("no executor registered for agent {}", agent_id)),
        };

        let elapsed = start.elapsed();
        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(task = %task.id, agent = %agent_id, error = %e, "Task execution failed");
                TaskResult::failed(task.id.clone(), e.to_string(), elapsed)
            }
        };

        {
            let mut registry = self.registry.write().unwrap();
            if let Some(health) = registry.health.get_mut(&agent_id) {
                if result.is_success() {
                    health.record_success(elapsed);
                } else {
                    health.record_failure(elapsed);
                }
            }
        }

        self.results
            .write()
            .unwrap()
            .insert(task.id.clone(), result.clone());
        result
    }

    /// Probe every registered agent and report a soft liveness map
    ///
    /// "Alive" means the agent's heartbeat is younger than the configured
    /// staleness threshold; a busy agent can be silent and still alive.
    pub async fn ping_all(&self) -> HashMap<AgentId, bool> {
        let (targets, liveness): (Vec<AgentId>, HashMap<AgentId, bool>) = {
            let registry = self.registry.read().unwrap();
            let liveness = registry
                .health
                .iter()
                .map(|(id, health)| {
                    (id.clone(), health.is_alive(self.config.heartbeat_staleness))
                })
                .collect();
            (registry.order.clone(), liveness)
        };

        join_all(targets.iter().map(|to| {
            self.send(AgentMessage::new(
                AgentId::coordinator(),
                to.clone(),
                MessagePayload::Ping(PingPayload::now()),
            ))
        }))
        .await;

        liveness
    }

    /// Refresh an agent's heartbeat timestamp
    pub fn record_heartbeat(&self, agent_id: &AgentId) {
        let mut registry = self.registry.write().unwrap();
        if let Some(health) = registry.health.get_mut(agent_id) {
            health.touch();
        }
    }

    /// Set an agent's status directly (e.g. back to idle after a result is
    /// collected)
    pub fn update_status(&self, agent_id: &AgentId, status: AgentStatus) {
        let mut registry = self.registry.write().unwrap();
        if let Some(health) = registry.health.get_mut(agent_id) {
            let old = health.status;
            health.status = status;
            tracing::debug!(agent = %agent_id, from = old.as_str(), to = status.as_str(), "Agent status changed");
        }
    }

    /// Current health record for an agent
    pub fn agent_health(&self, agent_id: &AgentId) -> Option<AgentHealth> {
        self.registry.read().unwrap().health.get(agent_id).cloned()
    }

    /// Cached result of a previously executed task
    pub fn result_for(&self, task_id: &TaskId) -> Option<TaskResult> {
        self.results.read().unwrap().get(task_id).cloned()
    }

    /// Health snapshot across all registered agents
    pub fn swarm_stats(&self) -> SwarmStats {
        let registry = self.registry.read().unwrap();
        SwarmStats {
            total_agents: registry.order.len(),
            agents: registry.health.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::message::QueryPayload;
    use crate::swarm::{AgentRole, TaskPayload, TaskStatus};

    fn coordinator() -> SwarmCoordinator {
        SwarmCoordinator::default()
    }

    fn caps(role: AgentRole) -> CapabilitySet {
        CapabilitySet::new([role])
    }

    fn code_task(id: &str) -> Task {
        Task::new(
            id,
            "swarm-1",
            "coder-1",
            "Implement",
            TaskPayload::Code { features: vec![] },
        )
    }

    struct OkExecutor;

    #[async_trait]
    impl AgentExecutor for OkExecutor {
        async fn execute(&self, task: &Task) -> anyhow::Result<TaskResult> {
            Ok(TaskResult::completed(
                task.id.clone(),
                serde_json::json!({"ok": true}),
                Duration::from_millis(1),
            ))
        }
    }

    struct FailingExecutor;

    #[async_trait]
    impl AgentExecutor for FailingExecutor {
        async fn execute(&self, _task: &Task) -> anyhow::Result<TaskResult> {
            Err(anyhow::anyhow!("model overloaded"))
        }
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let coordinator = coordinator();
        let inbox1 = coordinator.register("coder-1", caps(AgentRole::Coder));
        let inbox2 = coordinator.register("coder-1", caps(AgentRole::Coder));

        // Same underlying queue: a message shows up through either handle
        coordinator
            .send(AgentMessage::new(
                "planner-1",
                "coder-1",
                MessagePayload::Query(QueryPayload::new("ready?")),
            ))
            .await;
        assert_eq!(inbox1.len().await, 1);
        assert!(inbox2.try_recv().is_some());
        assert!(inbox1.is_empty().await);

        assert_eq!(coordinator.swarm_stats().total_agents, 1);
    }

    #[tokio::test]
    async fn test_send_preserves_fifo_order() {
        let coordinator = coordinator();
        let inbox = coordinator.register("coder-1", caps(AgentRole::Coder));

        for i in 0..3 {
            coordinator
                .send(AgentMessage::new(
                    "planner-1",
                    "coder-1",
                    MessagePayload::Query(QueryPayload::new(format!("q{}", i))),
                ))
                .await;
        }

        for i in 0..3 {
            let msg = inbox.recv().await.unwrap();
            match msg.payload {
                MessagePayload::Query(q) => assert_eq!(q.question, format!("q{}", i)),
                other => panic!("unexpected payload: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_send_to_unregistered_is_dropped_silently() {
        let coordinator = coordinator();
        // No panic, no error surfaced to the caller
        coordinator
            .send(AgentMessage::new(
                "planner-1",
                "ghost",
                MessagePayload::Query(QueryPayload::new("anyone there?")),
            ))
            .await;
    }

    #[tokio::test]
    async fn test_handshake_broadcasts_to_all_others() {
        let coordinator = coordinator();
        coordinator.register("planner-1", caps(AgentRole::Planner));
        let coder_inbox = coordinator.register("coder-1", caps(AgentRole::Coder));
        let tester_inbox = coordinator.register("tester-1", caps(AgentRole::Tester));

        let count = coordinator
            .handshake("planner-1", caps(AgentRole::Planner))
            .await;
        assert_eq!(count, 2);

        for inbox in [&coder_inbox, &tester_inbox] {
            let msg = inbox.recv().await.unwrap();
            assert!(msg.is_handshake());
            assert_eq!(msg.kind().to_string(), "handshake");
            assert_eq!(msg.from.as_str(), "planner-1");
        }
    }

    #[tokio::test]
    async fn test_handshake_registers_unknown_agent() {
        let coordinator = coordinator();
        coordinator.register("coder-1", caps(AgentRole::Coder));

        let count = coordinator
            .handshake("planner-1", caps(AgentRole::Planner))
            .await;
        assert_eq!(count, 1);
        assert!(coordinator
            .agent_health(&AgentId::new("planner-1"))
            .is_some());
    }

    #[tokio::test]
    async fn test_route_task_prefers_mapped_idle_agent() {
        let coordinator = coordinator();
        coordinator.register("planner-1", caps(AgentRole::Planner));
        coordinator.register("coder-1", caps(AgentRole::Coder));

        let selected = coordinator.route_task(&code_task("t1"));
        assert_eq!(selected.as_str(), "coder-1");
        assert_eq!(
            coordinator
                .agent_health(&selected)
                .unwrap()
                .status,
            AgentStatus::Working
        );
    }

    #[tokio::test]
    async fn test_route_task_falls_back_to_first_idle() {
        let coordinator = coordinator();
        coordinator.register("planner-1", caps(AgentRole::Planner));
        coordinator.register("coder-1", caps(AgentRole::Coder));
        coordinator.update_status(&AgentId::new("coder-1"), AgentStatus::Working);

        // Documented latent gap: the idle fallback ignores capabilities
        let selected = coordinator.route_task(&code_task("t1"));
        assert_eq!(selected.as_str(), "planner-1");
    }

    #[tokio::test]
    async fn test_route_task_contention_returns_mapped_agent() {
        let coordinator = coordinator();
        coordinator.register("planner-1", caps(AgentRole::Planner));
        coordinator.register("coder-1", caps(AgentRole::Coder));
        coordinator.update_status(&AgentId::new("planner-1"), AgentStatus::Working);
        coordinator.update_status(&AgentId::new("coder-1"), AgentStatus::Working);

        let selected = coordinator.route_task(&code_task("t1"));
        assert_eq!(selected.as_str(), "coder-1");
    }

    #[tokio::test]
    async fn test_execute_swarm_task_success_updates_health() {
        let coordinator = coordinator();
        coordinator.register("coder-1", caps(AgentRole::Coder));

        let mut executors: ExecutorRegistry = HashMap::new();
        executors.insert(AgentId::new("coder-1"), Arc::new(OkExecutor));

        let task = code_task("t1");
        let result = coordinator.execute_swarm_task(&task, &executors).await;
        assert!(result.is_success());

        let health = coordinator.agent_health(&AgentId::new("coder-1")).unwrap();
        assert_eq!(health.tasks_completed, 1);
        assert_eq!(health.status, AgentStatus::Completed);

        // Result cached by task id
        let cached = coordinator.result_for(&task.id).unwrap();
        assert_eq!(cached.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_execute_swarm_task_catches_agent_errors() {
        let coordinator = coordinator();
        coordinator.register("coder-1", caps(AgentRole::Coder));

        let mut executors: ExecutorRegistry = HashMap::new();
        executors.insert(AgentId::new("coder-1"), Arc::new(FailingExecutor));

        let result = coordinator
            .execute_swarm_task(&code_task("t1"), &executors)
            .await;
        assert!(!result.is_success());
        assert!(result.error.as_deref().unwrap().contains("model overloaded"));

        let health = coordinator.agent_health(&AgentId::new("coder-1")).unwrap();
        assert_eq!(health.tasks_failed, 1);
        assert_eq!(health.status, AgentStatus::Failed);
    }

    #[tokio::test]
    async fn test_execute_without_executor_fails_cleanly() {
        let coordinator = coordinator();
        coordinator.register("coder-1", caps(AgentRole::Coder));

        let result = coordinator
            .execute_swarm_task(&code_task("t1"), &HashMap::new())
            .await;
        assert!(!result.is_success());
        assert!(result.error.as_deref().unwrap().contains("no executor"));
    }

    #[tokio::test]
    async fn test_ping_all_reports_fresh_heartbeats() {
        let coordinator = coordinator();
        let planner_inbox = coordinator.register("planner-1", caps(AgentRole::Planner));
        coordinator.register("coder-1", caps(AgentRole::Coder));

        let liveness = coordinator.ping_all().await;
        assert_eq!(liveness.len(), 2);
        assert!(liveness.values().all(|alive| *alive));

        // Each agent got a ping probe
        let msg = planner_inbox.recv().await.unwrap();
        assert!(msg.is_ping());
        assert_eq!(msg.from, AgentId::coordinator());
    }

    #[tokio::test]
    async fn test_ping_all_flags_stale_heartbeats() {
        let config =
            CoordinatorConfig::default().with_heartbeat_staleness(Duration::from_millis(10));
        let coordinator = SwarmCoordinator::new(config);
        coordinator.register("coder-1", caps(AgentRole::Coder));

        tokio::time::sleep(Duration::from_millis(30)).await;
        let liveness = coordinator.ping_all().await;
        assert_eq!(liveness.get(&AgentId::new("coder-1")), Some(&false));

        // A heartbeat revives it
        coordinator.record_heartbeat(&AgentId::new("coder-1"));
        let liveness = coordinator.ping_all().await;
        assert_eq!(liveness.get(&AgentId::new("coder-1")), Some(&true));
    }

    #[tokio::test]
    async fn test_swarm_stats_snapshot() {
        let coordinator = coordinator();
        coordinator.register("planner-1", caps(AgentRole::Planner));
        coordinator.register("coder-1", caps(AgentRole::Coder));

        let stats = coordinator.swarm_stats();
        assert_eq!(stats.total_agents, 2);
        assert!(stats
            .agents
            .values()
            .all(|h| h.status == AgentStatus::Idle));
    }
}
