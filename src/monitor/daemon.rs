//! Recovery monitor implementation
//!
//! Self-healing loop that scans the store for failed tasks and re-queues
//! them with bounded exponential backoff. Runs as a tokio async event loop
//! with a configurable poll interval.

use super::metrics;
use crate::store::{InterventionEvent, SwarmStore};
use crate::swarm::{Task, TaskId, TaskStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// Default poll interval (10 seconds)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default retry budget per task
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default backoff base (10s, doubling per attempt: 10s, 20s, 40s)
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(10);

/// Default window within which a failed task is still retried (5 minutes)
pub const DEFAULT_RETRY_WINDOW: Duration = Duration::from_secs(300);

/// Default number of cycles between health reports
pub const DEFAULT_HEALTH_REPORT_EVERY: u64 = 10;

/// Default heartbeat staleness threshold for the stale-agent scan
pub const DEFAULT_AGENT_STALENESS: Duration = Duration::from_secs(30);

/// Default event broadcast channel capacity
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Recovery monitor configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Poll interval between store scans
    pub poll_interval: Duration,

    /// Maximum retry attempts per task
    pub max_retries: u32,

    /// Backoff base; attempt n waits `base * 2^(n-1)`
    pub backoff_base: Duration,

    /// Only failures updated within this window are retried
    pub retry_window: Duration,

    /// Emit a health report every this many cycles
    pub health_report_every: u64,

    /// Heartbeat age beyond which a working agent is reported stale
    pub agent_staleness: Duration,

    /// Event broadcast channel capacity
    pub event_channel_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            retry_window: DEFAULT_RETRY_WINDOW,
            health_report_every: DEFAULT_HEALTH_REPORT_EVERY,
            agent_staleness: DEFAULT_AGENT_STALENESS,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl MonitorConfig {
    /// Set the poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the backoff base
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Set the retry window
    pub fn with_retry_window(mut self, window: Duration) -> Self {
        self.retry_window = window;
        self
    }

    /// Set the health report cadence
    pub fn with_health_report_every(mut self, cycles: u64) -> Self {
        self.health_report_every = cycles;
        self
    }

    /// Set the stale-agent threshold
    pub fn with_agent_staleness(mut self, staleness: Duration) -> Self {
        self.agent_staleness = staleness;
        self
    }
}

/// Swarm health summary emitted on the report cadence
#[derive(Debug, Clone)]
pub struct HealthSummary {
    /// Task counts by status
    pub status_counts: HashMap<TaskStatus, usize>,

    /// Retry interventions within the recent window
    pub recent_interventions: usize,

    /// Share of retried tasks that later completed (percentage)
    pub retry_success_rate: f64,
}

/// Events emitted by the recovery monitor
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// Monitor started
    Started,

    /// Monitor stopped
    Stopped,

    /// Poll cycle started
    PollStarted,

    /// Poll cycle completed
    PollCompleted {
        /// Failed tasks observed this cycle
        failed_seen: usize,
        /// Tasks re-queued this cycle
        retried: usize,
    },

    /// A failed task was re-queued
    TaskRetried {
        /// The task
        task_id: TaskId,
        /// Attempt number (1-based)
        attempt: u32,
        /// Backoff waited before the re-queue
        backoff: Duration,
    },

    /// A task exhausted its retry budget and stays failed
    RetriesExhausted {
        /// The task
        task_id: TaskId,
        /// Attempts spent
        attempts: u32,
    },

    /// Periodic health report
    HealthReport(HealthSummary),

    /// Error occurred
    Error {
        /// Error message
        message: String,
    },
}

/// Commands that can be sent to the monitor
#[derive(Debug, Clone)]
pub enum MonitorCommand {
    /// Trigger an immediate poll cycle
    PollNow,

    /// Stop the monitor
    Shutdown,

    /// Set the poll interval
    SetPollInterval(Duration),
}

/// Result of handling a command
enum CommandResult {
    /// Continue running the monitor
    Continue,
    /// Stop the monitor
    Stop,
}

/// Recovery monitor
///
/// The self-healing engine that retries failed tasks without external
/// intervention. Retry state lives in the store's event log, so a
/// restarted monitor resumes with correct attempt counts.
pub struct RecoveryMonitor {
    /// Configuration
    config: MonitorConfig,

    /// Shared Task Store
    store: Arc<SwarmStore>,

    /// Event sender
    event_tx: broadcast::Sender<MonitorEvent>,

    /// Command receiver
    command_rx: Option<mpsc::Receiver<MonitorCommand>>,

    /// Command sender (for cloning)
    command_tx: mpsc::Sender<MonitorCommand>,

    /// Running flag
    running: bool,

    /// Cycle counter
    cycle: u64,
}

impl RecoveryMonitor {
    /// Create a new monitor over the shared store
    pub fn new(store: Arc<SwarmStore>, config: MonitorConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity);
        let (command_tx, command_rx) = mpsc::channel(10);

        Self {
            config,
            store,
            event_tx,
            command_rx: Some(command_rx),
            command_tx,
            running: false,
            cycle: 0,
        }
    }

    /// Get an event subscriber
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.event_tx.subscribe()
    }

    /// Get a command sender
    pub fn command_sender(&self) -> mpsc::Sender<MonitorCommand> {
        self.command_tx.clone()
    }

    /// Send an event, logging if dropped due to no receivers or a full channel
    fn send_event(&self, event: MonitorEvent) {
        match self.event_tx.send(event) {
            Ok(receiver_count) => {
                let capacity = self.config.event_channel_capacity;
                let len = self.event_tx.len();
                if len > capacity * 80 / 100 {
                    tracing::warn!(
                        current = len,
                        capacity = capacity,
                        "Event channel nearing capacity"
                    );
                }
                if receiver_count == 0 {
                    tracing::debug!("Event sent but no receivers subscribed");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Event dropped - no receivers");
            }
        }
    }

    /// Run the monitor event loop
    ///
    /// Polls the store on the configured interval until a `Shutdown`
    /// command arrives. The hosting service owns this future's lifecycle.
    pub async fn run(&mut self) -> crate::Result<()> {
        self.running = true;
        metrics::set_health_status(true);
        self.send_event(MonitorEvent::Started);
        tracing::info!(
            poll_secs = self.config.poll_interval.as_secs_f64(),
            max_retries = self.config.max_retries,
            backoff_secs = self.config.backoff_base.as_secs_f64(),
            "Recovery monitor started"
        );

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut command_rx = self
            .command_rx
            .take()
            .ok_or_else(|| crate::WaggleError::Config("Monitor already running".to_string()))?;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if self.running {
                        self.poll_cycle().await;
                    }
                }
                Some(cmd) = command_rx.recv() => {
                    match self.handle_command(cmd, &mut interval).await {
                        CommandResult::Continue => {}
                        CommandResult::Stop => break,
                    }
                }
            }
        }

        tracing::info!(cycles = self.cycle, "Recovery monitor shutdown complete");
        metrics::set_health_status(false);
        self.send_event(MonitorEvent::Stopped);
        Ok(())
    }

    /// Handle a command
    async fn handle_command(
        &mut self,
        cmd: MonitorCommand,
        interval: &mut tokio::time::Interval,
    ) -> CommandResult {
        match cmd {
            MonitorCommand::PollNow => {
                self.poll_cycle().await;
            }
            MonitorCommand::Shutdown => {
                tracing::info!("Received shutdown command");
                self.running = false;
                return CommandResult::Stop;
            }
            MonitorCommand::SetPollInterval(duration) => {
                *interval = tokio::time::interval(duration);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                self.config.poll_interval = duration;
            }
        }
        CommandResult::Continue
    }

    /// Execute a single poll cycle
    async fn poll_cycle(&mut self) {
        self.cycle += 1;
        self.send_event(MonitorEvent::PollStarted);
        let start = std::time::Instant::now();

        let failed = match self.store.failed_tasks(self.config.retry_window) {
            Ok(tasks) => tasks,
            Err(e) => {
                metrics::record_poll_cycle("error");
                self.send_event(MonitorEvent::Error {
                    message: format!("Failed to scan for failed tasks: {}", e),
                });
                return;
            }
        };
        metrics::set_failed_tasks(failed.len() as i64);

        if !failed.is_empty() {
            tracing::info!(count = failed.len(), cycle = self.cycle, "Found failed tasks");
        }

        let mut retried = 0;
        for task in &failed {
            match self.retry_task(task).await {
                Ok(true) => retried += 1,
                Ok(false) => {}
                Err(e) => {
                    self.send_event(MonitorEvent::Error {
                        message: format!("Retry of {} failed: {}", task.id, e),
                    });
                }
            }
        }

        self.check_stale_agents();

        metrics::record_poll_cycle("success");
        metrics::record_poll_duration(start.elapsed().as_secs_f64());
        self.send_event(MonitorEvent::PollCompleted {
            failed_seen: failed.len(),
            retried,
        });

        if self.cycle % self.config.health_report_every == 0 {
            self.report_health();
        }
    }

    /// Retry one failed task with exponential backoff
    ///
    /// Returns `Ok(true)` if the task was re-queued, `Ok(false)` if its
    /// retry budget is exhausted. Exhaustion emits exactly one terminal
    /// event per task, ever.
    async fn retry_task(&self, task: &Task) -> crate::Result<bool> {
        let attempts = self.store.retry_count(&task.id)?;

        if attempts >= self.config.max_retries {
            if !self.store.has_exhaustion_event(&task.id)? {
                tracing::warn!(
                    task = %task.id,
                    attempts = attempts,
                    "Task exceeded max retries; leaving permanently failed"
                );
                self.store
                    .record_event(&InterventionEvent::exhausted(task, attempts))?;
                metrics::record_exhaustion();
                self.send_event(MonitorEvent::RetriesExhausted {
                    task_id: task.id.clone(),
                    attempts,
                });
            }
            return Ok(false);
        }

        let backoff = self.config.backoff_base * 2u32.pow(attempts);
        let attempt = attempts + 1;
        tracing::info!(
            task = %task.id,
            attempt = attempt,
            max = self.config.max_retries,
            backoff_secs = backoff.as_secs_f64(),
            "Retrying failed task"
        );

        tokio::time::sleep(backoff).await;

        self.store.update_task_status(&task.id, TaskStatus::Pending)?;
        self.store
            .record_event(&InterventionEvent::retry(task, attempt, backoff))?;
        metrics::record_retry();
        self.send_event(MonitorEvent::TaskRetried {
            task_id: task.id.clone(),
            attempt,
            backoff,
        });

        Ok(true)
    }

    /// Report working agents whose heartbeat has gone stale
    ///
    /// Observability only: stale agents are never force-terminated.
    fn check_stale_agents(&self) {
        let agents = match self.store.working_agents() {
            Ok(agents) => agents,
            Err(e) => {
                tracing::warn!(error = %e, "Stale-agent scan failed");
                return;
            }
        };

        let mut stale = 0i64;
        for agent in &agents {
            if !agent.health.is_alive(self.config.agent_staleness) {
                stale += 1;
                tracing::warn!(
                    agent = %agent.id,
                    last_heartbeat = %agent.health.last_heartbeat,
                    "Working agent heartbeat is stale"
                );
            }
        }
        metrics::set_stale_agents(stale);
    }

    /// Log and broadcast swarm health statistics
    fn report_health(&self) {
        let summary = match self.health_summary() {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(error = %e, "Health summary failed");
                return;
            }
        };

        tracing::info!(
            cycle = self.cycle,
            pending = summary.status_counts.get(&TaskStatus::Pending).copied().unwrap_or(0),
            failed = summary.status_counts.get(&TaskStatus::Failed).copied().unwrap_or(0),
            recent_interventions = summary.recent_interventions,
            retry_success_rate = summary.retry_success_rate,
            "Swarm health"
        );
        self.send_event(MonitorEvent::HealthReport(summary));
    }

    /// Compute the current health summary from the store
    pub fn health_summary(&self) -> crate::Result<HealthSummary> {
        Ok(HealthSummary {
            status_counts: self.store.status_counts()?,
            recent_interventions: self.store.recent_interventions(self.config.retry_window * 2)?,
            retry_success_rate: self.store.retry_success_rate()?,
        })
    }
}
