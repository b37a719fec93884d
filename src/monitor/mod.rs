//! Recovery Monitor - self-healing retry loop
//!
//! A periodic process that scans the Task Store for failed tasks and
//! re-queues them with bounded exponential backoff, recording every
//! intervention as a queryable event. Task-level failures never crash the
//! coordination loop; exhausting the retry budget leaves a task
//! permanently failed with a terminal audit event.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use waggle::monitor::{MonitorCommand, MonitorConfig, RecoveryMonitor};
//! use waggle::store::SwarmStore;
//!
//! # async fn demo() -> waggle::Result<()> {
//! let store = Arc::new(SwarmStore::open_in_memory()?);
//! let mut monitor = RecoveryMonitor::new(store, MonitorConfig::default());
//!
//! let commands = monitor.command_sender();
//! let mut events = monitor.subscribe();
//!
//! tokio::spawn(async move { monitor.run().await });
//! // ... later
//! commands.send(MonitorCommand::Shutdown).await.ok();
//! # Ok(())
//! # }
//! ```

mod daemon;
pub mod metrics;

pub use daemon::{
    HealthSummary, MonitorCommand, MonitorConfig, MonitorEvent, RecoveryMonitor,
    DEFAULT_AGENT_STALENESS, DEFAULT_BACKOFF_BASE, DEFAULT_EVENT_CHANNEL_CAPACITY,
    DEFAULT_HEALTH_REPORT_EVERY, DEFAULT_MAX_RETRIES, DEFAULT_POLL_INTERVAL, DEFAULT_RETRY_WINDOW,
};
