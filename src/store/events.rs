//! Intervention events recorded by the recovery monitor
//!
//! Every state transition the monitor performs is logged as a discrete,
//! queryable event. Events are append-only: the retry attempt count for a
//! task is derived from its event history, so a restarted monitor resumes
//! with correct attempt numbers.

use crate::swarm::{SwarmId, Task, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Kind of intervention the monitor performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Failed task re-queued for another attempt
    Retry,

    /// Retry budget exhausted; task left permanently failed
    RetriesExhausted,
}

impl EventKind {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Retry => "retry",
            Self::RetriesExhausted => "retries_exhausted",
        }
    }

    pub(crate) fn from_str(s: &str) -> Self {
        match s {
            "retries_exhausted" => Self::RetriesExhausted,
            _ => Self::Retry,
        }
    }
}

/// One recorded monitor intervention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionEvent {
    /// Unique event id
    pub id: String,

    /// Task the intervention applied to
    pub task_id: TaskId,

    /// Owning swarm
    pub swarm_id: SwarmId,

    /// What happened
    pub kind: EventKind,

    /// Human-readable detail (attempt number, backoff used)
    pub details: String,

    /// When the intervention happened
    pub created_at: DateTime<Utc>,
}

impl InterventionEvent {
    fn new(task: &Task, kind: EventKind, details: String) -> Self {
        Self {
            id: format!("evt-{}", crate::swarm::unique_suffix()),
            task_id: task.id.clone(),
            swarm_id: task.swarm_id.clone(),
            kind,
            details,
            created_at: Utc::now(),
        }
    }

    /// Event for a re-queued task
    pub fn retry(task: &Task, attempt: u32, backoff: Duration) -> Self {
        Self::new(
            task,
            EventKind::Retry,
            format!("Retry #{} after {}s backoff", attempt, backoff.as_secs()),
        )
    }

    /// Terminal event for an exhausted retry budget
    pub fn exhausted(task: &Task, attempts: u32) -> Self {
        Self::new(
            task,
            EventKind::RetriesExhausted,
            format!("Failed after {} attempts", attempts),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::TaskPayload;

    fn make_task() -> Task {
        Task::new(
            "task-1",
            "swarm-1",
            "coder-1",
            "Implement",
            TaskPayload::Code { features: vec![] },
        )
    }

    #[test]
    fn test_retry_event_details() {
        let event = InterventionEvent::retry(&make_task(), 2, Duration::from_secs(20));
        assert_eq!(event.kind, EventKind::Retry);
        assert_eq!(event.details, "Retry #2 after 20s backoff");
        assert_eq!(event.task_id.as_str(), "task-1");
    }

    #[test]
    fn test_exhausted_event_details() {
        let event = InterventionEvent::exhausted(&make_task(), 3);
        assert_eq!(event.kind, EventKind::RetriesExhausted);
        assert_eq!(event.details, "Failed after 3 attempts");
    }

    #[test]
    fn test_kind_roundtrip() {
        assert_eq!(EventKind::from_str("retry"), EventKind::Retry);
        assert_eq!(
            EventKind::from_str("retries_exhausted"),
            EventKind::RetriesExhausted
        );
    }
}
