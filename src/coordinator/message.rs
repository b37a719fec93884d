//! Inter-agent message types
//!
//! Defines the envelope and payloads for agent-to-agent communication
//! within a single coordinator process. Messages are ephemeral: consumed
//! once from an inbox, never persisted by the core.

use crate::swarm::{AgentId, CapabilitySet, Task, TaskId, TaskResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique message identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Create a new message ID
    pub fn new() -> Self {
        Self(format!(
            "msg-{}-{}",
            Utc::now().format("%Y%m%d%H%M%S"),
            crate::swarm::unique_suffix()
        ))
    }

    /// Create from an existing string
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

/// Coarse message category, without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Task,
    Result,
    Query,
    Handshake,
    Ping,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Task => write!(f, "task"),
            Self::Result => write!(f, "result"),
            Self::Query => write!(f, "query"),
            Self::Handshake => write!(f, "handshake"),
            Self::Ping => write!(f, "ping"),
        }
    }
}

/// Message type and payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MessagePayload {
    /// Dispatch a task to an agent
    Task(TaskAssignment),

    /// Report a task's outcome back to the coordinator or a peer
    Result(ResultNotice),

    /// Ask a peer agent for information
    Query(QueryPayload),

    /// One-time capability announcement by a newly joined agent
    Handshake(HandshakePayload),

    /// Liveness probe
    Ping(PingPayload),
}

impl MessagePayload {
    /// The coarse kind of this payload
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Task(_) => MessageKind::Task,
            Self::Result(_) => MessageKind::Result,
            Self::Query(_) => MessageKind::Query,
            Self::Handshake(_) => MessageKind::Handshake,
            Self::Ping(_) => MessageKind::Ping,
        }
    }
}

/// Task dispatch payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAssignment {
    /// The task to execute
    pub task: Task,
}

impl TaskAssignment {
    /// Wrap a task for dispatch
    pub fn new(task: Task) -> Self {
        Self { task }
    }
}

/// Task outcome payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultNotice {
    /// The execution result
    pub result: TaskResult,
}

impl ResultNotice {
    /// Wrap a result for reporting
    pub fn new(result: TaskResult) -> Self {
        Self { result }
    }
}

/// Peer query payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPayload {
    /// Question text
    pub question: String,

    /// Optional task the question refers to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
}

impl QueryPayload {
    /// Create a new query
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            task_id: None,
        }
    }

    /// Attach a task reference
    pub fn about_task(mut self, task_id: impl Into<TaskId>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}

/// Handshake payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakePayload {
    /// Capability set being announced
    pub capabilities: CapabilitySet,
}

impl HandshakePayload {
    /// Announce a capability set
    pub fn new(capabilities: CapabilitySet) -> Self {
        Self { capabilities }
    }
}

/// Ping payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingPayload {
    /// When the probe was sent
    pub sent_at: DateTime<Utc>,
}

impl PingPayload {
    /// Create a probe stamped now
    pub fn now() -> Self {
        Self { sent_at: Utc::now() }
    }
}

/// Complete message envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Unique message ID
    pub id: MessageId,

    /// Sender agent id
    pub from: AgentId,

    /// Receiver agent id
    pub to: AgentId,

    /// Message type and payload
    #[serde(flatten)]
    pub payload: MessagePayload,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Optional conversation/swarm correlation id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl AgentMessage {
    /// Create a new message
    pub fn new(from: impl Into<AgentId>, to: impl Into<AgentId>, payload: MessagePayload) -> Self {
        Self {
            id: MessageId::new(),
            from: from.into(),
            to: to.into(),
            payload,
            timestamp: Utc::now(),
            correlation_id: None,
        }
    }

    /// Set the correlation id
    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// The coarse kind of this message
    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    /// Check if this is a handshake announcement
    pub fn is_handshake(&self) -> bool {
        matches!(self.payload, MessagePayload::Handshake(_))
    }

    /// Check if this is a liveness probe
    pub fn is_ping(&self) -> bool {
        matches!(self.payload, MessagePayload::Ping(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::AgentRole;

    #[test]
    fn test_message_id_generation() {
        let id1 = MessageId::new();
        let id2 = MessageId::new();
        assert_ne!(id1.as_str(), id2.as_str());
        assert!(id1.as_str().starts_with("msg-"));
    }

    #[test]
    fn test_payload_tagging() {
        let payload = MessagePayload::Query(QueryPayload::new("Which schema version?"));
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains(r#""type":"query"#));

        let parsed: MessagePayload = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.kind(), MessageKind::Query);
    }

    #[test]
    fn test_full_envelope_roundtrip() {
        let msg = AgentMessage::new(
            "planner-1",
            "coder-1",
            MessagePayload::Handshake(HandshakePayload::new(CapabilitySet::new([
                AgentRole::Planner,
            ]))),
        )
        .with_correlation("swarm-42");

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("planner-1"));
        assert!(json.contains(r#""type":"handshake"#));

        let parsed: AgentMessage = serde_json::from_str(&json).unwrap();
        assert!(parsed.is_handshake());
        assert_eq!(parsed.kind(), MessageKind::Handshake);
        assert_eq!(parsed.correlation_id.as_deref(), Some("swarm-42"));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(MessageKind::Handshake.to_string(), "handshake");
        assert_eq!(MessageKind::Ping.to_string(), "ping");
    }

    #[test]
    fn test_query_builder() {
        let query = QueryPayload::new("Output format?").about_task("task-9");
        assert_eq!(query.task_id, Some(TaskId::new("task-9")));
    }
}
