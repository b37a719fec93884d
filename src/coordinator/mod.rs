//! Swarm Coordinator - message passing, liveness and task routing
//!
//! The coordinator manages per-agent inboxes and agent health, performs
//! capability handshakes, routes tasks onto agents and aggregates results.
//!
//! # Guarantees
//!
//! - Per-receiver inboxes are unbounded FIFO queues: messages from one
//!   sender to one receiver preserve enqueue order; nothing is guaranteed
//!   across senders or across receivers of a broadcast.
//! - `send`/`broadcast` suspend only until the message is enqueued.
//! - At-most-once delivery within a single process; no cross-process
//!   durability. Messages to unregistered agents are logged and dropped.
//!
//! # Example
//!
//! ```no_run
//! use waggle::coordinator::{CoordinatorConfig, SwarmCoordinator};
//! use waggle::swarm::{AgentRole, CapabilitySet};
//!
//! # async fn demo() {
//! let coordinator = SwarmCoordinator::new(CoordinatorConfig::default());
//! let inbox = coordinator.register("coder-1", CapabilitySet::new([AgentRole::Coder]));
//!
//! coordinator
//!     .handshake("coder-1", CapabilitySet::new([AgentRole::Coder]))
//!     .await;
//!
//! while let Some(message) = inbox.recv().await {
//!     println!("got {}", message.kind());
//! }
//! # }
//! ```

#[allow(clippy::module_inception)]
mod coordinator;
mod message;

pub use coordinator::{
    AgentExecutor, CoordinatorConfig, ExecutorRegistry, Inbox, SwarmCoordinator, SwarmStats,
    DEFAULT_HEARTBEAT_STALENESS,
};
pub use message::{
    AgentMessage, HandshakePayload, MessageId, MessageKind, MessagePayload, PingPayload,
    QueryPayload, ResultNotice, TaskAssignment,
};
