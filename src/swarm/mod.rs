//! Core swarm data model
//!
//! Defines the durable shapes the whole subsystem operates on:
//!
//! - [`SwarmId`] / [`AgentId`] / [`TaskId`] - type-safe identifiers
//! - [`AgentRole`], [`CapabilitySet`], [`AgentHealth`] - who can do what,
//!   and how healthy they are
//! - [`Task`], [`TaskPayload`], [`TaskResult`] - units of work and their
//!   outcomes
//! - [`Swarm`], [`SwarmPlan`], [`RoleRoutes`] - the aggregate, the planner
//!   submission and the kind-to-role routing table

mod agent;
mod ids;
mod swarm;
mod task;

pub use agent::{AgentHealth, AgentRecord, AgentRole, AgentStatus, CapabilitySet};
pub use ids::{AgentId, SwarmId, TaskId};
pub use swarm::{
    derive_status, AgentSpec, RoleRoutes, Swarm, SwarmMetadata, SwarmPlan, SwarmSnapshot,
    SwarmStatus,
};
pub use task::{
    Task, TaskKind, TaskPayload, TaskResult, TaskStatus, DEFAULT_PRIORITY,
};

pub(crate) use ids::unique_suffix;
pub(crate) use task::duration_seconds;
