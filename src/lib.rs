//! Waggle - Swarm Coordination and Scheduling for Multi-Agent Task Execution
//!
//! Waggle coordinates a small fleet of specialized worker agents that
//! jointly execute a decomposed unit of work (a "swarm"): a directed set
//! of tasks with dependencies, assigned across a handful of agents,
//! subject to liveness monitoring, automatic retry, and service-level
//! objectives.
//!
//! # Architecture
//!
//! - **swarm**: Core data model (ids, agents, tasks, swarms, plans)
//! - **store**: Durable Task Store (SQLite) - the single source of truth
//! - **coordinator**: Per-agent message queues, health tracking, routing
//! - **scheduler**: Dependency readiness, cycle detection, progress
//! - **monitor**: Self-healing retry loop with exponential backoff
//! - **slo**: Post-hoc compliance scoring against fixed thresholds
//! - **config**: YAML configuration for every interval and threshold
//!
//! This is a library-level subsystem meant to be embedded behind an
//! HTTP/RPC layer owned by a hosting service; no wire protocol is owned
//! here.

// Core modules
pub mod config;
pub mod error;
pub mod logging;
pub mod swarm;

// Components
pub mod coordinator;
pub mod monitor;
pub mod scheduler;
pub mod slo;
pub mod store;

// Re-exports
pub use error::{Result, WaggleError};
