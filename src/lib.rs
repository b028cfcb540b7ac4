//! # Mission Control
//!
//! A control plane for autonomous coding/operations agents: a state store of
//! missions, tasks, artifacts, agents, and approvals, gated by a circuit
//! breaker, an execution-authority delegation gate, and a tool-call gate
//! engine, with a watchdog and a self-heal engine running as independent
//! collaborators and a Tool Router binding it all to one HTTP transport.

/// HTTP transport binding (one route per RPC group, `/tools/list`, `/health`)
pub mod api;
/// Circuit breaker behavior: mission and global trip/unlock decisions
pub mod circuit_breaker;
/// Layered configuration loading
pub mod config;
/// System-wide constants and thresholds
pub mod constants;
/// Execution-authority enforcement ahead of the gate engine
pub mod delegation_gate;
/// Error taxonomy for the control plane
pub mod error;
/// Hybrid execution: recipe generation and immediate agent spawn
pub mod execution;
/// The gate engine: breaker, armed-mode, permission, destructive, cost, rate
pub mod gate_engine;
/// Core data models
pub mod models;
/// Per-provider rate limiting, daily quotas, backoff, cost estimation
pub mod rate_limit;
/// Transport-agnostic tool dispatch, session tracking, resume-on-reconnect
pub mod router;
/// Self-heal proposal synthesis and policy-scoped auto-approve
pub mod self_heal;
/// State store: missions/tasks/artifacts/agents/approvals, persistence, events
pub mod state;
/// DAG build, cycle detection, readiness, execution order
pub mod task_graph;
/// Append-only/immutable artifact validation
pub mod validators;
/// The watchdog: heartbeat recovery, signal polling, autonomous missions
pub mod watchdog;

pub use error::{MissionControlError, Result};
