//! Agent runtime for Conductor workers.
//!
//! Every worker process implements the [`AgentHandler`] contract and hands it
//! to an [`AgentRuntime`], which owns the bus subscription, the bounded
//! worker pool, heartbeat publishing, and graceful drain on stop. A failing
//! task never takes the agent process down: handler errors are converted
//! into failed task results and reported back to the orchestrator.
//!
//! # Main types
//!
//! - [`AgentHandler`] — The contract a worker implements (validate, process,
//!   health check, lifecycle hooks).
//! - [`AgentRuntime`] — Drives a handler against the message bus.
//! - [`AgentRuntimeConfig`] — Worker pool size, heartbeat cadence, timeouts.

/// Runtime configuration.
pub mod config;
/// The worker contract.
pub mod handler;
/// The runtime that drives a handler against the bus.
pub mod runtime;

pub use config::AgentRuntimeConfig;
pub use handler::AgentHandler;
pub use runtime::AgentRuntime;
