//! Multi-agent task orchestration engine for Conductor.
//!
//! Implements the orchestrator side of the system: an agent registry fed by
//! status updates, per-type task queues with bounded retry budgets, a
//! load-balancing scheduler, a health monitor that demotes silent agents
//! and recovers their in-flight work, and the periodic control loop that
//! ties them together over the message bus.
//!
//! # Main types
//!
//! - [`Orchestrator`] — Control loop plus the public submission/status API.
//! - [`AgentRegistry`] — Known agents, their capabilities and liveness.
//! - [`TaskQueue`] / [`TaskQueues`] — Pending, processing, and bounded
//!   history per agent type.
//! - [`Scheduler`] — Scores healthy agents and dispatches pending tasks.
//! - [`HealthMonitor`] — Demotes silent agents and requeues their work.
//! - [`OrchestratorConfig`] — Cadences, thresholds, and the retry budget.

/// Control loop configuration.
pub mod config;
/// Orchestration engine and public API.
pub mod engine;
/// Agent health monitoring and demotion.
pub mod monitor;
/// Agent registry.
pub mod registry;
/// Task assignment and load-balancing scores.
pub mod scheduler;
/// Per-type task queues.
pub mod task_queue;
/// Read-only snapshot types for the status API.
pub mod types;

pub use config::OrchestratorConfig;
pub use engine::{Orchestrator, TaskCallback};
pub use monitor::HealthMonitor;
pub use registry::AgentRegistry;
pub use scheduler::Scheduler;
pub use task_queue::{FailureOutcome, InFlightTask, TaskQueue, TaskQueues};
pub use types::{AgentCounts, QueueDepths, SystemHealth};
