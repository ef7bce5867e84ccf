//! Core types and error definitions for the Conductor orchestration framework.
//!
//! This crate provides the foundational types shared across all Conductor
//! crates: the unified error enum, the bus message envelope, the task model,
//! and the agent model (types, records, health snapshots).
//!
//! # Main types
//!
//! - [`ConductorError`] — Unified error enum for all Conductor subsystems.
//! - [`ConductorResult`] — Convenience alias for `Result<T, ConductorError>`.
//! - [`AgentType`] — Closed set of worker roles known at compile time.
//! - [`AgentRecord`] — Registry entry for one live worker process.
//! - [`HealthSnapshot`] — Latest self-reported health of an agent.
//! - [`Task`] — One unit of routed work with a bounded retry budget.
//! - [`Message`] — Envelope exchanged on the message bus.
//! - [`MessagePayload`] — Tagged union of the five message kinds.

/// Agent model: worker types, registry records, health snapshots.
pub mod agent;
/// Bus message envelope and payload variants.
pub mod message;
/// Task model: unit of work, status, failure classification.
pub mod task;

pub use agent::{AgentRecord, AgentStatus, AgentType, HealthSnapshot};
pub use message::{
    ErrorReport, LearningUpdate, Message, MessagePayload, MessageTarget, Priority, StatusUpdate,
    TaskRequest, TaskResult, DEFAULT_ACK_TIMEOUT_MS,
};
pub use task::{Task, TaskError, TaskFailureKind, TaskStatus};

/// Top-level error type for the Conductor framework.
///
/// Each variant corresponds to a subsystem or failure class that can
/// surface through the orchestration core.
#[derive(Debug, thiserror::Error)]
pub enum ConductorError {
    /// The message transport cannot accept or deliver a message.
    #[error("Bus unavailable: {0}")]
    BusUnavailable(String),

    /// No acknowledgment arrived before the sender's timer fired.
    #[error("Acknowledgment timed out after {0} ms")]
    AckTimeout(u64),

    /// A task failed structural validation; terminal, never retried.
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    /// An agent's task execution raised an error; retried up to the budget.
    #[error("Task execution failed: {0}")]
    Execution(String),

    /// An error in the agent runtime outside of task execution.
    #[error("Agent error: {0}")]
    Agent(String),

    /// An error in registry bookkeeping (unknown agent id, etc.).
    #[error("Registry error: {0}")]
    Registry(String),

    /// An error from the orchestrator control loop or its public API.
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`ConductorError`].
pub type ConductorResult<T> = Result<T, ConductorError>;
