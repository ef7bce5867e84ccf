use chrono::{DateTime, Utc};
use conductor_core::AgentType;
use serde::Serialize;
use std::collections::HashMap;

/// Sizes of one agent type's queues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueDepths {
    /// Tasks waiting for a healthy agent.
    pub pending: usize,
    /// Tasks dispatched and awaiting a result.
    pub processing: usize,
    /// Completed history (bounded).
    pub completed: usize,
    /// Terminally failed history (bounded).
    pub failed: usize,
}

/// Registry-wide agent tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AgentCounts {
    /// Records with online status.
    pub online: usize,
    /// Records demoted or explicitly gone.
    pub offline: usize,
    /// Online records that also pass the healthy predicate.
    pub healthy: usize,
}

/// Read-only snapshot returned by the orchestrator's status API.
#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    /// When the snapshot was taken.
    pub generated_at: DateTime<Utc>,
    /// Agent tallies across the registry.
    pub agents: AgentCounts,
    /// Queue depths per worker type.
    pub queues: HashMap<AgentType, QueueDepths>,
}
