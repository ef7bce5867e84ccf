use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Role of each worker in the multi-agent system.
///
/// Fixed, closed set known at compile time; the routing key for tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    /// Watches external sources and feeds work into the pipeline.
    Monitor,
    /// Produces content from monitored input.
    Generator,
    /// Checks generated output for structural and quality problems.
    Validator,
    /// Pushes approved output to its destination.
    Publisher,
    /// Tunes pipeline parameters from observed outcomes.
    Optimizer,
    /// The coordinating process itself; owns the registry and queues.
    Orchestrator,
}

impl AgentType {
    /// All worker types, in declaration order.
    pub const ALL: [AgentType; 6] = [
        AgentType::Monitor,
        AgentType::Generator,
        AgentType::Validator,
        AgentType::Publisher,
        AgentType::Optimizer,
        AgentType::Orchestrator,
    ];

    /// Lowercase wire name of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Monitor => "monitor",
            AgentType::Generator => "generator",
            AgentType::Validator => "validator",
            AgentType::Publisher => "publisher",
            AgentType::Optimizer => "optimizer",
            AgentType::Orchestrator => "orchestrator",
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monitor" => Ok(AgentType::Monitor),
            "generator" => Ok(AgentType::Generator),
            "validator" => Ok(AgentType::Validator),
            "publisher" => Ok(AgentType::Publisher),
            "optimizer" => Ok(AgentType::Optimizer),
            "orchestrator" => Ok(AgentType::Orchestrator),
            other => Err(format!("unknown agent type '{other}'")),
        }
    }
}

/// Liveness of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Agent announced itself and heartbeats within the window.
    Online,
    /// Agent stopped or missed heartbeats; excluded from scheduling.
    Offline,
}

/// Latest self-reported health of one agent.
///
/// Owned and overwritten by its [`AgentRecord`]; no independent lifecycle.
/// `cpu_usage` is a percentage (0–100), `memory_usage` a fraction (0–1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// CPU usage in percent, 0–100.
    pub cpu_usage: f64,
    /// Memory usage as a fraction, 0–1.
    pub memory_usage: f64,
    /// Tasks currently executing on the agent.
    pub active_task_count: u32,
    /// Tasks the agent has completed since start.
    pub completed_task_count: u64,
    /// Tasks the agent has failed since start.
    pub failed_task_count: u64,
    /// Agent's own overall verdict.
    pub is_healthy: bool,
}

impl HealthSnapshot {
    /// Fraction of terminal tasks that failed, 0.0 when there is no history.
    pub fn failure_rate(&self) -> f64 {
        let total = self.completed_task_count + self.failed_task_count;
        if total == 0 {
            0.0
        } else {
            self.failed_task_count as f64 / total as f64
        }
    }
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self {
            cpu_usage: 0.0,
            memory_usage: 0.0,
            active_task_count: 0,
            completed_task_count: 0,
            failed_task_count: 0,
            is_healthy: true,
        }
    }
}

/// Registry entry for one live worker process.
///
/// Created on the first online status message, updated on every heartbeat,
/// demoted to offline on timeout or explicit goodbye. Never hard-deleted;
/// offline records stay for audit but are excluded from scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Opaque unique identifier of the worker process.
    pub agent_id: String,
    /// The worker's role.
    pub agent_type: AgentType,
    /// Current liveness.
    pub status: AgentStatus,
    /// When the agent was last heard from.
    pub last_seen: DateTime<Utc>,
    /// Task kinds the agent declared at registration.
    pub capabilities: Vec<String>,
    /// Latest health snapshot, if any heartbeat carried one.
    pub health: Option<HealthSnapshot>,
}

impl AgentRecord {
    /// Create a fresh online record, `last_seen` now.
    pub fn new(
        agent_id: impl Into<String>,
        agent_type: AgentType,
        capabilities: Vec<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_type,
            status: AgentStatus::Online,
            last_seen: Utc::now(),
            capabilities,
            health: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_type_roundtrip() {
        for ty in AgentType::ALL {
            let parsed: AgentType = ty.as_str().parse().unwrap();
            assert_eq!(parsed, ty);
        }
        assert!("librarian".parse::<AgentType>().is_err());
    }

    #[test]
    fn test_agent_type_serde_lowercase() {
        let json = serde_json::to_string(&AgentType::Generator).unwrap();
        assert_eq!(json, "\"generator\"");
    }

    #[test]
    fn test_failure_rate_no_history() {
        let snapshot = HealthSnapshot::default();
        assert_eq!(snapshot.failure_rate(), 0.0);
    }

    #[test]
    fn test_failure_rate() {
        let snapshot = HealthSnapshot {
            completed_task_count: 3,
            failed_task_count: 1,
            ..HealthSnapshot::default()
        };
        assert!((snapshot.failure_rate() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_new_record_is_online() {
        let record = AgentRecord::new("gen-1", AgentType::Generator, vec!["draft".into()]);
        assert_eq!(record.status, AgentStatus::Online);
        assert!(record.health.is_none());
        assert_eq!(record.capabilities, vec!["draft".to_string()]);
    }
}
