use serde::{Deserialize, Serialize};

/// Tunables for one [`AgentRuntime`](crate::AgentRuntime) instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRuntimeConfig {
    /// Upper bound on concurrently executing tasks.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    /// How often a heartbeat STATUS_UPDATE is published.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Bound on a single `health_check` call.
    #[serde(default = "default_health_check_timeout_ms")]
    pub health_check_timeout_ms: u64,
    /// How long `stop` waits for in-flight tasks before giving up.
    #[serde(default = "default_drain_grace_ms")]
    pub drain_grace_ms: u64,
}

fn default_max_concurrent_tasks() -> usize {
    4
}

fn default_heartbeat_interval_ms() -> u64 {
    60_000
}

fn default_health_check_timeout_ms() -> u64 {
    5_000
}

fn default_drain_grace_ms() -> u64 {
    10_000
}

impl Default for AgentRuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            health_check_timeout_ms: default_health_check_timeout_ms(),
            drain_grace_ms: default_drain_grace_ms(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentRuntimeConfig::default();
        assert_eq!(config.max_concurrent_tasks, 4);
        assert_eq!(config.heartbeat_interval_ms, 60_000);
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let config: AgentRuntimeConfig =
            serde_json::from_str(r#"{"max_concurrent_tasks": 2}"#).unwrap();
        assert_eq!(config.max_concurrent_tasks, 2);
        assert_eq!(config.drain_grace_ms, 10_000);
    }
}
