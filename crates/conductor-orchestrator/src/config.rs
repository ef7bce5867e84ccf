use serde::{Deserialize, Serialize};

/// Tunables for the orchestrator control loop and its components.
///
/// All durations are milliseconds so tests can shrink them freely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Control loop cadence: assignment pass, timeout expiry, health sweep,
    /// history pruning.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Silence after which an online agent is demoted (two missed
    /// heartbeats at the default heartbeat cadence). Also the `last_seen`
    /// window of the healthy predicate.
    #[serde(default = "default_offline_threshold_ms")]
    pub offline_threshold_ms: u64,
    /// Acknowledgment window on dispatched task requests.
    #[serde(default = "default_dispatch_ack_timeout_ms")]
    pub dispatch_ack_timeout_ms: u64,
    /// Retry budget per task; exceeding it is permanent failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Candidates scoring at or below this are not assignable.
    #[serde(default)]
    pub min_viable_score: f64,
    /// Rolling window for completed/failed history.
    #[serde(default = "default_history_retention_ms")]
    pub history_retention_ms: u64,
    /// Hard cap on each history list, oldest dropped first.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
}

fn default_tick_interval_ms() -> u64 {
    5_000
}

fn default_offline_threshold_ms() -> u64 {
    120_000
}

fn default_dispatch_ack_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_history_retention_ms() -> u64 {
    24 * 60 * 60 * 1_000
}

fn default_history_cap() -> usize {
    1_000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            offline_threshold_ms: default_offline_threshold_ms(),
            dispatch_ack_timeout_ms: default_dispatch_ack_timeout_ms(),
            max_retries: default_max_retries(),
            min_viable_score: 0.0,
            history_retention_ms: default_history_retention_ms(),
            history_cap: default_history_cap(),
        }
    }
}
