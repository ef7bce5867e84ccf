use crate::types::AgentCounts;
use chrono::{DateTime, Duration, Utc};
use conductor_core::{AgentRecord, AgentStatus, AgentType, HealthSnapshot};
use std::collections::HashMap;
use tracing::{debug, info};

/// Orchestrator-side table of known agents.
///
/// The single source of truth the scheduler consults. Records are never
/// hard-deleted: offline agents stay for audit and are simply excluded
/// from scheduling. Mutation happens only inside the orchestrator's state
/// lock, so the plain map needs no interior synchronization of its own.
pub struct AgentRegistry {
    records: HashMap<String, AgentRecord>,
    liveness_window: Duration,
}

impl AgentRegistry {
    /// Create a registry whose healthy predicate and demotion threshold use
    /// the given silence window.
    pub fn new(offline_threshold_ms: u64) -> Self {
        Self {
            records: HashMap::new(),
            liveness_window: Duration::milliseconds(offline_threshold_ms as i64),
        }
    }

    /// Register an agent or refresh an existing record back to online.
    pub fn upsert_online(
        &mut self,
        agent_id: &str,
        agent_type: AgentType,
        capabilities: Vec<String>,
    ) {
        match self.records.get_mut(agent_id) {
            Some(record) => {
                if record.status == AgentStatus::Offline {
                    info!(agent_id, "Agent back online");
                }
                record.status = AgentStatus::Online;
                record.last_seen = Utc::now();
                if !capabilities.is_empty() {
                    record.capabilities = capabilities;
                }
            }
            None => {
                info!(agent_id, agent_type = %agent_type, "Agent registered");
                self.records.insert(
                    agent_id.to_string(),
                    AgentRecord::new(agent_id, agent_type, capabilities),
                );
            }
        }
    }

    /// Overwrite an agent's health snapshot and refresh `last_seen`.
    /// Returns false for an unknown agent id.
    pub fn record_health(&mut self, agent_id: &str, snapshot: HealthSnapshot) -> bool {
        match self.records.get_mut(agent_id) {
            Some(record) => {
                record.last_seen = Utc::now();
                record.health = Some(snapshot);
                true
            }
            None => {
                debug!(agent_id, "Health report from unregistered agent");
                false
            }
        }
    }

    /// Demote an agent; it keeps its record but leaves the scheduling pool.
    /// Returns false for an unknown agent id.
    pub fn mark_offline(&mut self, agent_id: &str) -> bool {
        match self.records.get_mut(agent_id) {
            Some(record) => {
                record.status = AgentStatus::Offline;
                true
            }
            None => false,
        }
    }

    /// Look up one record.
    pub fn get(&self, agent_id: &str) -> Option<&AgentRecord> {
        self.records.get(agent_id)
    }

    pub(crate) fn get_mut(&mut self, agent_id: &str) -> Option<&mut AgentRecord> {
        self.records.get_mut(agent_id)
    }

    /// All records, sorted by agent id for stable output.
    pub fn all(&self) -> Vec<AgentRecord> {
        let mut records: Vec<AgentRecord> = self.records.values().cloned().collect();
        records.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        records
    }

    /// Whether a record passes the healthy predicate at `now`:
    /// online, recently seen, self-reported healthy, and not saturated.
    pub fn is_healthy(&self, record: &AgentRecord, now: DateTime<Utc>) -> bool {
        record.status == AgentStatus::Online
            && now - record.last_seen <= self.liveness_window
            && record.health.as_ref().is_some_and(|h| {
                h.is_healthy && h.memory_usage < 0.9 && h.cpu_usage < 90.0
            })
    }

    /// Agents of one type passing the healthy predicate right now.
    pub fn list_healthy(&self, agent_type: AgentType) -> Vec<&AgentRecord> {
        self.list_healthy_at(agent_type, Utc::now())
    }

    /// Same as [`list_healthy`](Self::list_healthy) with an explicit clock.
    pub fn list_healthy_at(
        &self,
        agent_type: AgentType,
        now: DateTime<Utc>,
    ) -> Vec<&AgentRecord> {
        self.records
            .values()
            .filter(|r| r.agent_type == agent_type && self.is_healthy(r, now))
            .collect()
    }

    /// Online agents silent past the window at `now`; demotion candidates.
    pub fn silent_since(&self, now: DateTime<Utc>) -> Vec<String> {
        self.records
            .values()
            .filter(|r| {
                r.status == AgentStatus::Online && now - r.last_seen > self.liveness_window
            })
            .map(|r| r.agent_id.clone())
            .collect()
    }

    /// Registry-wide tallies for the status API.
    pub fn counts(&self) -> AgentCounts {
        let now = Utc::now();
        let mut counts = AgentCounts::default();
        for record in self.records.values() {
            match record.status {
                AgentStatus::Online => counts.online += 1,
                AgentStatus::Offline => counts.offline += 1,
            }
            if self.is_healthy(record, now) {
                counts.healthy += 1;
            }
        }
        counts
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn healthy_snapshot() -> HealthSnapshot {
        HealthSnapshot {
            cpu_usage: 10.0,
            memory_usage: 0.2,
            ..HealthSnapshot::default()
        }
    }

    fn registry_with_agent(agent_id: &str) -> AgentRegistry {
        let mut registry = AgentRegistry::new(120_000);
        registry.upsert_online(agent_id, AgentType::Generator, vec!["draft_post".into()]);
        registry.record_health(agent_id, healthy_snapshot());
        registry
    }

    #[test]
    fn test_upsert_creates_then_refreshes() {
        let mut registry = AgentRegistry::new(120_000);
        registry.upsert_online("gen-1", AgentType::Generator, vec!["draft_post".into()]);
        assert_eq!(registry.get("gen-1").unwrap().status, AgentStatus::Online);

        registry.mark_offline("gen-1");
        assert_eq!(registry.get("gen-1").unwrap().status, AgentStatus::Offline);

        // Heartbeat with no capability change keeps the declared set.
        registry.upsert_online("gen-1", AgentType::Generator, vec![]);
        let record = registry.get("gen-1").unwrap();
        assert_eq!(record.status, AgentStatus::Online);
        assert_eq!(record.capabilities, vec!["draft_post".to_string()]);
    }

    #[test]
    fn test_record_health_unknown_agent() {
        let mut registry = AgentRegistry::new(120_000);
        assert!(!registry.record_health("ghost", healthy_snapshot()));
    }

    #[test]
    fn test_offline_agent_not_healthy() {
        let mut registry = registry_with_agent("gen-1");
        assert_eq!(registry.list_healthy(AgentType::Generator).len(), 1);

        registry.mark_offline("gen-1");
        assert!(registry.list_healthy(AgentType::Generator).is_empty());
        // Record survives demotion for audit.
        assert!(registry.get("gen-1").is_some());
    }

    #[test]
    fn test_stale_last_seen_not_healthy() {
        let mut registry = registry_with_agent("gen-1");
        registry.get_mut("gen-1").unwrap().last_seen = Utc::now() - Duration::milliseconds(125_000);
        assert!(registry.list_healthy(AgentType::Generator).is_empty());
    }

    #[test]
    fn test_saturated_agent_not_healthy() {
        let mut registry = registry_with_agent("gen-1");

        registry.record_health(
            "gen-1",
            HealthSnapshot {
                memory_usage: 0.95,
                ..healthy_snapshot()
            },
        );
        assert!(registry.list_healthy(AgentType::Generator).is_empty());

        registry.record_health(
            "gen-1",
            HealthSnapshot {
                cpu_usage: 95.0,
                ..healthy_snapshot()
            },
        );
        assert!(registry.list_healthy(AgentType::Generator).is_empty());

        registry.record_health(
            "gen-1",
            HealthSnapshot {
                is_healthy: false,
                ..healthy_snapshot()
            },
        );
        assert!(registry.list_healthy(AgentType::Generator).is_empty());
    }

    #[test]
    fn test_no_health_snapshot_not_healthy() {
        let mut registry = AgentRegistry::new(120_000);
        registry.upsert_online("gen-1", AgentType::Generator, vec![]);
        assert!(registry.list_healthy(AgentType::Generator).is_empty());
    }

    #[test]
    fn test_list_healthy_filters_by_type() {
        let mut registry = registry_with_agent("gen-1");
        registry.upsert_online("val-1", AgentType::Validator, vec![]);
        registry.record_health("val-1", healthy_snapshot());

        let healthy = registry.list_healthy(AgentType::Generator);
        assert_eq!(healthy.len(), 1);
        assert_eq!(healthy[0].agent_id, "gen-1");
    }

    #[test]
    fn test_silent_since() {
        let mut registry = registry_with_agent("gen-1");
        registry.upsert_online("gen-2", AgentType::Generator, vec![]);
        registry.get_mut("gen-1").unwrap().last_seen = Utc::now() - Duration::milliseconds(125_000);

        let silent = registry.silent_since(Utc::now());
        assert_eq!(silent, vec!["gen-1".to_string()]);
    }

    #[test]
    fn test_counts() {
        let mut registry = registry_with_agent("gen-1");
        registry.upsert_online("gen-2", AgentType::Generator, vec![]);
        registry.upsert_online("val-1", AgentType::Validator, vec![]);
        registry.mark_offline("val-1");

        let counts = registry.counts();
        assert_eq!(counts.online, 2);
        assert_eq!(counts.offline, 1);
        // Only gen-1 has a healthy snapshot.
        assert_eq!(counts.healthy, 1);
    }
}
