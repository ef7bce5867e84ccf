use crate::registry::AgentRegistry;
use crate::task_queue::TaskQueues;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Demotes silent agents and recovers their in-flight work.
///
/// Runs on the same cadence as the scheduler. Demotion fires once per
/// agent: an offline record is no longer a candidate, so a type with zero
/// healthy replacements simply accumulates pending tasks until capacity
/// returns rather than reassigning in a storm.
#[derive(Default)]
pub struct HealthMonitor;

impl HealthMonitor {
    /// Create a monitor.
    pub fn new() -> Self {
        Self
    }

    /// One sweep at `now`: every online agent silent past the registry's
    /// window is marked offline, and every task assigned to it goes back to
    /// pending with its retry count untouched. Returns the demoted ids.
    pub fn sweep(
        &self,
        registry: &mut AgentRegistry,
        queues: &mut TaskQueues,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let silent = registry.silent_since(now);
        for agent_id in &silent {
            registry.mark_offline(agent_id);
            warn!(agent_id = %agent_id, "Agent missed heartbeats; marked offline");

            let requeued = queues.requeue_for_agent(agent_id);
            if requeued > 0 {
                info!(
                    agent_id = %agent_id,
                    requeued,
                    "Requeued in-flight tasks from lost agent"
                );
            }
        }
        silent
    }
}
