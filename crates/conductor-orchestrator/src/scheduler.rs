use crate::config::OrchestratorConfig;
use crate::registry::AgentRegistry;
use crate::task_queue::TaskQueues;
use chrono::{DateTime, Utc};
use conductor_core::{AgentRecord, AgentType, Message, MessagePayload, TaskRequest};
use tracing::{debug, info};

/// Matches pending tasks to healthy agents, one task per type per pass.
///
/// The scheduler only moves queue state and produces dispatch messages;
/// publishing (and the ack wait) is the control loop's job, so a pass is
/// synchronous and never blocks on the bus.
pub struct Scheduler {
    ack_timeout_ms: u64,
    min_viable_score: f64,
}

impl Scheduler {
    /// Build a scheduler from the orchestrator config.
    pub fn new(config: &OrchestratorConfig) -> Self {
        Self {
            ack_timeout_ms: config.dispatch_ack_timeout_ms,
            min_viable_score: config.min_viable_score,
        }
    }

    /// Load-balancing score for one agent, clamped to [0, 100].
    ///
    /// `100 − 0.3·cpu − 20·mem − 5·active + 20·(1 − failure_rate)`.
    /// An agent without a health snapshot scores zero.
    pub fn score(record: &AgentRecord) -> f64 {
        let Some(health) = record.health.as_ref() else {
            return 0.0;
        };
        let raw = 100.0 - 0.3 * health.cpu_usage - 20.0 * health.memory_usage
            - 5.0 * f64::from(health.active_task_count)
            + 20.0 * (1.0 - health.failure_rate());
        raw.clamp(0.0, 100.0)
    }

    /// Pick the best candidate: highest score above the viability floor,
    /// ties broken by lowest active task count.
    pub fn select<'a>(&self, candidates: &[&'a AgentRecord]) -> Option<&'a AgentRecord> {
        candidates
            .iter()
            .map(|record| (*record, Self::score(record)))
            .filter(|(_, score)| *score > self.min_viable_score)
            .max_by(|(a, score_a), (b, score_b)| {
                score_a
                    .partial_cmp(score_b)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    // Lower active count wins a tie, so it compares as greater.
                    .then_with(|| active_count(b).cmp(&active_count(a)))
            })
            .map(|(record, _)| record)
    }

    /// One assignment pass at `now`.
    ///
    /// For each type with pending work: pick the best healthy agent, move
    /// the highest-priority task into processing, and emit the TASK_REQUEST
    /// to publish. Types with no viable agent keep their tasks queued until
    /// the next tick.
    pub fn assignment_pass(
        &self,
        registry: &AgentRegistry,
        queues: &mut TaskQueues,
        now: DateTime<Utc>,
    ) -> Vec<Message> {
        let mut outgoing = Vec::new();

        for agent_type in queues.types_with_pending() {
            let healthy = registry.list_healthy_at(agent_type, now);
            if healthy.is_empty() {
                debug!(agent_type = %agent_type, "No healthy agents; tasks stay queued");
                continue;
            }
            let Some(chosen) = self.select(&healthy) else {
                debug!(agent_type = %agent_type, "No agent above viability floor");
                continue;
            };
            let agent_id = chosen.agent_id.clone();
            let score = Self::score(chosen);

            let queue = queues.queue_mut(agent_type);
            let Some(task) = queue.pop_next() else {
                continue;
            };

            info!(
                task_id = %task.id,
                task_kind = %task.task_kind,
                agent_id = %agent_id,
                score,
                "Dispatching task"
            );

            let message = Message::to_type(
                AgentType::Orchestrator,
                agent_type,
                MessagePayload::TaskRequest(TaskRequest {
                    task: task.clone(),
                    agent_id: agent_id.clone(),
                }),
            )
            .with_priority(task.priority)
            .with_ack(self.ack_timeout_ms);

            queue.begin_processing(task, &agent_id, message.id, self.ack_timeout_ms);
            outgoing.push(message);
        }

        outgoing
    }
}

fn active_count(record: &AgentRecord) -> u32 {
    record.health.as_ref().map_or(0, |h| h.active_task_count)
}
