use crate::types::QueueDepths;
use chrono::{DateTime, Duration, Utc};
use conductor_core::{AgentType, Task, TaskError, TaskFailureKind, TaskStatus};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// A dispatched task plus its assignment bookkeeping.
///
/// The assignment lives here, never on the task itself, so a dead agent
/// leaves no stale pointer on the task that outlives it.
pub struct InFlightTask {
    /// The authoritative task copy, status `Processing`.
    pub task: Task,
    /// The agent instance the scheduler picked.
    pub agent_id: String,
    /// Id of the TASK_REQUEST message that carried this dispatch. Ties
    /// recovery paths to their own dispatch round: a stale ack waiter
    /// cannot touch a later re-dispatch of the same task.
    pub request_id: Uuid,
    /// When the request went out.
    pub dispatched_at: DateTime<Utc>,
    /// Result window; past it the task is expired and recovered.
    pub timeout_ms: u64,
}

/// What happened to a failed task.
#[derive(Debug, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Pushed back onto pending; carries the new retry count.
    Retried(u32),
    /// Retry budget exhausted or invalid; appended to failed history.
    TerminalFailed,
}

/// Queues for one agent type: pending, processing, and bounded histories.
#[derive(Default)]
pub struct TaskQueue {
    pending: Vec<Task>,
    processing: HashMap<Uuid, InFlightTask>,
    completed: VecDeque<Task>,
    failed: VecDeque<Task>,
}

impl TaskQueue {
    /// Create empty queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task to pending, keeping the list priority-ordered
    /// (highest first, FIFO within a priority band).
    pub fn enqueue(&mut self, mut task: Task) {
        task.status = TaskStatus::Pending;
        let position = self
            .pending
            .iter()
            .position(|t| t.priority < task.priority)
            .unwrap_or(self.pending.len());
        self.pending.insert(position, task);
    }

    /// Pop the highest-priority pending task, oldest first within a band.
    pub fn pop_next(&mut self) -> Option<Task> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.remove(0))
        }
    }

    /// Move a task into the processing map with its assignment.
    pub fn begin_processing(
        &mut self,
        mut task: Task,
        agent_id: impl Into<String>,
        request_id: Uuid,
        timeout_ms: u64,
    ) {
        task.status = TaskStatus::Processing;
        self.processing.insert(
            task.id,
            InFlightTask {
                task,
                agent_id: agent_id.into(),
                request_id,
                dispatched_at: Utc::now(),
                timeout_ms,
            },
        );
    }

    /// Remove and return an in-flight entry.
    ///
    /// `None` for an id that is not processing — that is how a duplicate
    /// result delivery is detected and ignored.
    pub fn take_processing(&mut self, task_id: Uuid) -> Option<InFlightTask> {
        self.processing.remove(&task_id)
    }

    /// Remove an in-flight entry only if it belongs to the given dispatch
    /// round. `None` when the task already finished or was re-dispatched.
    pub fn take_processing_if(&mut self, task_id: Uuid, request_id: Uuid) -> Option<InFlightTask> {
        if self
            .processing
            .get(&task_id)
            .is_some_and(|f| f.request_id == request_id)
        {
            self.processing.remove(&task_id)
        } else {
            None
        }
    }

    /// Whether a task is currently in flight.
    pub fn is_processing(&self, task_id: Uuid) -> bool {
        self.processing.contains_key(&task_id)
    }

    /// Pull every in-flight task assigned to a lost agent back to pending.
    ///
    /// Agent loss is not the task's fault: `retry_count` is unchanged.
    pub fn requeue_for_agent(&mut self, agent_id: &str) -> Vec<Uuid> {
        let ids: Vec<Uuid> = self
            .processing
            .iter()
            .filter(|(_, in_flight)| in_flight.agent_id == agent_id)
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            if let Some(in_flight) = self.processing.remove(id) {
                self.enqueue(in_flight.task);
            }
        }
        ids
    }

    /// Ids of in-flight tasks whose result window has passed at `now`.
    pub fn timed_out_at(&self, now: DateTime<Utc>) -> Vec<Uuid> {
        self.processing
            .iter()
            .filter(|(_, in_flight)| {
                now - in_flight.dispatched_at > Duration::milliseconds(in_flight.timeout_ms as i64)
            })
            .map(|(id, _)| *id)
            .collect()
    }

    /// Append a completed task to history.
    pub fn push_completed(&mut self, task: Task) {
        self.completed.push_back(task);
    }

    /// Apply the retry-or-fail rule to a task taken out of processing.
    ///
    /// Invalid tasks fail terminally without touching the budget; anything
    /// else retries while `retry_count < max_retries` and fails permanently
    /// after that.
    pub fn fail_or_retry(
        &mut self,
        mut task: Task,
        error: TaskError,
        max_retries: u32,
    ) -> FailureOutcome {
        if error.kind != TaskFailureKind::InvalidTask && task.retry_count < max_retries {
            task.retry_count += 1;
            let retry = task.retry_count;
            self.enqueue(task);
            FailureOutcome::Retried(retry)
        } else {
            task.fail_with(error);
            self.failed.push_back(task);
            FailureOutcome::TerminalFailed
        }
    }

    /// Drop history entries older than the retention window and enforce
    /// the hard cap, oldest first.
    pub fn prune_history(&mut self, now: DateTime<Utc>, retention_ms: u64, cap: usize) {
        let cutoff = now - Duration::milliseconds(retention_ms as i64);
        for history in [&mut self.completed, &mut self.failed] {
            history.retain(|t| t.completed_at.is_some_and(|at| at >= cutoff));
            while history.len() > cap {
                history.pop_front();
            }
        }
    }

    /// Current queue sizes.
    pub fn depths(&self) -> QueueDepths {
        QueueDepths {
            pending: self.pending.len(),
            processing: self.processing.len(),
            completed: self.completed.len(),
            failed: self.failed.len(),
        }
    }

    /// Pending tasks in scheduling order.
    pub fn pending_tasks(&self) -> &[Task] {
        &self.pending
    }

    /// Completed history, oldest first.
    pub fn completed_history(&self) -> impl Iterator<Item = &Task> {
        self.completed.iter()
    }

    /// Failed history, oldest first.
    pub fn failed_history(&self) -> impl Iterator<Item = &Task> {
        self.failed.iter()
    }
}

/// One [`TaskQueue`] per agent type, created lazily.
#[derive(Default)]
pub struct TaskQueues {
    queues: HashMap<AgentType, TaskQueue>,
}

impl TaskQueues {
    /// Create an empty queue set.
    pub fn new() -> Self {
        Self::default()
    }

    /// The queue for one type, created on first use.
    pub fn queue_mut(&mut self, agent_type: AgentType) -> &mut TaskQueue {
        self.queues.entry(agent_type).or_default()
    }

    /// The queue for one type, if it has ever held a task.
    pub fn queue(&self, agent_type: AgentType) -> Option<&TaskQueue> {
        self.queues.get(&agent_type)
    }

    /// Types with at least one pending task, in declaration order.
    pub fn types_with_pending(&self) -> Vec<AgentType> {
        AgentType::ALL
            .into_iter()
            .filter(|ty| {
                self.queues
                    .get(ty)
                    .is_some_and(|q| !q.pending_tasks().is_empty())
            })
            .collect()
    }

    /// Find and remove an in-flight entry without knowing its type.
    pub fn take_processing(&mut self, task_id: Uuid) -> Option<(AgentType, InFlightTask)> {
        for (ty, queue) in &mut self.queues {
            if let Some(in_flight) = queue.take_processing(task_id) {
                return Some((*ty, in_flight));
            }
        }
        None
    }

    /// Requeue every in-flight task assigned to a lost agent, across all
    /// types. Returns how many tasks went back to pending.
    pub fn requeue_for_agent(&mut self, agent_id: &str) -> usize {
        self.queues
            .values_mut()
            .map(|q| q.requeue_for_agent(agent_id).len())
            .sum()
    }

    /// Overdue in-flight tasks across all types at `now`.
    pub fn timed_out_at(&self, now: DateTime<Utc>) -> Vec<(AgentType, Uuid)> {
        self.queues
            .iter()
            .flat_map(|(ty, q)| q.timed_out_at(now).into_iter().map(move |id| (*ty, id)))
            .collect()
    }

    /// Prune every queue's history.
    pub fn prune_all(&mut self, now: DateTime<Utc>, retention_ms: u64, cap: usize) {
        for queue in self.queues.values_mut() {
            queue.prune_history(now, retention_ms, cap);
        }
    }

    /// Queue depths for every worker type, zeroed where no queue exists.
    pub fn depths(&self) -> HashMap<AgentType, QueueDepths> {
        AgentType::ALL
            .into_iter()
            .filter(|ty| *ty != AgentType::Orchestrator)
            .map(|ty| {
                let depths = self.queues.get(&ty).map_or_else(QueueDepths::default, TaskQueue::depths);
                (ty, depths)
            })
            .collect()
    }
}
