use crate::agent::AgentType;
use crate::message::Priority;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a task in its lifecycle.
///
/// A submitter only ever observes `Pending` → (`Completed` | `Failed`);
/// retry churn between `Processing` and `Pending` is internal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Queued, waiting for a healthy agent.
    Pending,
    /// Dispatched to an agent; the authoritative copy is in flight.
    Processing,
    /// Finished successfully; `result` is populated.
    Completed,
    /// Terminally failed; `error` is populated.
    Failed,
}

/// Classification of a task failure, carried on result messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskFailureKind {
    /// Rejected by `validate_task`; terminal, does not consume the retry budget.
    InvalidTask,
    /// `process_task` returned an error; retried up to the budget.
    ExecutionFailure,
    /// No result within the task's timeout; retried like an execution failure.
    Timeout,
}

/// A task failure with its classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    /// Failure class, drives retry-or-fail handling.
    pub kind: TaskFailureKind,
    /// Human-readable description.
    pub message: String,
}

impl TaskError {
    /// Build a [`TaskFailureKind::InvalidTask`] error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            kind: TaskFailureKind::InvalidTask,
            message: message.into(),
        }
    }

    /// Build a [`TaskFailureKind::ExecutionFailure`] error.
    pub fn execution(message: impl Into<String>) -> Self {
        Self {
            kind: TaskFailureKind::ExecutionFailure,
            message: message.into(),
        }
    }

    /// Build a [`TaskFailureKind::Timeout`] error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: TaskFailureKind::Timeout,
            message: message.into(),
        }
    }
}

/// One unit of routed work.
///
/// Owned by the task queues while pending; during execution the
/// authoritative copy travels to the assigned agent and comes back on a
/// result message. The assignment itself is tracked in the processing map,
/// never on the task, so a dead agent leaves no stale pointer here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: Uuid,
    /// Routing key: which agent type executes this task.
    pub target_type: AgentType,
    /// Kind string interpreted by the receiving agent.
    pub task_kind: String,
    /// Opaque structured input for the agent.
    pub payload: serde_json::Value,
    /// Scheduling priority.
    pub priority: Priority,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// Retries consumed so far; capped by the orchestrator's budget.
    #[serde(default)]
    pub retry_count: u32,
    /// Output, populated on completion.
    pub result: Option<serde_json::Value>,
    /// Failure, populated on terminal failure.
    pub error: Option<TaskError>,
    /// When the task was submitted.
    pub created_at: DateTime<Utc>,
    /// When the task reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a pending task with normal priority.
    pub fn new(
        target_type: AgentType,
        task_kind: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_type,
            task_kind: task_kind.into(),
            payload,
            priority: Priority::Normal,
            status: TaskStatus::Pending,
            retry_count: 0,
            result: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Set the scheduling priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Whether the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Transition to `Completed` with the given result.
    pub fn complete_with(&mut self, result: Option<serde_json::Value>) {
        self.status = TaskStatus::Completed;
        self.result = result;
        self.completed_at = Some(Utc::now());
    }

    /// Transition to terminal `Failed` with the given error.
    pub fn fail_with(&mut self, error: TaskError) {
        self.status = TaskStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_task_defaults() {
        let task = Task::new(AgentType::Generator, "draft_post", json!({"topic": "rust"}));
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, Priority::Normal);
        assert_eq!(task.retry_count, 0);
        assert!(task.result.is_none());
        assert!(task.error.is_none());
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }

    #[test]
    fn test_complete_with() {
        let mut task = Task::new(AgentType::Validator, "score", json!({}));
        task.complete_with(Some(json!({"score": 0.9})));
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.is_terminal());
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn test_fail_with() {
        let mut task = Task::new(AgentType::Publisher, "post", json!({}));
        task.fail_with(TaskError::execution("upstream 500"));
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(
            task.error.as_ref().unwrap().kind,
            TaskFailureKind::ExecutionFailure
        );
    }

    #[test]
    fn test_failure_kind_wire_tags() {
        let json = serde_json::to_string(&TaskFailureKind::InvalidTask).unwrap();
        assert_eq!(json, "\"INVALID_TASK\"");
        let json = serde_json::to_string(&TaskFailureKind::ExecutionFailure).unwrap();
        assert_eq!(json, "\"EXECUTION_FAILURE\"");
    }

    #[test]
    fn test_task_serialization_roundtrip() {
        let task = Task::new(AgentType::Monitor, "poll_feed", json!({"url": "x"}))
            .with_priority(Priority::High);
        let json = serde_json::to_string(&task).unwrap();
        let parsed: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, task.id);
        assert_eq!(parsed.priority, Priority::High);
        assert_eq!(parsed.task_kind, "poll_feed");
    }
}
