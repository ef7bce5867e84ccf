use crate::agent::{AgentType, HealthSnapshot};
use crate::task::{Task, TaskError, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Default acknowledgment window for dispatched messages, in milliseconds.
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 30_000;

/// Ordinal priority shared by tasks and bus messages.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Background work.
    Low,
    /// The default.
    #[default]
    Normal,
    /// Ahead of normal traffic.
    High,
    /// Jumps every queue.
    Critical,
}

/// Destination of a bus message: one agent type, or everyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageTarget {
    /// Every subscriber of the given type.
    Type(AgentType),
    /// Every subscriber, regardless of type.
    Broadcast,
}

impl MessageTarget {
    /// Lowercase wire name of this target.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageTarget::Type(ty) => ty.as_str(),
            MessageTarget::Broadcast => "broadcast",
        }
    }
}

impl std::fmt::Display for MessageTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MessageTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "broadcast" {
            Ok(MessageTarget::Broadcast)
        } else {
            s.parse::<AgentType>().map(MessageTarget::Type)
        }
    }
}

impl Serialize for MessageTarget {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageTarget {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Body of a `TASK_REQUEST`: the dispatched task plus the chosen agent.
///
/// The envelope targets an agent *type*; `agent_id` names the specific
/// instance the scheduler picked. Other instances of the type ignore it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    /// The task being dispatched.
    pub task: Task,
    /// The agent instance chosen by the scheduler.
    pub agent_id: String,
}

/// Body of a `TASK_RESULT`: the outcome of one task execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// The task this result belongs to.
    pub task_id: Uuid,
    /// Terminal status as seen by the agent (`Completed` or `Failed`).
    pub status: TaskStatus,
    /// Output, when the task completed.
    pub result: Option<serde_json::Value>,
    /// Failure, when the task failed.
    pub error: Option<TaskError>,
    /// The agent that executed the task.
    pub agent_id: String,
}

impl TaskResult {
    /// Build a completed result.
    pub fn completed(
        task_id: Uuid,
        agent_id: impl Into<String>,
        result: Option<serde_json::Value>,
    ) -> Self {
        Self {
            task_id,
            status: TaskStatus::Completed,
            result,
            error: None,
            agent_id: agent_id.into(),
        }
    }

    /// Build a failed result.
    pub fn failed(task_id: Uuid, agent_id: impl Into<String>, error: TaskError) -> Self {
        Self {
            task_id,
            status: TaskStatus::Failed,
            result: None,
            error: Some(error),
            agent_id: agent_id.into(),
        }
    }
}

/// Body of a `STATUS_UPDATE`: registration, heartbeat, or goodbye.
///
/// The first online update registers the agent; subsequent ones refresh
/// `last_seen` and overwrite the health snapshot. `online: false` is an
/// explicit offline announcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// The reporting agent.
    pub agent_id: String,
    /// The reporting agent's type.
    pub agent_type: AgentType,
    /// False only on an explicit goodbye.
    pub online: bool,
    /// Task kinds the agent handles; meaningful on registration.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Latest health, when the update is a heartbeat.
    pub health: Option<HealthSnapshot>,
}

/// Body of an `ERROR_REPORT`: a non-task fault an agent wants logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    /// The reporting agent.
    pub agent_id: String,
    /// Task involved, if any.
    pub task_id: Option<Uuid>,
    /// What went wrong.
    pub message: String,
}

/// Body of a `LEARNING_UPDATE`: tuning parameters from the feedback
/// collaborator, forwarded verbatim to agent handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningUpdate {
    /// Opaque tuning parameters, interpreted by the receiving agent.
    pub parameters: serde_json::Value,
}

/// Tagged union of the message kinds carried on the bus.
///
/// The tag is flattened into the envelope so the wire shape is
/// `{ ..., "type": "TASK_REQUEST", "payload": { ... } }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessagePayload {
    /// Scheduler → agent: execute this task.
    TaskRequest(TaskRequest),
    /// Agent → orchestrator: outcome of a task.
    TaskResult(TaskResult),
    /// Agent → orchestrator: registration / heartbeat / goodbye.
    StatusUpdate(StatusUpdate),
    /// Agent → orchestrator: non-task fault.
    ErrorReport(ErrorReport),
    /// Feedback collaborator → agents: tuning parameters.
    LearningUpdate(LearningUpdate),
}

/// Envelope exchanged on the message bus.
///
/// Transient; not persisted beyond the bus's own delivery guarantees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier; consumers dedupe on it.
    pub id: Uuid,
    /// When the message was created.
    pub timestamp: DateTime<Utc>,
    /// Type of the sending component.
    pub source: AgentType,
    /// Destination type, or broadcast.
    pub target: MessageTarget,
    /// Delivery priority.
    pub priority: Priority,
    /// The typed body.
    #[serde(flatten)]
    pub payload: MessagePayload,
    /// Whether the sender expects an acknowledgment.
    pub requires_ack: bool,
    /// Acknowledgment / result window in milliseconds.
    pub timeout_ms: u64,
}

impl Message {
    /// Create a message to one agent type, normal priority, no ack.
    pub fn to_type(source: AgentType, target: AgentType, payload: MessagePayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source,
            target: MessageTarget::Type(target),
            priority: Priority::Normal,
            payload,
            requires_ack: false,
            timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
        }
    }

    /// Create a broadcast message, normal priority, no ack.
    pub fn broadcast(source: AgentType, payload: MessagePayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source,
            target: MessageTarget::Broadcast,
            priority: Priority::Normal,
            payload,
            requires_ack: false,
            timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
        }
    }

    /// Set the delivery priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Require an acknowledgment within `timeout_ms` milliseconds.
    pub fn with_ack(mut self, timeout_ms: u64) -> Self {
        self.requires_ack = true;
        self.timeout_ms = timeout_ms;
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_target_roundtrip() {
        let target: MessageTarget = "generator".parse().unwrap();
        assert_eq!(target, MessageTarget::Type(AgentType::Generator));
        let target: MessageTarget = "broadcast".parse().unwrap();
        assert_eq!(target, MessageTarget::Broadcast);
        assert!("nowhere".parse::<MessageTarget>().is_err());
    }

    #[test]
    fn test_envelope_wire_shape() {
        let task = Task::new(AgentType::Generator, "draft_post", json!({}));
        let msg = Message::to_type(
            AgentType::Orchestrator,
            AgentType::Generator,
            MessagePayload::TaskRequest(TaskRequest {
                task,
                agent_id: "gen-1".into(),
            }),
        )
        .with_ack(30_000);

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "TASK_REQUEST");
        assert_eq!(value["source"], "orchestrator");
        assert_eq!(value["target"], "generator");
        assert_eq!(value["requires_ack"], true);
        assert_eq!(value["timeout_ms"], 30_000);
        assert_eq!(value["payload"]["agent_id"], "gen-1");
    }

    #[test]
    fn test_envelope_roundtrip() {
        let msg = Message::broadcast(
            AgentType::Optimizer,
            MessagePayload::LearningUpdate(LearningUpdate {
                parameters: json!({"temperature": 0.6}),
            }),
        );
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, msg.id);
        assert_eq!(parsed.target, MessageTarget::Broadcast);
        match parsed.payload {
            MessagePayload::LearningUpdate(update) => {
                assert_eq!(update.parameters["temperature"], 0.6);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_status_update_payload_tag() {
        let msg = Message::to_type(
            AgentType::Generator,
            AgentType::Orchestrator,
            MessagePayload::StatusUpdate(StatusUpdate {
                agent_id: "gen-1".into(),
                agent_type: AgentType::Generator,
                online: true,
                capabilities: vec!["draft_post".into()],
                health: Some(HealthSnapshot::default()),
            }),
        );
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "STATUS_UPDATE");
        assert_eq!(value["payload"]["online"], true);
    }

    #[test]
    fn test_task_result_constructors() {
        let id = Uuid::new_v4();
        let ok = TaskResult::completed(id, "val-1", Some(json!({"ok": true})));
        assert_eq!(ok.status, TaskStatus::Completed);
        assert!(ok.error.is_none());

        let err = TaskResult::failed(id, "val-1", TaskError::timeout("no result in 30s"));
        assert_eq!(err.status, TaskStatus::Failed);
        assert!(err.result.is_none());
    }
}
