#![allow(clippy::unwrap_used, clippy::expect_used)]

use conductor_core::*;
use serde_json::json;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// 1. Full envelope wire shape for every message kind
// ---------------------------------------------------------------------------

#[test]
fn every_message_kind_serializes_with_its_tag() {
    let task = Task::new(AgentType::Generator, "draft_post", json!({"topic": "rust"}));
    let cases = vec![
        (
            MessagePayload::TaskRequest(TaskRequest {
                task: task.clone(),
                agent_id: "gen-1".into(),
            }),
            "TASK_REQUEST",
        ),
        (
            MessagePayload::TaskResult(TaskResult::completed(task.id, "gen-1", None)),
            "TASK_RESULT",
        ),
        (
            MessagePayload::StatusUpdate(StatusUpdate {
                agent_id: "gen-1".into(),
                agent_type: AgentType::Generator,
                online: true,
                capabilities: vec![],
                health: None,
            }),
            "STATUS_UPDATE",
        ),
        (
            MessagePayload::ErrorReport(ErrorReport {
                agent_id: "gen-1".into(),
                task_id: None,
                message: "health check hung".into(),
            }),
            "ERROR_REPORT",
        ),
        (
            MessagePayload::LearningUpdate(LearningUpdate {
                parameters: json!({"temperature": 0.5}),
            }),
            "LEARNING_UPDATE",
        ),
    ];

    for (payload, tag) in cases {
        let msg = Message::to_type(AgentType::Orchestrator, AgentType::Generator, payload);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], tag, "wrong tag for {tag}");
        // Envelope fields present alongside the flattened payload
        assert!(value["id"].is_string());
        assert!(value["timestamp"].is_string());
        assert_eq!(value["source"], "orchestrator");
        assert_eq!(value["target"], "generator");
        assert!(value["payload"].is_object());
    }
}

// ---------------------------------------------------------------------------
// 2. Task lifecycle transitions
// ---------------------------------------------------------------------------

#[test]
fn task_lifecycle_pending_to_completed() {
    let mut task = Task::new(AgentType::Validator, "score", json!({"text": "hi"}));
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(!task.is_terminal());

    task.status = TaskStatus::Processing;
    assert!(!task.is_terminal());

    task.complete_with(Some(json!({"score": 0.93})));
    assert!(task.is_terminal());
    assert_eq!(task.result.as_ref().unwrap()["score"], 0.93);
}

#[test]
fn task_lifecycle_pending_to_failed() {
    let mut task = Task::new(AgentType::Publisher, "post", json!({}));
    task.fail_with(TaskError::invalid("missing channel id"));
    assert!(task.is_terminal());
    assert_eq!(task.error.as_ref().unwrap().kind, TaskFailureKind::InvalidTask);
    assert!(task.result.is_none());
}

// ---------------------------------------------------------------------------
// 3. Error Display and From impls
// ---------------------------------------------------------------------------

#[test]
fn error_display_and_from_impls() {
    let bus_err = ConductorError::BusUnavailable("transport closed".to_string());
    assert_eq!(bus_err.to_string(), "Bus unavailable: transport closed");

    let ack_err = ConductorError::AckTimeout(30_000);
    assert_eq!(ack_err.to_string(), "Acknowledgment timed out after 30000 ms");

    let invalid_err = ConductorError::InvalidTask("unknown kind".to_string());
    assert_eq!(invalid_err.to_string(), "Invalid task: unknown kind");

    // From<serde_json::Error>
    let json_err = serde_json::from_str::<Message>("not json").unwrap_err();
    let converted: ConductorError = json_err.into();
    assert!(matches!(converted, ConductorError::Json(_)));
}

// ---------------------------------------------------------------------------
// 4. Broadcast target survives a roundtrip through the wire
// ---------------------------------------------------------------------------

#[test]
fn broadcast_target_roundtrip() {
    let msg = Message::broadcast(
        AgentType::Orchestrator,
        MessagePayload::ErrorReport(ErrorReport {
            agent_id: "orc".into(),
            task_id: Some(Uuid::new_v4()),
            message: "test".into(),
        }),
    )
    .with_priority(Priority::Critical);

    let json = serde_json::to_string(&msg).unwrap();
    assert!(json.contains("\"target\":\"broadcast\""));

    let parsed: Message = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.target, MessageTarget::Broadcast);
    assert_eq!(parsed.priority, Priority::Critical);
}
