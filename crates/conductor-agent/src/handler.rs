use async_trait::async_trait;
use conductor_core::{ConductorResult, HealthSnapshot, Task};

/// The contract every worker implements.
///
/// The runtime calls these hooks; implementations hold the actual business
/// logic (fetching, generating, validating, publishing) and whatever clients
/// that requires. Handlers must be cheap to share across worker tasks.
#[async_trait]
pub trait AgentHandler: Send + Sync {
    /// One-time setup before the agent goes online.
    ///
    /// An error here is fatal: the runtime refuses to start rather than
    /// serve tasks with unreachable dependencies.
    async fn initialize(&self) -> ConductorResult<()> {
        Ok(())
    }

    /// Task kinds this agent declares at registration.
    fn capabilities(&self) -> Vec<String> {
        Vec::new()
    }

    /// Cheap structural check before execution.
    ///
    /// Rejection is reported as `INVALID_TASK` and the task fails
    /// terminally without consuming its retry budget.
    fn validate_task(&self, task: &Task) -> bool;

    /// Execute the task.
    ///
    /// An `Err` becomes a failed task result; it never crashes the agent.
    async fn process_task(&self, task: Task) -> ConductorResult<serde_json::Value>;

    /// Non-blocking health probe.
    ///
    /// The runtime bounds the call with a short timeout and fills in the
    /// task-count fields from its own live counters before publishing.
    async fn health_check(&self) -> HealthSnapshot;

    /// Receive tuning parameters from the learning feedback collaborator.
    async fn apply_learning_update(&self, parameters: serde_json::Value) {
        let _ = parameters;
    }

    /// Handler-side teardown, called during runtime stop.
    async fn stop(&self) -> ConductorResult<()> {
        Ok(())
    }
}
