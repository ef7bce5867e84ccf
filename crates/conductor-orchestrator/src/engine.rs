use crate::config::OrchestratorConfig;
use crate::monitor::HealthMonitor;
use crate::registry::AgentRegistry;
use crate::scheduler::Scheduler;
use crate::task_queue::{FailureOutcome, TaskQueues};
use crate::types::SystemHealth;
use chrono::{DateTime, Utc};
use conductor_bus::{BusSubscription, MessageBus};
use conductor_core::{
    AgentRecord, AgentType, ConductorError, ConductorResult, Message, MessagePayload, Task,
    TaskError, TaskStatus,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Continuation invoked once when its task completes.
///
/// Callbacks run outside the state lock but on the control task; keep them
/// quick and do not call back into the orchestrator from inside one.
pub type TaskCallback = Box<dyn FnOnce(&Task) + Send + Sync + 'static>;

/// All mutable orchestration state, behind one lock.
///
/// The control loop and the message handlers are the only writers; public
/// API calls go through the same lock, so there is one logical writer at a
/// time and no lost updates on queue mutation.
pub(crate) struct OrchestratorState {
    pub registry: AgentRegistry,
    pub queues: TaskQueues,
    pub callbacks: HashMap<Uuid, TaskCallback>,
}

/// The orchestration engine: registry + queues + periodic control loop.
///
/// Each tick runs, in order: scheduler assignment pass, in-flight timeout
/// expiry, health monitor sweep, history pruning. Between ticks the same
/// task reacts to bus messages (results, status updates, error reports).
pub struct Orchestrator {
    state: Arc<RwLock<OrchestratorState>>,
    bus: Arc<dyn MessageBus>,
    config: OrchestratorConfig,
    shutdown: watch::Sender<bool>,
    loop_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Create an orchestrator over the given bus. Nothing runs until
    /// [`start`](Self::start).
    pub fn new(bus: Arc<dyn MessageBus>, config: OrchestratorConfig) -> Self {
        let state = OrchestratorState {
            registry: AgentRegistry::new(config.offline_threshold_ms),
            queues: TaskQueues::new(),
            callbacks: HashMap::new(),
        };
        let (shutdown, _) = watch::channel(false);
        Self {
            state: Arc::new(RwLock::new(state)),
            bus,
            config,
            shutdown,
            loop_handle: std::sync::Mutex::new(None),
        }
    }

    /// Subscribe to the bus and spawn the control loop.
    pub async fn start(&self) -> ConductorResult<()> {
        {
            let guard = self
                .loop_handle
                .lock()
                .map_err(|_| ConductorError::Orchestrator("control loop lock poisoned".into()))?;
            if guard.is_some() {
                return Err(ConductorError::Orchestrator("already started".into()));
            }
        }

        let subscription = self.bus.subscribe(AgentType::Orchestrator).await?;
        info!(
            tick_interval_ms = self.config.tick_interval_ms,
            "Orchestrator control loop starting"
        );

        let handle = tokio::spawn(control_loop(
            Arc::clone(&self.state),
            Arc::clone(&self.bus),
            self.config.clone(),
            subscription,
            self.shutdown.subscribe(),
        ));
        if let Ok(mut guard) = self.loop_handle.lock() {
            *guard = Some(handle);
        }
        Ok(())
    }

    /// Stop the control loop. In-flight tasks stay in the processing maps;
    /// a restarted orchestrator would recover them through timeouts.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let handle = match self.loop_handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!("Orchestrator control loop stopped");
    }

    /// Validate and enqueue a task. Returns its id.
    pub async fn submit_task(&self, task: Task) -> ConductorResult<Uuid> {
        validate_submission(&task)?;
        let id = task.id;
        let mut guard = self.state.write().await;
        info!(task_id = %id, target = %task.target_type, task_kind = %task.task_kind, "Task submitted");
        guard.queues.queue_mut(task.target_type).enqueue(task);
        Ok(id)
    }

    /// Like [`submit_task`](Self::submit_task), with a continuation fired
    /// once on completion. The continuation is dropped unfired if the task
    /// fails permanently.
    pub async fn submit_task_with_callback(
        &self,
        task: Task,
        callback: impl FnOnce(&Task) + Send + Sync + 'static,
    ) -> ConductorResult<Uuid> {
        validate_submission(&task)?;
        let id = task.id;
        let mut guard = self.state.write().await;
        guard.callbacks.insert(id, Box::new(callback));
        info!(task_id = %id, target = %task.target_type, task_kind = %task.task_kind, "Task submitted");
        guard.queues.queue_mut(task.target_type).enqueue(task);
        Ok(id)
    }

    /// Snapshot of queue depths and agent tallies.
    pub async fn system_health(&self) -> SystemHealth {
        let guard = self.state.read().await;
        SystemHealth {
            generated_at: Utc::now(),
            agents: guard.registry.counts(),
            queues: guard.queues.depths(),
        }
    }

    /// Registry dump, sorted by agent id.
    pub async fn agent_status(&self) -> Vec<AgentRecord> {
        let guard = self.state.read().await;
        guard.registry.all()
    }
}

fn validate_submission(task: &Task) -> ConductorResult<()> {
    if task.target_type == AgentType::Orchestrator {
        return Err(ConductorError::InvalidTask(
            "tasks cannot target the orchestrator itself".into(),
        ));
    }
    if task.task_kind.trim().is_empty() {
        return Err(ConductorError::InvalidTask("task_kind must not be empty".into()));
    }
    if task.status != TaskStatus::Pending || task.retry_count != 0 {
        return Err(ConductorError::InvalidTask(
            "submitted task must be pending with an unused retry budget".into(),
        ));
    }
    Ok(())
}

async fn control_loop(
    state: Arc<RwLock<OrchestratorState>>,
    bus: Arc<dyn MessageBus>,
    config: OrchestratorConfig,
    mut subscription: BusSubscription,
    mut shutdown: watch::Receiver<bool>,
) {
    let scheduler = Scheduler::new(&config);
    let monitor = HealthMonitor::new();
    let mut interval = tokio::time::interval(Duration::from_millis(config.tick_interval_ms));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => {
                tick(&state, &bus, &config, &scheduler, &monitor).await;
            }
            maybe = subscription.recv() => match maybe {
                Some(message) => handle_message(&state, message, &config).await,
                None => {
                    warn!("Orchestrator bus subscription closed");
                    break;
                }
            },
        }
    }
}

async fn tick(
    state: &Arc<RwLock<OrchestratorState>>,
    bus: &Arc<dyn MessageBus>,
    config: &OrchestratorConfig,
    scheduler: &Scheduler,
    monitor: &HealthMonitor,
) {
    let now = Utc::now();

    let outgoing = {
        let mut guard = state.write().await;
        let OrchestratorState { registry, queues, .. } = &mut *guard;
        scheduler.assignment_pass(registry, queues, now)
    };
    for message in outgoing {
        dispatch(state, bus, config, message);
    }

    let mut guard = state.write().await;
    expire_overdue(&mut guard, config, now);
    {
        let OrchestratorState { registry, queues, .. } = &mut *guard;
        monitor.sweep(registry, queues, now);
        queues.prune_all(now, config.history_retention_ms, config.history_cap);
    }
}

/// Publish a task request and recover the task if the ack never arrives.
/// The wait runs detached so the control loop never blocks on a slow agent.
fn dispatch(
    state: &Arc<RwLock<OrchestratorState>>,
    bus: &Arc<dyn MessageBus>,
    config: &OrchestratorConfig,
    message: Message,
) {
    let MessagePayload::TaskRequest(ref request) = message.payload else {
        return;
    };
    let task_id = request.task.id;
    let agent_type = request.task.target_type;
    let request_id = message.id;

    let state = Arc::clone(state);
    let bus = Arc::clone(bus);
    let max_retries = config.max_retries;
    tokio::spawn(async move {
        if let Err(e) = bus.publish_acked(message).await {
            warn!(task_id = %task_id, error = %e, "Dispatch not acknowledged; recovering task");
            let mut guard = state.write().await;
            let Some(in_flight) = guard
                .queues
                .queue_mut(agent_type)
                .take_processing_if(task_id, request_id)
            else {
                // A result already arrived or the task was re-dispatched.
                return;
            };
            let error = TaskError::timeout("task request was not acknowledged");
            let outcome = guard
                .queues
                .queue_mut(agent_type)
                .fail_or_retry(in_flight.task, error, max_retries);
            if outcome == FailureOutcome::TerminalFailed {
                guard.callbacks.remove(&task_id);
            }
        }
    });
}

/// Treat tasks sitting in processing past their window exactly like a
/// failed result: retry while the budget lasts, then permanent failure.
fn expire_overdue(state: &mut OrchestratorState, config: &OrchestratorConfig, now: DateTime<Utc>) {
    for (agent_type, task_id) in state.queues.timed_out_at(now) {
        let Some(in_flight) = state.queues.queue_mut(agent_type).take_processing(task_id) else {
            continue;
        };
        warn!(
            task_id = %task_id,
            agent_id = %in_flight.agent_id,
            timeout_ms = in_flight.timeout_ms,
            "In-flight task timed out"
        );
        let error = TaskError::timeout(format!("no result within {} ms", in_flight.timeout_ms));
        let outcome = state
            .queues
            .queue_mut(agent_type)
            .fail_or_retry(in_flight.task, error, config.max_retries);
        if outcome == FailureOutcome::TerminalFailed {
            state.callbacks.remove(&task_id);
        }
    }
}

async fn handle_message(
    state: &Arc<RwLock<OrchestratorState>>,
    message: Message,
    config: &OrchestratorConfig,
) {
    match message.payload {
        MessagePayload::TaskResult(result) => {
            handle_task_result(state, result, config).await;
        }
        MessagePayload::StatusUpdate(update) => {
            let mut guard = state.write().await;
            if update.online {
                guard.registry.upsert_online(
                    &update.agent_id,
                    update.agent_type,
                    update.capabilities,
                );
                if let Some(health) = update.health {
                    guard.registry.record_health(&update.agent_id, health);
                }
            } else {
                info!(agent_id = %update.agent_id, "Agent announced offline");
                guard.registry.mark_offline(&update.agent_id);
                let requeued = guard.queues.requeue_for_agent(&update.agent_id);
                if requeued > 0 {
                    info!(
                        agent_id = %update.agent_id,
                        requeued,
                        "Requeued in-flight tasks from departing agent"
                    );
                }
            }
        }
        MessagePayload::ErrorReport(report) => {
            warn!(
                agent_id = %report.agent_id,
                task_id = ?report.task_id,
                message = %report.message,
                "Agent error report"
            );
        }
        other => {
            debug!(payload = ?other, "Ignoring message addressed to orchestrator");
        }
    }
}

async fn handle_task_result(
    state: &Arc<RwLock<OrchestratorState>>,
    result: conductor_core::TaskResult,
    config: &OrchestratorConfig,
) {
    let mut fire: Option<(TaskCallback, Task)> = None;
    {
        let mut guard = state.write().await;
        // At-least-once delivery: a result whose task is no longer in
        // flight has already been handled.
        let Some((agent_type, in_flight)) = guard.queues.take_processing(result.task_id) else {
            debug!(task_id = %result.task_id, "Duplicate or unknown task result; ignoring");
            return;
        };
        let mut task = in_flight.task;

        match result.status {
            TaskStatus::Completed => {
                task.complete_with(result.result);
                info!(task_id = %task.id, agent_id = %result.agent_id, "Task completed");
                if let Some(callback) = guard.callbacks.remove(&task.id) {
                    fire = Some((callback, task.clone()));
                }
                guard.queues.queue_mut(agent_type).push_completed(task);
            }
            TaskStatus::Failed => {
                let error = result.error.unwrap_or_else(|| {
                    TaskError::execution("agent reported failure without detail")
                });
                warn!(
                    task_id = %task.id,
                    agent_id = %result.agent_id,
                    kind = ?error.kind,
                    error = %error.message,
                    "Task failed"
                );
                let task_id = task.id;
                let outcome = guard
                    .queues
                    .queue_mut(agent_type)
                    .fail_or_retry(task, error, config.max_retries);
                match outcome {
                    FailureOutcome::Retried(retry) => {
                        info!(task_id = %task_id, retry, "Task requeued for retry");
                    }
                    FailureOutcome::TerminalFailed => {
                        warn!(task_id = %task_id, "Task permanently failed");
                        guard.callbacks.remove(&task_id);
                    }
                }
            }
            status => {
                warn!(task_id = %task.id, status = ?status, "Non-terminal result status; dropping");
                guard.queues.queue_mut(agent_type).begin_processing(
                    task,
                    in_flight.agent_id,
                    in_flight.request_id,
                    in_flight.timeout_ms,
                );
            }
        }
    }
    if let Some((callback, task)) = fire {
        callback(&task);
    }
}
