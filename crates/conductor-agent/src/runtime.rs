use crate::config::AgentRuntimeConfig;
use crate::handler::AgentHandler;
use conductor_bus::{BusSubscription, MessageBus};
use conductor_core::{
    AgentType, ConductorResult, ErrorReport, HealthSnapshot, Message, MessagePayload,
    StatusUpdate, TaskError, TaskResult,
};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Live task counters, stamped onto every outgoing health snapshot.
#[derive(Default)]
struct TaskCounters {
    active: AtomicU32,
    completed: AtomicU64,
    failed: AtomicU64,
}

struct RuntimeInner {
    agent_id: String,
    agent_type: AgentType,
    handler: Arc<dyn AgentHandler>,
    bus: Arc<dyn MessageBus>,
    config: AgentRuntimeConfig,
    workers: Arc<Semaphore>,
    counters: TaskCounters,
}

/// Drives an [`AgentHandler`] against the message bus.
///
/// Owns the subscription, a bounded worker pool, and the heartbeat
/// publisher. One runtime instance per worker process.
pub struct AgentRuntime {
    inner: Arc<RuntimeInner>,
    shutdown: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl AgentRuntime {
    /// Create a runtime for the given handler. Nothing happens until
    /// [`start`](Self::start).
    pub fn new(
        agent_id: impl Into<String>,
        agent_type: AgentType,
        handler: Arc<dyn AgentHandler>,
        bus: Arc<dyn MessageBus>,
        config: AgentRuntimeConfig,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(config.max_concurrent_tasks));
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(RuntimeInner {
                agent_id: agent_id.into(),
                agent_type,
                handler,
                bus,
                config,
                workers,
                counters: TaskCounters::default(),
            }),
            shutdown,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// This runtime's agent id.
    pub fn agent_id(&self) -> &str {
        &self.inner.agent_id
    }

    /// Initialize the handler, announce the agent online, and spawn the
    /// message and heartbeat loops.
    ///
    /// A handler initialization error is fatal: the agent must not serve
    /// tasks with unreachable dependencies.
    pub async fn start(&self) -> ConductorResult<()> {
        self.inner.handler.initialize().await?;

        let subscription = self.inner.bus.subscribe(self.inner.agent_type).await?;
        self.inner.publish_status(true).await?;

        info!(
            agent_id = %self.inner.agent_id,
            agent_type = %self.inner.agent_type,
            "Agent online"
        );

        let message_loop = {
            let inner = Arc::clone(&self.inner);
            let shutdown = self.shutdown.subscribe();
            tokio::spawn(inner.message_loop(subscription, shutdown))
        };
        let heartbeat_loop = {
            let inner = Arc::clone(&self.inner);
            let shutdown = self.shutdown.subscribe();
            tokio::spawn(inner.heartbeat_loop(shutdown))
        };

        if let Ok(mut handles) = self.handles.lock() {
            handles.push(message_loop);
            handles.push(heartbeat_loop);
        }
        Ok(())
    }

    /// Stop pulling work, drain in-flight tasks up to the grace period,
    /// tear the handler down, and announce the agent offline.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);

        let deadline = Instant::now() + Duration::from_millis(self.inner.config.drain_grace_ms);
        while self.inner.counters.active.load(Ordering::SeqCst) > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let remaining = self.inner.counters.active.load(Ordering::SeqCst);
        if remaining > 0 {
            warn!(
                agent_id = %self.inner.agent_id,
                remaining,
                "Drain grace expired with tasks still in flight"
            );
        }

        if let Err(e) = self.inner.handler.stop().await {
            warn!(agent_id = %self.inner.agent_id, error = %e, "Handler stop failed");
        }

        if let Err(e) = self.inner.publish_status(false).await {
            warn!(agent_id = %self.inner.agent_id, error = %e, "Offline announcement failed");
        }

        let handles: Vec<JoinHandle<()>> = match self.handles.lock() {
            Ok(mut guard) => guard.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            let _ = handle.await;
        }

        info!(agent_id = %self.inner.agent_id, "Agent offline");
    }
}

impl RuntimeInner {
    async fn message_loop(
        self: Arc<Self>,
        mut subscription: BusSubscription,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                maybe = subscription.recv() => match maybe {
                    Some(message) => self.handle_message(message).await,
                    None => {
                        warn!(agent_id = %self.agent_id, "Bus subscription closed");
                        break;
                    }
                },
            }
        }
    }

    async fn handle_message(self: &Arc<Self>, message: Message) {
        match message.payload {
            MessagePayload::TaskRequest(request) => {
                if request.agent_id != self.agent_id {
                    // Addressed to another instance of this type.
                    return;
                }
                if message.requires_ack {
                    if let Err(e) = self.bus.ack(message.id).await {
                        warn!(agent_id = %self.agent_id, error = %e, "Ack failed");
                    }
                }
                self.accept_task(request.task).await;
            }
            MessagePayload::LearningUpdate(update) => {
                if message.requires_ack {
                    let _ = self.bus.ack(message.id).await;
                }
                debug!(agent_id = %self.agent_id, "Applying learning update");
                self.handler.apply_learning_update(update.parameters).await;
            }
            other => {
                debug!(agent_id = %self.agent_id, payload = ?other, "Ignoring message");
            }
        }
    }

    /// Validate and execute one task. Blocks on the worker pool first so
    /// that no further messages are pulled while every slot is busy.
    async fn accept_task(self: &Arc<Self>, task: conductor_core::Task) {
        let permit = match Arc::clone(&self.workers).acquire_owned().await {
            Ok(permit) => permit,
            // Semaphore is never closed while the loop runs.
            Err(_) => return,
        };

        if !self.handler.validate_task(&task) {
            warn!(
                agent_id = %self.agent_id,
                task_id = %task.id,
                task_kind = %task.task_kind,
                "Task rejected by validation"
            );
            self.publish_result(TaskResult::failed(
                task.id,
                &self.agent_id,
                TaskError::invalid(format!("agent rejected task kind '{}'", task.task_kind)),
            ))
            .await;
            return;
        }

        let inner = Arc::clone(self);
        self.counters.active.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            let task_id = task.id;
            let task_kind = task.task_kind.clone();
            debug!(agent_id = %inner.agent_id, task_id = %task_id, task_kind = %task_kind, "Executing task");

            let outcome = match inner.handler.process_task(task).await {
                Ok(value) => {
                    inner.counters.completed.fetch_add(1, Ordering::SeqCst);
                    TaskResult::completed(task_id, &inner.agent_id, Some(value))
                }
                Err(e) => {
                    inner.counters.failed.fetch_add(1, Ordering::SeqCst);
                    error!(
                        agent_id = %inner.agent_id,
                        task_id = %task_id,
                        error = %e,
                        "Task execution failed"
                    );
                    TaskResult::failed(task_id, &inner.agent_id, TaskError::execution(e.to_string()))
                }
            };

            inner.counters.active.fetch_sub(1, Ordering::SeqCst);
            inner.publish_result(outcome).await;
            drop(permit);
        });
    }

    async fn heartbeat_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.heartbeat_interval_ms));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.publish_status(true).await {
                        warn!(agent_id = %self.agent_id, error = %e, "Heartbeat publish failed");
                    }
                }
            }
        }
    }

    /// Probe the handler with a bounded timeout and stamp live counters
    /// onto the snapshot. A hung probe yields a degraded snapshot.
    async fn snapshot(&self) -> HealthSnapshot {
        let timeout = Duration::from_millis(self.config.health_check_timeout_ms);
        let mut snapshot = match tokio::time::timeout(timeout, self.handler.health_check()).await {
            Ok(snapshot) => snapshot,
            Err(_) => {
                warn!(agent_id = %self.agent_id, "Health check timed out");
                let report = Message::to_type(
                    self.agent_type,
                    AgentType::Orchestrator,
                    MessagePayload::ErrorReport(ErrorReport {
                        agent_id: self.agent_id.clone(),
                        task_id: None,
                        message: format!("health check exceeded {} ms", timeout.as_millis()),
                    }),
                );
                let _ = self.bus.publish(report).await;
                HealthSnapshot {
                    is_healthy: false,
                    ..HealthSnapshot::default()
                }
            }
        };
        snapshot.active_task_count = self.counters.active.load(Ordering::SeqCst);
        snapshot.completed_task_count = self.counters.completed.load(Ordering::SeqCst);
        snapshot.failed_task_count = self.counters.failed.load(Ordering::SeqCst);
        snapshot
    }

    async fn publish_status(&self, online: bool) -> ConductorResult<()> {
        let health = if online { Some(self.snapshot().await) } else { None };
        let update = StatusUpdate {
            agent_id: self.agent_id.clone(),
            agent_type: self.agent_type,
            online,
            capabilities: self.handler.capabilities(),
            health,
        };
        self.bus
            .publish(Message::to_type(
                self.agent_type,
                AgentType::Orchestrator,
                MessagePayload::StatusUpdate(update),
            ))
            .await
    }

    async fn publish_result(&self, result: TaskResult) {
        let message = Message::to_type(
            self.agent_type,
            AgentType::Orchestrator,
            MessagePayload::TaskResult(result),
        );
        if let Err(e) = self.bus.publish(message).await {
            error!(agent_id = %self.agent_id, error = %e, "Result publish failed");
        }
    }
}
