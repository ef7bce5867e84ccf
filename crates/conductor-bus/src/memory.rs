use crate::bus::{BusSubscription, MessageBus};
use async_trait::async_trait;
use conductor_core::{AgentType, ConductorError, ConductorResult, Message, MessageTarget};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// In-process message bus with per-type topic fan-out.
///
/// Every subscriber of a type receives every message targeted at that type;
/// broadcast messages reach all subscribers. Pending acknowledgments are
/// tracked as oneshot channels keyed by message id.
pub struct InMemoryBus {
    subscribers: RwLock<HashMap<AgentType, Vec<mpsc::UnboundedSender<Message>>>>,
    pending_acks: Mutex<HashMap<Uuid, oneshot::Sender<()>>>,
    closed: AtomicBool,
}

impl InMemoryBus {
    /// Create an open bus with no subscribers.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            pending_acks: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Close the transport; subsequent publishes fail with `BusUnavailable`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Number of live subscriptions for a type. Dead entries are counted
    /// until the next delivery attempt prunes them.
    pub fn subscriber_count(&self, agent_type: AgentType) -> usize {
        self.subscribers
            .read()
            .get(&agent_type)
            .map_or(0, std::vec::Vec::len)
    }

    fn deliver(&self, message: &Message) {
        let mut subscribers = self.subscribers.write();
        match message.target {
            MessageTarget::Type(ty) => {
                if let Some(senders) = subscribers.get_mut(&ty) {
                    senders.retain(|tx| tx.send(message.clone()).is_ok());
                }
            }
            MessageTarget::Broadcast => {
                for senders in subscribers.values_mut() {
                    senders.retain(|tx| tx.send(message.clone()).is_ok());
                }
            }
        }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, message: Message) -> ConductorResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConductorError::BusUnavailable("bus is closed".to_string()));
        }
        self.deliver(&message);
        Ok(())
    }

    async fn publish_acked(&self, message: Message) -> ConductorResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConductorError::BusUnavailable("bus is closed".to_string()));
        }

        let timeout_ms = message.timeout_ms;
        let (tx, rx) = oneshot::channel();
        // Arm the waiter before delivery so a same-thread ack cannot race it.
        self.pending_acks.lock().insert(message.id, tx);
        let message_id = message.id;
        self.deliver(&message);

        match tokio::time::timeout(Duration::from_millis(timeout_ms), rx).await {
            Ok(Ok(())) => Ok(()),
            // Elapsed, or the waiter was dropped without firing.
            _ => {
                self.pending_acks.lock().remove(&message_id);
                tracing::warn!(message_id = %message_id, timeout_ms, "No acknowledgment received");
                Err(ConductorError::AckTimeout(timeout_ms))
            }
        }
    }

    async fn subscribe(&self, agent_type: AgentType) -> ConductorResult<BusSubscription> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConductorError::BusUnavailable("bus is closed".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().entry(agent_type).or_default().push(tx);
        Ok(BusSubscription { receiver: rx })
    }

    async fn ack(&self, message_id: Uuid) -> ConductorResult<()> {
        if let Some(tx) = self.pending_acks.lock().remove(&message_id) {
            // The waiter may have timed out between lookup and send; ignore.
            let _ = tx.send(());
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use conductor_core::{ErrorReport, MessagePayload};

    fn report(source: AgentType, target: AgentType) -> Message {
        Message::to_type(
            source,
            target,
            MessagePayload::ErrorReport(ErrorReport {
                agent_id: "test".into(),
                task_id: None,
                message: "ping".into(),
            }),
        )
    }

    #[tokio::test]
    async fn test_publish_reaches_type_subscriber() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe(AgentType::Generator).await.unwrap();

        bus.publish(report(AgentType::Orchestrator, AgentType::Generator))
            .await
            .unwrap();

        let msg = sub.recv().await.unwrap();
        assert_eq!(msg.source, AgentType::Orchestrator);
    }

    #[tokio::test]
    async fn test_publish_does_not_cross_types() {
        let bus = InMemoryBus::new();
        let mut generator = bus.subscribe(AgentType::Generator).await.unwrap();
        let mut validator = bus.subscribe(AgentType::Validator).await.unwrap();

        bus.publish(report(AgentType::Orchestrator, AgentType::Validator))
            .await
            .unwrap();

        assert!(validator.recv().await.is_some());
        assert!(generator.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_type() {
        let bus = InMemoryBus::new();
        let mut generator = bus.subscribe(AgentType::Generator).await.unwrap();
        let mut publisher = bus.subscribe(AgentType::Publisher).await.unwrap();

        let msg = Message::broadcast(
            AgentType::Orchestrator,
            MessagePayload::ErrorReport(ErrorReport {
                agent_id: "orc".into(),
                task_id: None,
                message: "all hands".into(),
            }),
        );
        bus.publish(msg).await.unwrap();

        assert!(generator.recv().await.is_some());
        assert!(publisher.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_publish_with_no_subscribers_is_ok() {
        let bus = InMemoryBus::new();
        bus.publish(report(AgentType::Orchestrator, AgentType::Optimizer))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_publish_after_close_fails() {
        let bus = InMemoryBus::new();
        bus.close();
        let err = bus
            .publish(report(AgentType::Orchestrator, AgentType::Generator))
            .await
            .unwrap_err();
        assert!(matches!(err, ConductorError::BusUnavailable(_)));
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let bus = InMemoryBus::new();
        let sub = bus.subscribe(AgentType::Generator).await.unwrap();
        assert_eq!(bus.subscriber_count(AgentType::Generator), 1);
        drop(sub);

        bus.publish(report(AgentType::Orchestrator, AgentType::Generator))
            .await
            .unwrap();
        assert_eq!(bus.subscriber_count(AgentType::Generator), 0);
    }

    #[tokio::test]
    async fn test_ack_completes_publish_acked() {
        let bus = std::sync::Arc::new(InMemoryBus::new());
        let mut sub = bus.subscribe(AgentType::Generator).await.unwrap();

        let msg = report(AgentType::Orchestrator, AgentType::Generator).with_ack(5_000);
        let publisher = {
            let bus = std::sync::Arc::clone(&bus);
            tokio::spawn(async move { bus.publish_acked(msg).await })
        };

        let received = sub.recv().await.unwrap();
        bus.ack(received.id).await.unwrap();

        publisher.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_missing_ack_times_out() {
        let bus = InMemoryBus::new();
        let _sub = bus.subscribe(AgentType::Generator).await.unwrap();

        let msg = report(AgentType::Orchestrator, AgentType::Generator).with_ack(20);
        let err = bus.publish_acked(msg).await.unwrap_err();
        assert!(matches!(err, ConductorError::AckTimeout(20)));
    }

    #[tokio::test]
    async fn test_late_ack_is_ignored() {
        let bus = InMemoryBus::new();
        let _sub = bus.subscribe(AgentType::Generator).await.unwrap();

        let msg = report(AgentType::Orchestrator, AgentType::Generator).with_ack(20);
        let id = msg.id;
        assert!(bus.publish_acked(msg).await.is_err());

        // The waiter is gone; the ack is a no-op rather than an error.
        bus.ack(id).await.unwrap();
    }
}
