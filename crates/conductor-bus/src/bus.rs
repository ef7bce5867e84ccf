use async_trait::async_trait;
use conductor_core::{AgentType, ConductorResult, Message};
use tokio::sync::mpsc;
use uuid::Uuid;

/// The message transport contract.
///
/// Implementations deliver every message targeted at a subscribed type, or
/// at broadcast, to that type's subscribers. Delivery is at-least-once.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Hand a message to the transport.
    ///
    /// Returns once the message is durably accepted; fails with
    /// [`ConductorError::BusUnavailable`] when the transport cannot be
    /// reached. Zero matching subscribers is not an error.
    ///
    /// [`ConductorError::BusUnavailable`]: conductor_core::ConductorError::BusUnavailable
    async fn publish(&self, message: Message) -> ConductorResult<()>;

    /// Publish and wait for the consumer's acknowledgment.
    ///
    /// The waiter is armed before the message goes out, then waits up to
    /// `message.timeout_ms`. Absence of the ack yields
    /// [`ConductorError::AckTimeout`]; the caller decides what that means.
    /// The bus does not retry.
    ///
    /// [`ConductorError::AckTimeout`]: conductor_core::ConductorError::AckTimeout
    async fn publish_acked(&self, message: Message) -> ConductorResult<()>;

    /// Subscribe to every message targeted at `agent_type` or at broadcast.
    async fn subscribe(&self, agent_type: AgentType) -> ConductorResult<BusSubscription>;

    /// Confirm delivery of a message that had `requires_ack` set.
    ///
    /// Late or duplicate acks are ignored.
    async fn ack(&self, message_id: Uuid) -> ConductorResult<()>;
}

/// Pull-based stream of messages for one subscriber.
///
/// Dropping the subscription unsubscribes; the bus prunes the dead entry on
/// its next delivery attempt. The pull model is what lets a consumer with a
/// full worker pool leave messages queued on the bus.
pub struct BusSubscription {
    pub(crate) receiver: mpsc::UnboundedReceiver<Message>,
}

impl BusSubscription {
    /// Receive the next message, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }

    /// Non-blocking receive; `None` when no message is queued.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.receiver.try_recv().ok()
    }
}
