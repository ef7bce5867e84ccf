//! Typed publish/subscribe message bus client for Conductor.
//!
//! Delivery is at-least-once: consumers must be idempotent or dedupe by
//! `message.id`. Acknowledgment is optional per message; the sender's timer
//! is the only ack enforcement — the bus never retries on its own (that
//! policy belongs to the scheduler).
//!
//! # Main types
//!
//! - [`MessageBus`] — The transport contract (publish, subscribe, ack).
//! - [`BusSubscription`] — Pull-based stream of messages for one agent type.
//! - [`InMemoryBus`] — In-process implementation with topic fan-out.

/// The transport contract and subscription handle.
pub mod bus;
/// In-process bus implementation.
pub mod memory;

pub use bus::{BusSubscription, MessageBus};
pub use memory::InMemoryBus;
