//! Message Queue module
//!
//! Carries serialized `TransactionEvent`s from the balance mutator to the
//! history replicator. Delivery is at-least-once: a message stays pending
//! until the consumer acknowledges it, and a negative acknowledgement makes
//! it redeliverable.

mod error;
mod memory;
mod nats;

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::TransactionEvent;

pub use error::QueueError;
pub use memory::{MemoryQueue, MemorySource};
pub use nats::{JetStreamPublisher, JetStreamSource};

/// Publishing side of the queue
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &TransactionEvent) -> Result<(), QueueError>;
}

/// Consuming side of the queue
#[async_trait]
pub trait EventSource: Send {
    /// Wait for the next delivery. `None` means the source is closed.
    async fn next_delivery(&mut self) -> Option<Result<Delivery, QueueError>>;
}

/// Settles one delivered message with the broker
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Processing finished; never deliver again
    async fn ack(&self) -> Result<(), QueueError>;

    /// Processing failed; deliver again later
    async fn nak(&self) -> Result<(), QueueError>;

    /// Message is unprocessable; drop it without redelivery
    async fn term(&self) -> Result<(), QueueError>;
}

/// A message handed to a consumer, pending until settled
pub struct Delivery {
    payload: Bytes,
    delivery_count: u64,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(payload: Bytes, delivery_count: u64, acker: Box<dyn Acknowledger>) -> Self {
        Self {
            payload,
            delivery_count,
            acker,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// How many times this message has been delivered, this one included
    pub fn delivery_count(&self) -> u64 {
        self.delivery_count
    }

    pub async fn ack(self) -> Result<(), QueueError> {
        self.acker.ack().await
    }

    pub async fn nak(self) -> Result<(), QueueError> {
        self.acker.nak().await
    }

    pub async fn term(self) -> Result<(), QueueError> {
        self.acker.term().await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("payload_len", &self.payload.len())
            .field("delivery_count", &self.delivery_count)
            .finish()
    }
}
