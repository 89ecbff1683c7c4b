//! In-memory queue
//!
//! FIFO queue with explicit settlement: delivered messages move to an
//! in-flight set until acked, naked (back of the queue) or terminated.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::domain::TransactionEvent;

use super::{Acknowledger, Delivery, EventPublisher, EventSource, QueueError};

#[derive(Clone)]
struct Pending {
    id: u64,
    payload: Bytes,
    deliveries: u64,
}

#[derive(Default)]
struct State {
    ready: VecDeque<Pending>,
    in_flight: HashMap<u64, Pending>,
    next_id: u64,
    acked: u64,
    terminated: u64,
    closed: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    notify: Notify,
}

/// Queue kept in process memory
#[derive(Clone, Default)]
pub struct MemoryQueue {
    shared: Arc<Shared>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an arbitrary payload
    pub fn push_raw(&self, payload: impl Into<Bytes>) -> Result<(), QueueError> {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(QueueError::Closed);
            }
            state.next_id += 1;
            let id = state.next_id;
            state.ready.push_back(Pending {
                id,
                payload: payload.into(),
                deliveries: 0,
            });
        }
        self.shared.notify.notify_one();
        Ok(())
    }

    /// A consumer handle; consumers share one queue
    pub fn subscribe(&self) -> MemorySource {
        MemorySource {
            shared: self.shared.clone(),
        }
    }

    /// Refuse new messages. Consumers drain what is left, then see the end.
    pub fn close(&self) {
        self.shared.state.lock().closed = true;
        self.shared.notify.notify_waiters();
        self.shared.notify.notify_one();
    }

    /// Messages waiting for delivery
    pub fn ready_len(&self) -> usize {
        self.shared.state.lock().ready.len()
    }

    /// Messages delivered but not yet settled
    pub fn in_flight_len(&self) -> usize {
        self.shared.state.lock().in_flight.len()
    }

    pub fn acked(&self) -> u64 {
        self.shared.state.lock().acked
    }

    pub fn terminated(&self) -> u64 {
        self.shared.state.lock().terminated
    }

    /// Decoded copies of the messages waiting for delivery
    pub fn ready_events(&self) -> Vec<TransactionEvent> {
        self.shared
            .state
            .lock()
            .ready
            .iter()
            .filter_map(|p| TransactionEvent::decode(&p.payload).ok())
            .collect()
    }
}

#[async_trait]
impl EventPublisher for MemoryQueue {
    async fn publish(&self, event: &TransactionEvent) -> Result<(), QueueError> {
        let payload = event.encode()?;
        self.push_raw(payload)
    }
}

/// Consumer of a `MemoryQueue`
pub struct MemorySource {
    shared: Arc<Shared>,
}

#[async_trait]
impl EventSource for MemorySource {
    async fn next_delivery(&mut self) -> Option<Result<Delivery, QueueError>> {
        loop {
            {
                let mut state = self.shared.state.lock();
                if let Some(mut pending) = state.ready.pop_front() {
                    pending.deliveries += 1;
                    state.in_flight.insert(pending.id, pending.clone());
                    let acker = MemoryAcker {
                        shared: self.shared.clone(),
                        id: pending.id,
                    };
                    return Some(Ok(Delivery::new(
                        pending.payload,
                        pending.deliveries,
                        Box::new(acker),
                    )));
                }
                if state.closed {
                    return None;
                }
            }
            self.shared.notify.notified().await;
        }
    }
}

struct MemoryAcker {
    shared: Arc<Shared>,
    id: u64,
}

impl MemoryAcker {
    fn settle(&self) -> Result<Pending, QueueError> {
        self.shared
            .state
            .lock()
            .in_flight
            .remove(&self.id)
            .ok_or_else(|| QueueError::Ack(format!("delivery {} is not in flight", self.id)))
    }
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(&self) -> Result<(), QueueError> {
        self.settle()?;
        self.shared.state.lock().acked += 1;
        Ok(())
    }

    async fn nak(&self) -> Result<(), QueueError> {
        let pending = self.settle()?;
        self.shared.state.lock().ready.push_back(pending);
        self.shared.notify.notify_one();
        Ok(())
    }

    async fn term(&self) -> Result<(), QueueError> {
        self.settle()?;
        self.shared.state.lock().terminated += 1;
        Ok(())
    }
}
