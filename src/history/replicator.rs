//! History Replicator
//!
//! Drains the transaction queue into the history store. Per message:
//! decode, upsert, then settle. A message is acked only after its upsert
//! returned (or it was found undecodable), and naked when the upsert
//! failed so the broker delivers it again.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::TransactionEvent;
use crate::metrics::{
    REPLICATOR_ACK_FAILURES_TOTAL, REPLICATOR_MESSAGES_TOTAL, REPLICATOR_PERSIST_DURATION,
    REPLICATOR_RECEIVE_ERRORS_TOTAL,
};
use crate::queue::{Delivery, EventSource, QueueError};

use super::{HistoryDocument, HistoryError, HistoryStore, UpsertOutcome};

const DEFAULT_PERSIST_TIMEOUT: Duration = Duration::from_secs(5);
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// Terminal state of one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Written and acked
    Persisted,
    /// Key already present; acked without rewriting
    Duplicate,
    /// Unparseable payload; terminated so it is never redelivered
    DecodeFailed,
    /// Upsert failed; naked for redelivery
    PersistFailed,
}

impl MessageOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageOutcome::Persisted => "persisted",
            MessageOutcome::Duplicate => "duplicate",
            MessageOutcome::DecodeFailed => "decode_failed",
            MessageOutcome::PersistFailed => "persist_failed",
        }
    }
}

/// Counters for one run of the replicator
#[derive(Debug, Clone)]
pub struct ReplicationReport {
    pub received: u64,
    pub persisted: u64,
    pub duplicates: u64,
    pub decode_failures: u64,
    pub persist_failures: u64,
    pub ack_failures: u64,
    pub receive_errors: u64,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl Default for ReplicationReport {
    fn default() -> Self {
        Self {
            received: 0,
            persisted: 0,
            duplicates: 0,
            decode_failures: 0,
            persist_failures: 0,
            ack_failures: 0,
            receive_errors: 0,
            started_at: Utc::now(),
            stopped_at: None,
        }
    }
}

impl ReplicationReport {
    fn record(&mut self, outcome: MessageOutcome) {
        match outcome {
            MessageOutcome::Persisted => self.persisted += 1,
            MessageOutcome::Duplicate => self.duplicates += 1,
            MessageOutcome::DecodeFailed => self.decode_failures += 1,
            MessageOutcome::PersistFailed => self.persist_failures += 1,
        }
    }
}

/// Mirrors queue deliveries into a `HistoryStore`
pub struct HistoryReplicator<S> {
    source: S,
    store: Arc<dyn HistoryStore>,
    persist_timeout: Duration,
    report: ReplicationReport,
}

impl<S: EventSource> HistoryReplicator<S> {
    pub fn new(source: S, store: Arc<dyn HistoryStore>) -> Self {
        Self {
            source,
            store,
            persist_timeout: DEFAULT_PERSIST_TIMEOUT,
            report: ReplicationReport::default(),
        }
    }

    /// Upserts slower than this count as failed and are naked
    pub fn with_persist_timeout(mut self, timeout: Duration) -> Self {
        self.persist_timeout = timeout;
        self
    }

    pub fn report(&self) -> &ReplicationReport {
        &self.report
    }

    /// Run until `shutdown` is cancelled or the source closes.
    ///
    /// Cancellation is observed only between messages: a delivery already
    /// received is settled before the loop exits. The source is dropped on
    /// return, releasing the queue connection.
    pub async fn run(mut self, shutdown: CancellationToken) -> ReplicationReport {
        self.report.started_at = Utc::now();
        info!("History replicator started");

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, history replicator stopping");
                    break;
                }
                next = self.source.next_delivery() => next,
            };

            match next {
                Some(Ok(delivery)) => {
                    self.process(delivery).await;
                }
                Some(Err(e)) => {
                    self.report.receive_errors += 1;
                    REPLICATOR_RECEIVE_ERRORS_TOTAL.inc();
                    error!(error = %e, "Failed to receive message");

                    tokio::select! {
                        _ = shutdown.cancelled() => {}
                        _ = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                    }
                }
                None => {
                    info!("Message source closed, history replicator stopping");
                    break;
                }
            }
        }

        self.report.stopped_at = Some(Utc::now());
        info!(
            received = self.report.received,
            persisted = self.report.persisted,
            duplicates = self.report.duplicates,
            decode_failures = self.report.decode_failures,
            persist_failures = self.report.persist_failures,
            ack_failures = self.report.ack_failures,
            "History replicator stopped"
        );
        self.report
    }

    /// Drive one delivery to its terminal state
    pub async fn process(&mut self, delivery: Delivery) -> MessageOutcome {
        self.report.received += 1;
        let delivery_count = delivery.delivery_count();

        let event = match TransactionEvent::decode(delivery.payload()) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    error = %e,
                    delivery_count,
                    payload_len = delivery.payload().len(),
                    "Dropping undecodable message"
                );
                let settled = delivery.term().await;
                return self.finish(MessageOutcome::DecodeFailed, settled);
            }
        };

        let transaction_id = event.transaction_id;
        let document = HistoryDocument::from_event(event);

        match self.persist(&document).await {
            Ok(UpsertOutcome::Inserted) => {
                debug!(
                    %transaction_id,
                    account_id = %document.transaction.account_id,
                    delivery_count,
                    "Transaction mirrored"
                );
                let settled = delivery.ack().await;
                self.finish(MessageOutcome::Persisted, settled)
            }
            Ok(UpsertOutcome::Duplicate) => {
                info!(%transaction_id, delivery_count, "Duplicate delivery absorbed");
                let settled = delivery.ack().await;
                self.finish(MessageOutcome::Duplicate, settled)
            }
            Err(e) => {
                error!(
                    %transaction_id,
                    delivery_count,
                    error = %e,
                    "Failed to persist transaction, leaving it for redelivery"
                );
                let settled = delivery.nak().await;
                self.finish(MessageOutcome::PersistFailed, settled)
            }
        }
    }

    async fn persist(&self, document: &HistoryDocument) -> Result<UpsertOutcome, HistoryError> {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.persist_timeout, self.store.upsert(document))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(HistoryError::Unavailable(format!(
                "upsert timed out after {:?}",
                self.persist_timeout
            ))),
        };
        REPLICATOR_PERSIST_DURATION.observe(start.elapsed().as_secs_f64());
        result
    }

    fn finish(&mut self, outcome: MessageOutcome, settled: Result<(), QueueError>) -> MessageOutcome {
        self.report.record(outcome);
        REPLICATOR_MESSAGES_TOTAL
            .with_label_values(&[outcome.as_str()])
            .inc();

        if let Err(e) = settled {
            // The broker redelivers after ack_wait; the upsert absorbs it
            self.report.ack_failures += 1;
            REPLICATOR_ACK_FAILURES_TOTAL.inc();
            error!(outcome = outcome.as_str(), error = %e, "Failed to settle message");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TransactionKind;
    use crate::history::MemoryHistoryStore;
    use crate::queue::{EventPublisher, MemoryQueue};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn event() -> TransactionEvent {
        TransactionEvent {
            transaction_id: Uuid::new_v4(),
            sequence: 1,
            account_id: Uuid::new_v4(),
            amount: dec!(5),
            kind: TransactionKind::Debit,
            description: String::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_process_outcomes() {
        let queue = MemoryQueue::new();
        let store = MemoryHistoryStore::new();
        let mut replicator = HistoryReplicator::new(queue.subscribe(), Arc::new(store.clone()));
        let mut source = queue.subscribe();

        let e = event();
        queue.publish(&e).await.unwrap();
        queue.publish(&e).await.unwrap();
        queue.push_raw("{").unwrap();

        let first = source.next_delivery().await.unwrap().unwrap();
        assert_eq!(replicator.process(first).await, MessageOutcome::Persisted);
        let second = source.next_delivery().await.unwrap().unwrap();
        assert_eq!(replicator.process(second).await, MessageOutcome::Duplicate);
        let third = source.next_delivery().await.unwrap().unwrap();
        assert_eq!(replicator.process(third).await, MessageOutcome::DecodeFailed);

        let report = replicator.report();
        assert_eq!(report.received, 3);
        assert_eq!(report.persisted, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.decode_failures, 1);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(queue.acked(), 2);
        assert_eq!(queue.terminated(), 1);
    }

    #[tokio::test]
    async fn test_persist_failure_naks() {
        let queue = MemoryQueue::new();
        let store = MemoryHistoryStore::new();
        store.fail_next(1);
        let mut replicator = HistoryReplicator::new(queue.subscribe(), Arc::new(store.clone()));
        let mut source = queue.subscribe();

        queue.publish(&event()).await.unwrap();
        let delivery = source.next_delivery().await.unwrap().unwrap();

        assert_eq!(replicator.process(delivery).await, MessageOutcome::PersistFailed);
        assert_eq!(queue.ready_len(), 1);
        assert_eq!(queue.acked(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let queue = MemoryQueue::new();
        let replicator =
            HistoryReplicator::new(queue.subscribe(), Arc::new(MemoryHistoryStore::new()));
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let report = replicator.run(shutdown).await;
        assert_eq!(report.received, 0);
        assert!(report.stopped_at.is_some());
    }
}
