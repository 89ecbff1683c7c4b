//! Transaction History module
//!
//! The secondary, append-oriented copy of every committed transaction and
//! the replicator that fills it from the message queue.

mod error;
mod memory;
mod postgres;
mod replicator;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::TransactionEvent;

pub use error::HistoryError;
pub use memory::MemoryHistoryStore;
pub use postgres::PgHistoryStore;
pub use replicator::{HistoryReplicator, MessageOutcome, ReplicationReport};

/// One mirrored transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryDocument {
    /// Derived from the event, identical across redeliveries
    pub key: Uuid,
    pub transaction: TransactionEvent,
    /// When this document was first written
    pub ingested_at: DateTime<Utc>,
}

impl HistoryDocument {
    pub fn from_event(transaction: TransactionEvent) -> Self {
        Self {
            key: transaction.event_key(),
            transaction,
            ingested_at: Utc::now(),
        }
    }
}

/// Result of an idempotent upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First write for this key
    Inserted,
    /// Key already present; stored document left as it was
    Duplicate,
}

/// Secondary history store
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Write the document unless its key is already present
    async fn upsert(&self, document: &HistoryDocument) -> Result<UpsertOutcome, HistoryError>;

    async fn get(&self, key: Uuid) -> Result<Option<HistoryDocument>, HistoryError>;

    async fn count(&self) -> Result<u64, HistoryError>;
}
