//! In-memory History Store

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use super::{HistoryDocument, HistoryError, HistoryStore, UpsertOutcome};

struct StoredDocument {
    document: HistoryDocument,
    deliveries: u64,
}

#[derive(Default)]
struct Inner {
    documents: RwLock<HashMap<Uuid, StoredDocument>>,
    failures_left: AtomicU32,
}

/// History store kept in process memory.
///
/// `fail_next` makes the next upserts fail, to exercise redelivery.
#[derive(Clone, Default)]
pub struct MemoryHistoryStore {
    inner: Arc<Inner>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` upserts with `HistoryError::Unavailable`
    pub fn fail_next(&self, n: u32) {
        self.inner.failures_left.store(n, Ordering::SeqCst);
    }

    /// How many upserts hit this key, first write included
    pub fn delivery_count(&self, key: Uuid) -> u64 {
        self.inner
            .documents
            .read()
            .get(&key)
            .map(|stored| stored.deliveries)
            .unwrap_or(0)
    }

    pub fn documents(&self) -> Vec<HistoryDocument> {
        let mut all: Vec<HistoryDocument> = self
            .inner
            .documents
            .read()
            .values()
            .map(|stored| stored.document.clone())
            .collect();
        all.sort_by_key(|d| d.transaction.sequence);
        all
    }

    fn take_failure(&self) -> bool {
        self.inner
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn upsert(&self, document: &HistoryDocument) -> Result<UpsertOutcome, HistoryError> {
        if self.take_failure() {
            return Err(HistoryError::Unavailable("injected failure".to_string()));
        }

        let mut documents = self.inner.documents.write();
        match documents.get_mut(&document.key) {
            Some(stored) => {
                stored.deliveries += 1;
                Ok(UpsertOutcome::Duplicate)
            }
            None => {
                documents.insert(
                    document.key,
                    StoredDocument {
                        document: document.clone(),
                        deliveries: 1,
                    },
                );
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn get(&self, key: Uuid) -> Result<Option<HistoryDocument>, HistoryError> {
        Ok(self
            .inner
            .documents
            .read()
            .get(&key)
            .map(|stored| stored.document.clone()))
    }

    async fn count(&self) -> Result<u64, HistoryError> {
        Ok(self.inner.documents.read().len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TransactionEvent, TransactionKind};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn document() -> HistoryDocument {
        HistoryDocument::from_event(TransactionEvent {
            transaction_id: Uuid::new_v4(),
            sequence: 1,
            account_id: Uuid::new_v4(),
            amount: dec!(12.34),
            kind: TransactionKind::Credit,
            description: "Salary".to_string(),
            created_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_upsert_keeps_first_document() {
        let store = MemoryHistoryStore::new();
        let first = document();
        let mut replay = first.clone();
        replay.ingested_at = Utc::now() + chrono::Duration::seconds(5);

        assert_eq!(store.upsert(&first).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(&replay).await.unwrap(), UpsertOutcome::Duplicate);

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get(first.key).await.unwrap(), Some(first.clone()));
        assert_eq!(store.delivery_count(first.key), 2);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryHistoryStore::new();
        store.fail_next(2);
        let doc = document();

        assert!(store.upsert(&doc).await.is_err());
        assert!(store.upsert(&doc).await.is_err());
        assert_eq!(store.upsert(&doc).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(store.delivery_count(doc.key), 1);
    }
}
