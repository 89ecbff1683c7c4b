//! Postgres History Store
//!
//! One JSONB document per event key in a database separate from the
//! ledger. Replays only touch the ingestion bookkeeping columns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::TransactionEvent;

use super::{HistoryDocument, HistoryError, HistoryStore, UpsertOutcome};

/// History store backed by Postgres
#[derive(Debug, Clone)]
pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn upsert(&self, document: &HistoryDocument) -> Result<UpsertOutcome, HistoryError> {
        // xmax is zero only for a freshly inserted row version
        let inserted: bool = sqlx::query_scalar(
            r#"
            INSERT INTO transaction_history (
                event_key, account_id, document,
                first_ingested_at, last_ingested_at, delivery_count
            )
            VALUES ($1, $2, $3, $4, $4, 1)
            ON CONFLICT (event_key) DO UPDATE
            SET last_ingested_at = EXCLUDED.last_ingested_at,
                delivery_count = transaction_history.delivery_count + 1
            RETURNING (xmax = 0)
            "#,
        )
        .bind(document.key)
        .bind(document.transaction.account_id)
        .bind(Json(&document.transaction))
        .bind(document.ingested_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(if inserted {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Duplicate
        })
    }

    async fn get(&self, key: Uuid) -> Result<Option<HistoryDocument>, HistoryError> {
        let row: Option<(Uuid, Json<TransactionEvent>, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT event_key, document, first_ingested_at
            FROM transaction_history
            WHERE event_key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(key, Json(transaction), ingested_at)| HistoryDocument {
            key,
            transaction,
            ingested_at,
        }))
    }

    async fn count(&self) -> Result<u64, HistoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transaction_history")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }
}
