//! Postgres Ledger Store
//!
//! Row locks are taken with `SELECT ... FOR UPDATE`; every unit of work is a
//! database transaction with a transaction-local statement timeout.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{Account, NewAccount, NewTransaction, TransactionKind, TransactionRecord};

use super::{LedgerStore, LedgerUnit, StoreError};

type AccountRow = (Uuid, String, String, Decimal, DateTime<Utc>);
type TransactionRow = (Uuid, i64, Uuid, Decimal, String, String, Decimal, DateTime<Utc>);

fn account_from_row((id, name, email, balance, created_at): AccountRow) -> Account {
    Account {
        id,
        name,
        email,
        balance,
        created_at,
    }
}

fn transaction_from_row(row: TransactionRow) -> Result<TransactionRecord, StoreError> {
    let (id, sequence, account_id, amount, kind, description, balance_after, created_at) = row;
    let kind: TransactionKind = kind
        .parse()
        .map_err(|e: crate::domain::UnknownKind| StoreError::Corrupt(e.to_string()))?;

    Ok(TransactionRecord {
        id,
        sequence,
        account_id,
        amount,
        kind,
        description,
        balance_after,
        created_at,
    })
}

/// Ledger store backed by Postgres
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Bounds lock waits as well as slow statements
        sqlx::query("SELECT set_config('statement_timeout', $1, true)")
            .bind(format!("{}ms", self.statement_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;

        Ok(Box::new(PgLedgerUnit { tx: Some(tx) }))
    }

    async fn get_account(&self, account_id: Uuid) -> Result<Option<Account>, StoreError> {
        let row: Option<AccountRow> = sqlx::query_as(
            r#"
            SELECT id, name, email, balance, created_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(account_from_row))
    }

    async fn list_transactions(
        &self,
        account_id: Uuid,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let rows: Vec<TransactionRow> = sqlx::query_as(
            r#"
            SELECT id, seq, account_id, amount, kind, description, balance_after, created_at
            FROM transactions
            WHERE account_id = $1
            ORDER BY seq ASC
            LIMIT $2
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(transaction_from_row).collect()
    }
}

/// One Postgres transaction. Dropping it before commit rolls back.
pub struct PgLedgerUnit {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgLedgerUnit {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        self.tx.as_mut().ok_or(StoreError::Closed)
    }
}

#[async_trait]
impl LedgerUnit for PgLedgerUnit {
    async fn insert_account(&mut self, account: &NewAccount) -> Result<Account, StoreError> {
        let tx = self.tx()?;
        let row: AccountRow = sqlx::query_as(
            r#"
            INSERT INTO accounts (id, name, email, balance)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, email, balance, created_at
            "#,
        )
        .bind(account.id)
        .bind(&account.name)
        .bind(&account.email)
        .bind(account.balance.value())
        .fetch_one(&mut **tx)
        .await?;

        Ok(account_from_row(row))
    }

    async fn lock_balance(&mut self, account_id: Uuid) -> Result<Option<Decimal>, StoreError> {
        let tx = self.tx()?;
        let balance: Option<Decimal> =
            sqlx::query_scalar("SELECT balance FROM accounts WHERE id = $1 FOR UPDATE")
                .bind(account_id)
                .fetch_optional(&mut **tx)
                .await?;

        Ok(balance)
    }

    async fn update_balance(
        &mut self,
        account_id: Uuid,
        balance: Decimal,
    ) -> Result<(), StoreError> {
        let tx = self.tx()?;
        let rows_affected = sqlx::query("UPDATE accounts SET balance = $2 WHERE id = $1")
            .bind(account_id)
            .bind(balance)
            .execute(&mut **tx)
            .await?
            .rows_affected();

        if rows_affected == 0 {
            return Err(StoreError::NotLocked(account_id));
        }
        Ok(())
    }

    async fn append_transaction(
        &mut self,
        transaction: &NewTransaction,
    ) -> Result<TransactionRecord, StoreError> {
        let tx = self.tx()?;
        let row: TransactionRow = sqlx::query_as(
            r#"
            INSERT INTO transactions (id, account_id, amount, kind, description, balance_after)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, seq, account_id, amount, kind, description, balance_after, created_at
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.account_id)
        .bind(transaction.amount.value())
        .bind(transaction.kind.as_str())
        .bind(&transaction.description)
        .bind(transaction.balance_after.value())
        .fetch_one(&mut **tx)
        .await?;

        transaction_from_row(row)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::Closed)?;
        tx.commit().await?;
        Ok(())
    }
}
