//! Ledger Store module
//!
//! Port to the primary ledger store: one row per account holding the
//! balance, and an append-only table of transaction records. Writes happen
//! inside a `LedgerUnit`, an atomic unit of work that holds exclusive row
//! locks until it commits or is dropped.

mod error;
mod memory;
mod postgres;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{Account, NewAccount, NewTransaction, TransactionRecord};

pub use error::StoreError;
pub use memory::MemoryLedger;
pub use postgres::PgLedgerStore;

/// Primary ledger store
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open an atomic unit of work
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, StoreError>;

    /// Read the committed state of an account (never blocks on row locks)
    async fn get_account(&self, account_id: Uuid) -> Result<Option<Account>, StoreError>;

    /// Committed transactions of an account in commit order
    async fn list_transactions(
        &self,
        account_id: Uuid,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, StoreError>;
}

/// An open unit of work.
///
/// Nothing written through a unit is visible to others before `commit`.
/// Dropping a unit without committing rolls every write back and releases
/// its locks.
#[async_trait]
pub trait LedgerUnit: Send {
    /// Insert a new account row
    async fn insert_account(&mut self, account: &NewAccount) -> Result<Account, StoreError>;

    /// Take the exclusive lock on an account row and read its balance.
    /// Returns `None` if the account does not exist.
    async fn lock_balance(&mut self, account_id: Uuid) -> Result<Option<Decimal>, StoreError>;

    /// Overwrite the balance of a row locked (or inserted) by this unit
    async fn update_balance(&mut self, account_id: Uuid, balance: Decimal)
        -> Result<(), StoreError>;

    /// Append a transaction record; the store assigns sequence and timestamp
    async fn append_transaction(
        &mut self,
        transaction: &NewTransaction,
    ) -> Result<TransactionRecord, StoreError>;

    /// Commit every write of this unit atomically
    async fn commit(&mut self) -> Result<(), StoreError>;
}
