//! In-memory Ledger Store
//!
//! Same contract as the Postgres store: each account row carries an async
//! mutex standing in for the row lock, readers see only committed state,
//! and a unit's writes are applied in one step at commit.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::{Account, NewAccount, NewTransaction, TransactionRecord};

use super::{LedgerStore, LedgerUnit, StoreError};

struct AccountRow {
    lock: Arc<Mutex<()>>,
    committed: RwLock<Account>,
}

#[derive(Default)]
struct Tables {
    accounts: RwLock<HashMap<Uuid, Arc<AccountRow>>>,
    transactions: RwLock<Vec<TransactionRecord>>,
    sequence: AtomicI64,
}

/// Ledger store kept in process memory
#[derive(Clone, Default)]
pub struct MemoryLedger {
    tables: Arc<Tables>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every committed transaction, in commit order
    pub fn transactions(&self) -> Vec<TransactionRecord> {
        let mut all = self.tables.transactions.read().clone();
        all.sort_by_key(|t| t.sequence);
        all
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, StoreError> {
        Ok(Box::new(MemoryUnit {
            tables: self.tables.clone(),
            locked: HashMap::new(),
            inserted: HashMap::new(),
            appended: Vec::new(),
            open: true,
        }))
    }

    async fn get_account(&self, account_id: Uuid) -> Result<Option<Account>, StoreError> {
        let accounts = self.tables.accounts.read();
        Ok(accounts
            .get(&account_id)
            .map(|row| row.committed.read().clone()))
    }

    async fn list_transactions(
        &self,
        account_id: Uuid,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(self
            .transactions()
            .into_iter()
            .filter(|t| t.account_id == account_id)
            .take(limit)
            .collect())
    }
}

struct LockedRow {
    row: Arc<AccountRow>,
    staged_balance: Decimal,
    _guard: OwnedMutexGuard<()>,
}

/// Open unit of work over a `MemoryLedger`
pub struct MemoryUnit {
    tables: Arc<Tables>,
    locked: HashMap<Uuid, LockedRow>,
    inserted: HashMap<Uuid, Account>,
    appended: Vec<TransactionRecord>,
    open: bool,
}

impl MemoryUnit {
    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.open {
            Ok(())
        } else {
            Err(StoreError::Closed)
        }
    }

    fn holds(&self, account_id: &Uuid) -> bool {
        self.locked.contains_key(account_id) || self.inserted.contains_key(account_id)
    }
}

#[async_trait]
impl LedgerUnit for MemoryUnit {
    async fn insert_account(&mut self, account: &NewAccount) -> Result<Account, StoreError> {
        self.ensure_open()?;
        if self.tables.accounts.read().contains_key(&account.id) || self.holds(&account.id) {
            return Err(StoreError::Corrupt(format!(
                "duplicate account id {}",
                account.id
            )));
        }

        let created = Account {
            id: account.id,
            name: account.name.clone(),
            email: account.email.clone(),
            balance: account.balance.value(),
            created_at: Utc::now(),
        };
        self.inserted.insert(created.id, created.clone());
        Ok(created)
    }

    async fn lock_balance(&mut self, account_id: Uuid) -> Result<Option<Decimal>, StoreError> {
        self.ensure_open()?;
        if let Some(locked) = self.locked.get(&account_id) {
            return Ok(Some(locked.staged_balance));
        }
        if let Some(account) = self.inserted.get(&account_id) {
            return Ok(Some(account.balance));
        }

        let row = match self.tables.accounts.read().get(&account_id) {
            Some(row) => row.clone(),
            None => return Ok(None),
        };

        let guard = row.lock.clone().lock_owned().await;
        // Read after acquiring the lock: the previous holder may have committed
        let balance = row.committed.read().balance;
        self.locked.insert(
            account_id,
            LockedRow {
                row,
                staged_balance: balance,
                _guard: guard,
            },
        );
        Ok(Some(balance))
    }

    async fn update_balance(
        &mut self,
        account_id: Uuid,
        balance: Decimal,
    ) -> Result<(), StoreError> {
        self.ensure_open()?;
        if let Some(locked) = self.locked.get_mut(&account_id) {
            locked.staged_balance = balance;
            return Ok(());
        }
        if let Some(account) = self.inserted.get_mut(&account_id) {
            account.balance = balance;
            return Ok(());
        }
        Err(StoreError::NotLocked(account_id))
    }

    async fn append_transaction(
        &mut self,
        transaction: &NewTransaction,
    ) -> Result<TransactionRecord, StoreError> {
        self.ensure_open()?;
        if !self.holds(&transaction.account_id) {
            return Err(StoreError::NotLocked(transaction.account_id));
        }

        let sequence = self.tables.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let record = TransactionRecord {
            id: transaction.id,
            sequence,
            account_id: transaction.account_id,
            amount: transaction.amount.value(),
            kind: transaction.kind,
            description: transaction.description.clone(),
            balance_after: transaction.balance_after.value(),
            created_at: Utc::now(),
        };
        self.appended.push(record.clone());
        Ok(record)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.open = false;

        {
            let mut accounts = self.tables.accounts.write();
            for (id, account) in self.inserted.drain() {
                accounts.insert(
                    id,
                    Arc::new(AccountRow {
                        lock: Arc::new(Mutex::new(())),
                        committed: RwLock::new(account),
                    }),
                );
            }
            for locked in self.locked.values() {
                locked.row.committed.write().balance = locked.staged_balance;
            }
            self.tables
                .transactions
                .write()
                .extend(self.appended.drain(..));
        }

        // Row locks are released only once the log holds this unit's records
        self.locked.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Amount, Balance, TransactionKind};
    use rust_decimal_macros::dec;

    async fn seed(ledger: &MemoryLedger, balance: Decimal) -> Uuid {
        let id = Uuid::new_v4();
        let mut unit = ledger.begin().await.unwrap();
        unit.insert_account(&NewAccount {
            id,
            name: "Seed".to_string(),
            email: "seed@example.com".to_string(),
            balance: Balance::new(balance).unwrap(),
        })
        .await
        .unwrap();
        unit.commit().await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let ledger = MemoryLedger::new();
        let id = seed(&ledger, dec!(100)).await;

        let mut unit = ledger.begin().await.unwrap();
        assert_eq!(unit.lock_balance(id).await.unwrap(), Some(dec!(100)));
        unit.update_balance(id, dec!(40)).await.unwrap();

        let seen = ledger.get_account(id).await.unwrap().unwrap();
        assert_eq!(seen.balance, dec!(100));

        drop(unit);
        let seen = ledger.get_account(id).await.unwrap().unwrap();
        assert_eq!(seen.balance, dec!(100));
    }

    #[tokio::test]
    async fn test_commit_applies_balance_and_log_together() {
        let ledger = MemoryLedger::new();
        let id = seed(&ledger, dec!(100)).await;

        let mut unit = ledger.begin().await.unwrap();
        unit.lock_balance(id).await.unwrap();
        unit.update_balance(id, dec!(75)).await.unwrap();
        unit.append_transaction(&NewTransaction {
            id: Uuid::new_v4(),
            account_id: id,
            amount: Amount::new(dec!(25)).unwrap(),
            kind: TransactionKind::Debit,
            description: "test".to_string(),
            balance_after: Balance::new(dec!(75)).unwrap(),
        })
        .await
        .unwrap();
        assert!(ledger.transactions().is_empty());

        unit.commit().await.unwrap();
        assert_eq!(ledger.get_account(id).await.unwrap().unwrap().balance, dec!(75));
        assert_eq!(ledger.transactions().len(), 1);
        assert!(matches!(unit.commit().await, Err(StoreError::Closed)));
    }

    #[tokio::test]
    async fn test_row_lock_blocks_second_unit() {
        let ledger = MemoryLedger::new();
        let id = seed(&ledger, dec!(10)).await;

        let mut first = ledger.begin().await.unwrap();
        first.lock_balance(id).await.unwrap();

        let mut second = ledger.begin().await.unwrap();
        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            second.lock_balance(id),
        )
        .await;
        assert!(blocked.is_err(), "second unit must wait for the row lock");

        first.update_balance(id, dec!(3)).await.unwrap();
        first.commit().await.unwrap();

        assert_eq!(second.lock_balance(id).await.unwrap(), Some(dec!(3)));
    }

    #[tokio::test]
    async fn test_lock_missing_account() {
        let ledger = MemoryLedger::new();
        let mut unit = ledger.begin().await.unwrap();
        assert_eq!(unit.lock_balance(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_without_lock_rejected() {
        let ledger = MemoryLedger::new();
        let id = seed(&ledger, dec!(10)).await;

        let mut unit = ledger.begin().await.unwrap();
        assert!(matches!(
            unit.update_balance(id, dec!(1)).await,
            Err(StoreError::NotLocked(_))
        ));
    }
}
