//! Common test utilities
//!
//! Builds the ledger stack on the in-memory adapters.

#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use bank_ledger::api::{self, AppState};
use bank_ledger::domain::{Account, NewAccount, NewTransaction, TransactionEvent, TransactionRecord};
use bank_ledger::handlers::{AccountHandler, BalanceMutator, CreateAccountCommand};
use bank_ledger::queue::{EventPublisher, MemoryQueue, QueueError};
use bank_ledger::store::{LedgerStore, LedgerUnit, MemoryLedger, StoreError};

pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Ledger, queue and handlers wired together in memory
#[derive(Clone)]
pub struct TestLedger {
    pub ledger: MemoryLedger,
    pub queue: MemoryQueue,
    pub mutator: Arc<BalanceMutator>,
    pub accounts: Arc<AccountHandler>,
}

impl TestLedger {
    pub fn new() -> Self {
        let queue = MemoryQueue::new();
        Self::with_publisher(queue.clone(), Arc::new(queue))
    }

    /// Same stack, publishing through `publisher` instead of the queue
    pub fn with_publisher(queue: MemoryQueue, publisher: Arc<dyn EventPublisher>) -> Self {
        let ledger = MemoryLedger::new();
        let store: Arc<dyn LedgerStore> = Arc::new(ledger.clone());

        Self {
            mutator: Arc::new(BalanceMutator::new(
                store.clone(),
                publisher.clone(),
                TEST_TIMEOUT,
            )),
            accounts: Arc::new(AccountHandler::new(store, publisher, TEST_TIMEOUT)),
            ledger,
            queue,
        }
    }

    pub async fn open_account(&self, balance: Decimal) -> Account {
        let command = CreateAccountCommand::parse("Test Account", "test@example.com", Some(balance))
            .expect("valid account command");
        self.accounts
            .create(command)
            .await
            .expect("account creation failed")
    }

    pub async fn balance(&self, account_id: Uuid) -> Decimal {
        self.accounts
            .get(account_id)
            .await
            .expect("account lookup failed")
            .balance
    }

    pub fn records_for(&self, account_id: Uuid) -> Vec<TransactionRecord> {
        self.ledger
            .transactions()
            .into_iter()
            .filter(|t| t.account_id == account_id)
            .collect()
    }

    pub fn router(&self) -> axum::Router {
        api::build_router(AppState {
            mutator: self.mutator.clone(),
            accounts: self.accounts.clone(),
        })
    }
}

/// Publisher that always fails
#[derive(Default)]
pub struct FailingPublisher {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl EventPublisher for FailingPublisher {
    async fn publish(&self, _event: &TransactionEvent) -> Result<(), QueueError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(QueueError::Publish("broker unreachable".to_string()))
    }
}

/// Where a `StallingStore` unit gets stuck
#[derive(Clone, Copy)]
pub enum Stall {
    /// `append_transaction` never returns
    Append,
    /// `commit` lands, then the acknowledgement arrives after the delay
    CommitAck(Duration),
}

/// Ledger store whose units stall at one step
pub struct StallingStore {
    pub inner: MemoryLedger,
    pub stall: Stall,
}

#[async_trait]
impl LedgerStore for StallingStore {
    async fn begin(&self) -> Result<Box<dyn LedgerUnit>, StoreError> {
        Ok(Box::new(StallingUnit {
            inner: self.inner.begin().await?,
            stall: self.stall,
        }))
    }

    async fn get_account(&self, account_id: Uuid) -> Result<Option<Account>, StoreError> {
        self.inner.get_account(account_id).await
    }

    async fn list_transactions(
        &self,
        account_id: Uuid,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        self.inner.list_transactions(account_id, limit).await
    }
}

struct StallingUnit {
    inner: Box<dyn LedgerUnit>,
    stall: Stall,
}

#[async_trait]
impl LedgerUnit for StallingUnit {
    async fn insert_account(&mut self, account: &NewAccount) -> Result<Account, StoreError> {
        self.inner.insert_account(account).await
    }

    async fn lock_balance(&mut self, account_id: Uuid) -> Result<Option<Decimal>, StoreError> {
        self.inner.lock_balance(account_id).await
    }

    async fn update_balance(&mut self, account_id: Uuid, balance: Decimal) -> Result<(), StoreError> {
        self.inner.update_balance(account_id, balance).await
    }

    async fn append_transaction(
        &mut self,
        transaction: &NewTransaction,
    ) -> Result<TransactionRecord, StoreError> {
        if let Stall::Append = self.stall {
            std::future::pending::<()>().await;
        }
        self.inner.append_transaction(transaction).await
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.inner.commit().await?;
        if let Stall::CommitAck(delay) = self.stall {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}
