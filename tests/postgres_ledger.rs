//! Postgres Integration Tests
//!
//! Need migrated databases:
//!   DATABASE_URL=... HISTORY_DATABASE_URL=... cargo test -- --ignored

use chrono::Utc;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use bank_ledger::db;
use bank_ledger::domain::{Amount, DomainError, TransactionEvent, TransactionKind};
use bank_ledger::handlers::{AccountHandler, ApplyTransactionCommand, BalanceMutator, CreateAccountCommand};
use bank_ledger::history::{HistoryDocument, HistoryStore, PgHistoryStore, UpsertOutcome};
use bank_ledger::queue::MemoryQueue;
use bank_ledger::store::{LedgerStore, PgLedgerStore};
use bank_ledger::AppError;

const TIMEOUT: Duration = Duration::from_secs(5);

async fn ledger() -> (Arc<BalanceMutator>, AccountHandler) {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = db::connect(&url, 10, TIMEOUT).await.unwrap();
    assert!(db::check_schema(&pool, db::LEDGER_TABLES).await.unwrap());

    let store: Arc<dyn LedgerStore> = Arc::new(PgLedgerStore::new(pool, TIMEOUT));
    let queue = Arc::new(MemoryQueue::new());
    (
        Arc::new(BalanceMutator::new(store.clone(), queue.clone(), TIMEOUT)),
        AccountHandler::new(store, queue, TIMEOUT),
    )
}

async fn open(accounts: &AccountHandler, balance: rust_decimal::Decimal) -> Uuid {
    let command = CreateAccountCommand::parse("Pg Test", "pg@example.com", Some(balance)).unwrap();
    accounts.create(command).await.unwrap().id
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_pg_debit_credit_and_history() {
    let (mutator, accounts) = ledger().await;
    let id = open(&accounts, dec!(100)).await;

    let debit = mutator
        .apply(ApplyTransactionCommand::new(
            id,
            Amount::new(dec!(30.25)).unwrap(),
            TransactionKind::Debit,
        ))
        .await
        .unwrap();
    assert_eq!(debit.balance_after, dec!(69.75));

    let overdraft = mutator
        .apply(ApplyTransactionCommand::new(
            id,
            Amount::new(dec!(1000)).unwrap(),
            TransactionKind::Debit,
        ))
        .await;
    assert!(matches!(
        overdraft,
        Err(AppError::Domain(DomainError::InsufficientFunds { .. }))
    ));

    assert_eq!(accounts.get(id).await.unwrap().balance, dec!(69.75));
    let history = accounts.history(id, None).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].id, debit.id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires DATABASE_URL"]
async fn test_pg_concurrent_debits_serialize() {
    let (mutator, accounts) = ledger().await;
    let id = open(&accounts, dec!(100)).await;

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let mutator = mutator.clone();
            tokio::spawn(async move {
                mutator
                    .apply(ApplyTransactionCommand::new(
                        id,
                        Amount::new(dec!(30)).unwrap(),
                        TransactionKind::Debit,
                    ))
                    .await
            })
        })
        .collect();

    let mut committed = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            committed += 1;
        }
    }

    assert_eq!(committed, 3);
    assert_eq!(accounts.get(id).await.unwrap().balance, dec!(10));
}

#[tokio::test]
#[ignore = "requires HISTORY_DATABASE_URL"]
async fn test_pg_history_upsert_is_idempotent() {
    let url = std::env::var("HISTORY_DATABASE_URL").expect("HISTORY_DATABASE_URL must be set");
    let pool = db::connect(&url, 5, TIMEOUT).await.unwrap();
    assert!(db::check_schema(&pool, db::HISTORY_TABLES).await.unwrap());
    let store = PgHistoryStore::new(pool);

    let event = TransactionEvent {
        transaction_id: Uuid::new_v4(),
        sequence: 7,
        account_id: Uuid::new_v4(),
        amount: dec!(12.5),
        kind: TransactionKind::Credit,
        description: "Refund".to_string(),
        created_at: Utc::now(),
    };
    let before = store.count().await.unwrap();

    let first = store
        .upsert(&HistoryDocument::from_event(event.clone()))
        .await
        .unwrap();
    let second = store
        .upsert(&HistoryDocument::from_event(event.clone()))
        .await
        .unwrap();

    assert_eq!(first, UpsertOutcome::Inserted);
    assert_eq!(second, UpsertOutcome::Duplicate);
    assert_eq!(store.count().await.unwrap(), before + 1);

    let stored = store.get(event.transaction_id).await.unwrap().unwrap();
    assert_eq!(stored.transaction.amount, dec!(12.5));
    assert_eq!(stored.transaction.kind, TransactionKind::Credit);
}
