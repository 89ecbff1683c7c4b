//! Balance Mutator
//!
//! Applies one debit or credit to one account:
//! begin -> lock row -> check funds -> write balance -> append record ->
//! commit, then publish the committed record. Any failure before commit
//! drops the unit of work, which rolls it back.
//!
//! The deadline covers everything up to commit. Once `commit` is issued the
//! outcome belongs to the store, bounded by its own statement timeout, so a
//! transaction the store accepted is never reported as failed.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{
    Balance, DomainError, NewTransaction, TransactionEvent, TransactionKind, TransactionRecord,
};
use crate::error::AppError;
use crate::metrics::{self, LEDGER_PUBLISH_TOTAL};
use crate::queue::EventPublisher;
use crate::store::{LedgerStore, LedgerUnit, StoreError};

use super::{within_deadline, ApplyTransactionCommand};

// =========================================================================
// BalanceMutator
// =========================================================================

/// Locked read-modify-write of account balances
pub struct BalanceMutator {
    store: Arc<dyn LedgerStore>,
    publisher: Arc<dyn EventPublisher>,
    timeout: Duration,
}

impl BalanceMutator {
    /// `timeout` bounds the unit of work up to commit, lock wait included
    pub fn new(
        store: Arc<dyn LedgerStore>,
        publisher: Arc<dyn EventPublisher>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            publisher,
            timeout,
        }
    }

    /// Apply the command and return the committed record.
    ///
    /// Concurrent calls on one account serialize on its row lock; calls on
    /// different accounts do not wait for each other.
    pub async fn apply(
        &self,
        command: ApplyTransactionCommand,
    ) -> Result<TransactionRecord, AppError> {
        let result = self.execute(&command).await;

        let outcome = match &result {
            Ok(_) => "committed",
            Err(e) => e.code(),
        };
        metrics::record_transaction(command.kind.as_str(), outcome);

        match result {
            Ok(record) => {
                info!(
                    transaction_id = %record.id,
                    account_id = %record.account_id,
                    kind = %record.kind,
                    amount = %record.amount,
                    balance_after = %record.balance_after,
                    sequence = record.sequence,
                    "Transaction committed"
                );
                publish_committed(self.publisher.as_ref(), &record).await;
                Ok(record)
            }
            Err(AppError::StoreUnavailable(e)) => {
                error!(
                    account_id = %command.account_id,
                    kind = %command.kind,
                    error = %e,
                    "Transaction not applied, ledger store unavailable"
                );
                Err(AppError::StoreUnavailable(e))
            }
            Err(e) => {
                warn!(
                    account_id = %command.account_id,
                    kind = %command.kind,
                    amount = %command.amount,
                    outcome,
                    "Transaction rejected: {}",
                    e
                );
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        command: &ApplyTransactionCommand,
    ) -> Result<TransactionRecord, AppError> {
        let (mut unit, record) = within_deadline(self.timeout, self.stage(command)).await?;
        unit.commit().await?;
        Ok(record)
    }

    /// Everything but the commit, holding the row lock in the returned unit
    async fn stage(
        &self,
        command: &ApplyTransactionCommand,
    ) -> Result<(Box<dyn LedgerUnit>, TransactionRecord), AppError> {
        let mut unit = self.store.begin().await?;

        let current = unit
            .lock_balance(command.account_id)
            .await?
            .ok_or(DomainError::AccountNotFound(command.account_id))?;
        let balance = Balance::new(current).map_err(|e| {
            StoreError::Corrupt(format!("account {}: {}", command.account_id, e))
        })?;

        let new_balance = match command.kind {
            TransactionKind::Debit => {
                if !balance.is_sufficient_for(&command.amount) {
                    return Err(DomainError::insufficient_funds(
                        command.amount.value(),
                        balance.value(),
                    )
                    .into());
                }
                balance.debit(&command.amount).map_err(DomainError::from)?
            }
            TransactionKind::Credit => balance.credit(&command.amount).map_err(|e| {
                DomainError::validation(format!("credit would overflow balance: {}", e))
            })?,
        };

        unit.update_balance(command.account_id, new_balance.value())
            .await?;
        let record = unit
            .append_transaction(&NewTransaction {
                id: Uuid::new_v4(),
                account_id: command.account_id,
                amount: command.amount,
                kind: command.kind,
                description: command.description.clone(),
                balance_after: new_balance,
            })
            .await?;

        Ok((unit, record))
    }
}

/// Publish a record that is already committed.
///
/// The ledger stays authoritative: a failure is logged and counted but
/// never reported to the caller.
pub(crate) async fn publish_committed(publisher: &dyn EventPublisher, record: &TransactionRecord) {
    let event = TransactionEvent::from(record);
    match publisher.publish(&event).await {
        Ok(()) => {
            LEDGER_PUBLISH_TOTAL.with_label_values(&["success"]).inc();
        }
        Err(e) => {
            LEDGER_PUBLISH_TOTAL.with_label_values(&["error"]).inc();
            error!(
                transaction_id = %record.id,
                account_id = %record.account_id,
                error = %e,
                "Failed to publish committed transaction"
            );
        }
    }
}
