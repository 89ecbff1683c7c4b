//! Account Handler
//!
//! Account creation and lookup. A non-zero opening balance is recorded as a
//! credit in the same unit of work as the account row.

use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::domain::{
    Account, Amount, DomainError, NewAccount, NewTransaction, TransactionKind, TransactionRecord,
};
use crate::error::AppError;
use crate::queue::EventPublisher;
use crate::store::{LedgerStore, LedgerUnit};

use super::balance_mutator::publish_committed;
use super::{within_deadline, CreateAccountCommand};

/// Description of the credit recording an opening balance
pub const OPENING_BALANCE_DESCRIPTION: &str = "Opening balance";

pub const DEFAULT_HISTORY_LIMIT: i64 = 100;
pub const MAX_HISTORY_LIMIT: i64 = 1000;

/// Handler for account creation and queries
pub struct AccountHandler {
    store: Arc<dyn LedgerStore>,
    publisher: Arc<dyn EventPublisher>,
    timeout: Duration,
}

impl AccountHandler {
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

    /// Open an account
    pub async fn create(&self, command: CreateAccountCommand) -> Result<Account, AppError> {
        let (mut unit, account, opening) =
            within_deadline(self.timeout, self.insert(command)).await?;
        unit.commit().await?;

        info!(
            account_id = %account.id,
            balance = %account.balance,
            "Account created"
        );

        if let Some(record) = opening {
            publish_committed(self.publisher.as_ref(), &record).await;
        }
        Ok(account)
    }

    async fn insert(
        &self,
        command: CreateAccountCommand,
    ) -> Result<(Box<dyn LedgerUnit>, Account, Option<TransactionRecord>), AppError> {
        let mut unit = self.store.begin().await?;

        let account = unit
            .insert_account(&NewAccount {
                id: Uuid::new_v4(),
                name: command.name,
                email: command.email,
                balance: command.initial_balance,
            })
            .await?;

        let opening = if command.initial_balance.value().is_zero() {
            None
        } else {
            let amount = Amount::new(command.initial_balance.value()).map_err(DomainError::from)?;
            Some(
                unit.append_transaction(&NewTransaction {
                    id: Uuid::new_v4(),
                    account_id: account.id,
                    amount,
                    kind: TransactionKind::Credit,
                    description: OPENING_BALANCE_DESCRIPTION.to_string(),
                    balance_after: command.initial_balance,
                })
                .await?,
            )
        };

        Ok((unit, account, opening))
    }

    /// Look up an account
    pub async fn get(&self, account_id: Uuid) -> Result<Account, AppError> {
        within_deadline(self.timeout, async {
            let account = self.store.get_account(account_id).await?;
            account.ok_or(AppError::Domain(DomainError::AccountNotFound(account_id)))
        })
        .await
    }

    /// Transactions of one account in commit order, oldest first
    pub async fn history(
        &self,
        account_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<TransactionRecord>, AppError> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
            return Err(DomainError::validation(format!(
                "limit must be between 1 and {}",
                MAX_HISTORY_LIMIT
            ))
            .into());
        }

        within_deadline(self.timeout, async {
            if self.store.get_account(account_id).await?.is_none() {
                return Err(AppError::Domain(DomainError::AccountNotFound(account_id)));
            }
            let records = self.store.list_transactions(account_id, limit).await?;
            Ok::<_, AppError>(records)
        })
        .await
    }
}
