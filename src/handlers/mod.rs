//! Command Handlers module
//!
//! Handlers that validate commands and run them against the ledger store.

mod account_handler;
mod balance_mutator;
mod commands;

use std::future::Future;
use std::time::Duration;

use crate::error::AppError;
use crate::store::StoreError;

pub use account_handler::{
    AccountHandler, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT, OPENING_BALANCE_DESCRIPTION,
};
pub use balance_mutator::BalanceMutator;
pub use commands::*;

/// Run store work under a deadline. On expiry the future is dropped, which
/// rolls back any open unit of work.
async fn within_deadline<T, F>(limit: Duration, work: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    tokio::time::timeout(limit, work)
        .await
        .unwrap_or_else(|_| Err(StoreError::Timeout(limit).into()))
}
