//! Ledger Store Errors

use std::time::Duration;
use uuid::Uuid;

/// Errors raised by the primary ledger store.
///
/// All of them are infrastructure failures: the balance mutator reports
/// them as `StoreUnavailable` and the open unit of work is rolled back.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Unit of work exceeded its deadline
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    /// Unit of work was already committed
    #[error("Unit of work is closed")]
    Closed,

    /// Write attempted on an account row this unit does not hold
    #[error("Account {0} is not locked by this unit of work")]
    NotLocked(Uuid),

    /// Row could not be mapped back into a domain value
    #[error("Corrupt ledger row: {0}")]
    Corrupt(String),
}
