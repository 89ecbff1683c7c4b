//! History Store Errors

use thiserror::Error;

/// Secondary history store failure. Always transient from the replicator's
/// point of view: the message is left for redelivery.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Document could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Store refused or could not take the write
    #[error("History store unavailable: {0}")]
    Unavailable(String),
}
