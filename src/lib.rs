//! bank_ledger Library
//!
//! Account ledger with locked balance mutation, plus the replicator that
//! mirrors committed transactions into a separate history store.
//! Re-exports modules for both binaries and integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod handlers;
pub mod history;
pub mod metrics;
pub mod queue;
pub mod shutdown;
pub mod store;
pub mod telemetry;

mod error;

pub use config::{Config, QueueConfig, ReplicatorConfig};
pub use domain::{Amount, AmountError, Balance, DomainError, TransactionKind};
pub use error::{AppError, ErrorResponse};
