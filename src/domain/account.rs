//! Account
//!
//! Account records are created once and never deleted. Only the balance
//! changes after creation, and only through the balance mutator.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Balance;

/// Account as stored in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Account about to be inserted; the opening balance is recorded
/// separately as a credit.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub balance: Balance,
}
