//! Transactions
//!
//! A transaction is an immutable fact: one debit or credit against one
//! account. It exists as the authoritative row written with the balance
//! update, and as a `TransactionEvent` travelling to the history store.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{Amount, Balance};

/// Direction of a balance change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Debit,
    Credit,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Debit => "debit",
            TransactionKind::Credit => "credit",
        }
    }

    /// Signed effect of `amount` on a balance
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            TransactionKind::Debit => -amount,
            TransactionKind::Credit => amount,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown transaction kind
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown transaction kind '{0}' (expected 'debit' or 'credit')")]
pub struct UnknownKind(pub String);

impl FromStr for TransactionKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debit" => Ok(TransactionKind::Debit),
            "credit" => Ok(TransactionKind::Credit),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

/// A transaction about to be appended inside a unit of work.
/// The store assigns `sequence` and `created_at`.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: Amount,
    pub kind: TransactionKind,
    pub description: String,
    pub balance_after: Balance,
}

/// A committed transaction as persisted in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub sequence: i64,
    pub account_id: Uuid,
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub description: String,
    pub balance_after: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Transaction event carried by the message queue, one per committed
/// transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub transaction_id: Uuid,
    pub sequence: i64,
    pub account_id: Uuid,
    pub amount: Decimal,
    pub kind: TransactionKind,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Malformed queue payload
#[derive(Debug, thiserror::Error)]
pub enum EventDecodeError {
    #[error("malformed transaction event: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid transaction event {transaction_id}: {reason}")]
    Invalid { transaction_id: Uuid, reason: String },
}

impl TransactionEvent {
    /// Stable identifier of the logical event; redeliveries share it.
    pub fn event_key(&self) -> Uuid {
        self.transaction_id
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parse a queue payload and check the fields JSON cannot express.
    pub fn decode(payload: &[u8]) -> Result<Self, EventDecodeError> {
        let event: TransactionEvent = serde_json::from_slice(payload)?;
        if event.amount <= Decimal::ZERO {
            return Err(EventDecodeError::Invalid {
                transaction_id: event.transaction_id,
                reason: format!("amount must be positive (got {})", event.amount),
            });
        }
        if event.transaction_id.is_nil() {
            return Err(EventDecodeError::Invalid {
                transaction_id: event.transaction_id,
                reason: "nil transaction id".to_string(),
            });
        }
        Ok(event)
    }
}

impl From<&TransactionRecord> for TransactionEvent {
    fn from(record: &TransactionRecord) -> Self {
        Self {
            transaction_id: record.id,
            sequence: record.sequence,
            account_id: record.account_id,
            amount: record.amount,
            kind: record.kind,
            description: record.description.clone(),
            created_at: record.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_record() -> TransactionRecord {
        TransactionRecord {
            id: Uuid::new_v4(),
            sequence: 7,
            account_id: Uuid::new_v4(),
            amount: dec!(25.50),
            kind: TransactionKind::Debit,
            description: "Coffee".to_string(),
            balance_after: dec!(74.50),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("debit".parse::<TransactionKind>().unwrap(), TransactionKind::Debit);
        assert_eq!(" Credit ".parse::<TransactionKind>().unwrap(), TransactionKind::Credit);
        assert!("refund".parse::<TransactionKind>().is_err());
    }

    #[test]
    fn test_kind_signed() {
        assert_eq!(TransactionKind::Debit.signed(dec!(10)), dec!(-10));
        assert_eq!(TransactionKind::Credit.signed(dec!(10)), dec!(10));
    }

    #[test]
    fn test_event_wire_format() {
        let record = sample_record();
        let event = TransactionEvent::from(&record);
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();

        assert_eq!(json["kind"], "debit");
        assert_eq!(json["amount"], "25.50");
        assert_eq!(json["transaction_id"], record.id.to_string());
        assert_eq!(event.event_key(), record.id);
    }

    #[test]
    fn test_decode_accepts_encoded_event() {
        let event = TransactionEvent::from(&sample_record());
        let decoded = TransactionEvent::decode(&event.encode().unwrap()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            TransactionEvent::decode(b"not json"),
            Err(EventDecodeError::Malformed(_))
        ));
        assert!(matches!(
            TransactionEvent::decode(br#"{"transaction_id": "x"}"#),
            Err(EventDecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_rejects_non_positive_amount() {
        let mut event = TransactionEvent::from(&sample_record());
        event.amount = dec!(-1);
        let payload = serde_json::to_vec(&event).unwrap();

        assert!(matches!(
            TransactionEvent::decode(&payload),
            Err(EventDecodeError::Invalid { .. })
        ));
    }
}
