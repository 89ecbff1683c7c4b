//! Domain Error Types
//!
//! Business rule violations, independent of the web and storage layers.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use super::{AmountError, UnknownKind};

/// Domain-specific errors.
///
/// Every variant is client-correctable and carries no side effect: they are
/// raised either before any store access or before the unit of work writes.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Input rejected before touching the store
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Debit larger than the locked balance
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    /// Target account does not exist
    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn insufficient_funds(required: Decimal, available: Decimal) -> Self {
        Self::InsufficientFunds {
            required,
            available,
        }
    }

    /// Stable label used for metrics and error codes
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::AccountNotFound(_) => "account_not_found",
        }
    }
}

impl From<AmountError> for DomainError {
    fn from(err: AmountError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<UnknownKind> for DomainError {
    fn from(err: UnknownKind) -> Self {
        Self::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_funds_message() {
        let err = DomainError::insufficient_funds(Decimal::new(150, 0), Decimal::new(100, 0));

        assert_eq!(err.code(), "insufficient_funds");
        assert!(err.to_string().contains("150"));
        assert!(err.to_string().contains("100"));
    }

    #[test]
    fn test_amount_error_is_validation() {
        let err: DomainError = AmountError::NotPositive(Decimal::ZERO).into();
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn test_unknown_kind_is_validation() {
        let err: DomainError = UnknownKind("refund".to_string()).into();
        assert!(matches!(err, DomainError::Validation(ref msg) if msg.contains("refund")));
    }
}
