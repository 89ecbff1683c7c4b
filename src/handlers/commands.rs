//! Command definitions
//!
//! Commands represent intentions to change the system state. Their
//! constructors do all input validation, so a command that exists is one
//! the store may be asked to apply.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Amount, Balance, DomainError, TransactionKind};

/// Longest accepted transaction description, in characters
pub const MAX_DESCRIPTION_LEN: usize = 512;

/// Longest accepted account name, in characters
pub const MAX_NAME_LEN: usize = 255;

// =========================================================================
// ApplyTransactionCommand
// =========================================================================

/// Command to debit or credit one account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyTransactionCommand {
    pub account_id: Uuid,
    pub amount: Amount,
    pub kind: TransactionKind,
    pub description: String,
}

impl ApplyTransactionCommand {
    pub fn new(account_id: Uuid, amount: Amount, kind: TransactionKind) -> Self {
        Self {
            account_id,
            amount,
            kind,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Validate raw request fields
    pub fn parse(
        account_id: Uuid,
        amount: Decimal,
        kind: &str,
        description: Option<String>,
    ) -> Result<Self, DomainError> {
        let amount = Amount::new(amount)?;
        let kind: TransactionKind = kind.parse()?;
        let description = description.unwrap_or_default();

        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(DomainError::validation(format!(
                "description exceeds {} characters",
                MAX_DESCRIPTION_LEN
            )));
        }

        Ok(Self {
            account_id,
            amount,
            kind,
            description,
        })
    }
}

// =========================================================================
// CreateAccountCommand
// =========================================================================

/// Command to open an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountCommand {
    pub name: String,
    pub email: String,
    pub initial_balance: Balance,
}

impl CreateAccountCommand {
    /// Validate raw request fields; a missing balance opens at zero
    pub fn parse(
        name: &str,
        email: &str,
        initial_balance: Option<Decimal>,
    ) -> Result<Self, DomainError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name must not be empty"));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(DomainError::validation(format!(
                "name exceeds {} characters",
                MAX_NAME_LEN
            )));
        }

        let email = email.trim();
        if !is_plausible_email(email) {
            return Err(DomainError::validation(format!("invalid email '{}'", email)));
        }

        let initial_balance = match initial_balance {
            Some(value) => Balance::new(value)?,
            None => Balance::zero(),
        };

        Ok(Self {
            name: name.to_string(),
            email: email.to_string(),
            initial_balance,
        })
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_transaction() {
        let id = Uuid::new_v4();
        let cmd =
            ApplyTransactionCommand::parse(id, dec!(12.5), "Debit", Some("Rent".to_string()))
                .unwrap();

        assert_eq!(cmd.account_id, id);
        assert_eq!(cmd.amount.value(), dec!(12.5));
        assert_eq!(cmd.kind, TransactionKind::Debit);
        assert_eq!(cmd.description, "Rent");
    }

    #[test]
    fn test_parse_transaction_rejects_bad_input() {
        let id = Uuid::new_v4();
        let cases = [
            ApplyTransactionCommand::parse(id, dec!(0), "debit", None),
            ApplyTransactionCommand::parse(id, dec!(-3), "credit", None),
            ApplyTransactionCommand::parse(id, dec!(0.000000001), "credit", None),
            ApplyTransactionCommand::parse(id, dec!(1000000000001), "credit", None),
            ApplyTransactionCommand::parse(id, dec!(1), "transfer", None),
            ApplyTransactionCommand::parse(id, dec!(1), "debit", Some("x".repeat(513))),
        ];

        for case in cases {
            assert!(matches!(case, Err(DomainError::Validation(_))), "{:?}", case);
        }
    }

    #[test]
    fn test_builder() {
        let cmd = ApplyTransactionCommand::new(
            Uuid::new_v4(),
            Amount::new(dec!(1)).unwrap(),
            TransactionKind::Credit,
        )
        .with_description("Refund");
        assert_eq!(cmd.description, "Refund");
    }

    #[test]
    fn test_parse_account() {
        let cmd = CreateAccountCommand::parse("  Ada ", "ada@example.com", None).unwrap();
        assert_eq!(cmd.name, "Ada");
        assert_eq!(cmd.initial_balance, Balance::zero());

        let cmd = CreateAccountCommand::parse("Ada", "ada@example.com", Some(dec!(100))).unwrap();
        assert_eq!(cmd.initial_balance.value(), dec!(100));
    }

    #[test]
    fn test_parse_account_rejects_bad_input() {
        assert!(CreateAccountCommand::parse("", "a@b.c", None).is_err());
        assert!(CreateAccountCommand::parse("Ada", "not-an-email", None).is_err());
        assert!(CreateAccountCommand::parse("Ada", "@b.c", None).is_err());
        assert!(CreateAccountCommand::parse("Ada", "a@b.c", Some(dec!(-1))).is_err());
        assert!(CreateAccountCommand::parse("Ada", "a@b.c", Some(dec!(0.123456789))).is_err());
    }
}
