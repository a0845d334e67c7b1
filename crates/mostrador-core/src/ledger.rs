//! # Credit Ledger Rules
//!
//! A client's account is an append-only list of [`LedgerEntry`] rows plus a
//! materialized balance kept next to the client.
//!
//! ```text
//! balance = Σ debt − Σ payment
//!
//! credit sale:   balance + credit_portion ≤ credit_limit   (else reject)
//! payment:       0 < amount ≤ balance
//! ```
//!
//! The database layer re-applies the limit check inside the guarded UPDATE,
//! so these functions decide *what* is allowed and SQLite decides it
//! atomically.

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{Client, EntryType, LedgerEntry};
use crate::validation::validate_positive_amount;

/// Credit still available to the client.
pub fn available_credit(client: &Client) -> Money {
    client.credit_limit() - client.balance()
}

/// Rejects `credit_portion` if it would push the balance over the limit.
///
/// ## Example
/// ```rust
/// use chrono::Utc;
/// use mostrador_core::ledger::check_credit;
/// use mostrador_core::{Client, Money};
///
/// let client = Client {
///     id: "c-1".into(),
///     name: "Almacén Don Pepe".into(),
///     phone: None,
///     tax_id: None,
///     tax_category: None,
///     credit_limit_cents: 5000,
///     balance_cents: 0,
///     created_at: Utc::now(),
/// };
/// assert!(check_credit(&client, Money::from_cents(5000)).is_ok());
/// assert!(check_credit(&client, Money::from_cents(6000)).is_err());
/// ```
pub fn check_credit(client: &Client, credit_portion: Money) -> CoreResult<()> {
    if credit_portion.is_zero() {
        return Ok(());
    }

    if client.balance() + credit_portion > client.credit_limit() {
        return Err(CoreError::CreditLimitExceeded {
            client_id: client.id.clone(),
            available: available_credit(client).cents().max(0),
            requested: credit_portion.cents(),
        });
    }

    Ok(())
}

/// Validates a payment against the client's outstanding balance.
pub fn check_payment(client: &Client, amount: Money) -> CoreResult<()> {
    validate_positive_amount("amount", amount.cents())?;

    if amount > client.balance() {
        return Err(ValidationError::OutOfRange {
            field: "amount".to_string(),
            min: 1,
            max: client.balance_cents.max(0),
        }
        .into());
    }

    Ok(())
}

/// Recomputes a balance from the entry log.
pub fn balance_from_entries<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Money {
    entries.into_iter().map(LedgerEntry::signed_amount).sum()
}

/// Standard description for a debt created by a sale.
pub fn sale_debt_description(sale_id: &str) -> String {
    format!("Credit sale {}", sale_id)
}

/// Standard description for a payment when the caller gave none.
pub fn default_payment_description(entry_type: EntryType) -> &'static str {
    match entry_type {
        EntryType::Debt => "Account charge",
        EntryType::Payment => "Account payment",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn client(balance: i64, limit: i64) -> Client {
        Client {
            id: "c-1".into(),
            name: "Kiosco Norte".into(),
            phone: None,
            tax_id: None,
            tax_category: None,
            credit_limit_cents: limit,
            balance_cents: balance,
            created_at: Utc::now(),
        }
    }

    fn entry(entry_type: EntryType, amount: i64) -> LedgerEntry {
        LedgerEntry {
            id: uuid::Uuid::new_v4().to_string(),
            client_id: "c-1".into(),
            entry_type,
            amount_cents: amount,
            description: String::new(),
            sale_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_credit_limit_boundary() {
        let c = client(2000, 5000);
        assert!(check_credit(&c, Money::from_cents(3000)).is_ok());

        let err = check_credit(&c, Money::from_cents(3001)).unwrap_err();
        assert_eq!(
            err,
            CoreError::CreditLimitExceeded {
                client_id: "c-1".into(),
                available: 3000,
                requested: 3001,
            }
        );
    }

    #[test]
    fn test_zero_credit_always_passes() {
        let over = client(9000, 5000);
        assert!(check_credit(&over, Money::zero()).is_ok());
    }

    #[test]
    fn test_payment_bounds() {
        let c = client(6000, 10000);
        assert!(check_payment(&c, Money::from_cents(6000)).is_ok());
        assert!(check_payment(&c, Money::from_cents(0)).is_err());
        assert!(check_payment(&c, Money::from_cents(6001)).is_err());
    }

    #[test]
    fn test_balance_from_entries() {
        let entries = vec![
            entry(EntryType::Debt, 6000),
            entry(EntryType::Payment, 2500),
            entry(EntryType::Debt, 100),
        ];
        assert_eq!(balance_from_entries(&entries).cents(), 3600);
        let empty: Vec<LedgerEntry> = Vec::new();
        assert!(balance_from_entries(&empty).is_zero());
    }
}
