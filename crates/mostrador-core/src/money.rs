//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Integer Cents Everywhere
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Where Money flows                                                      │
//! │                                                                         │
//! │  SaleLine.unit_price × quantity ──► Sale.total                          │
//! │                                       │                                 │
//! │                     ┌─────────────────┼──────────────────┐              │
//! │                     ▼                 ▼                  ▼              │
//! │              cash_amount      credit_amount      commission_amount      │
//! │                               (ledger debt)      (total × rate)         │
//! │                                                                         │
//! │  Sale.total ──► split_inclusive_tax(21%) ──► Invoice net / VAT          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use mostrador_core::money::Money;
//!
//! let price = Money::from_cents(1099);
//! let line = price * 3i64;
//! assert_eq!(line.cents(), 3297);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::types::TaxRate;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in cents.
///
/// Signed so that differences (available credit, corrections) can be
/// expressed without a second type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ## Example
    /// ```rust
    /// use mostrador_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole-units portion.
    #[inline]
    pub const fn units(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the cents portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies money by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use mostrador_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(299);
    /// assert_eq!(unit_price.multiply_quantity(3).cents(), 897);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// `self × qty`, or `None` on overflow.
    #[inline]
    pub fn checked_multiply_quantity(&self, qty: i64) -> Option<Self> {
        self.0.checked_mul(qty).map(Money)
    }

    /// `self + other`, or `None` on overflow.
    #[inline]
    pub fn checked_add(&self, other: Money) -> Option<Self> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Applies a rate in basis points, rounding half away from zero.
    ///
    /// Used for seller commissions: `total × rate`, rounded to the cent.
    ///
    /// ## Example
    /// ```rust
    /// use mostrador_core::money::Money;
    /// use mostrador_core::types::TaxRate;
    ///
    /// // 5% of 10,050 = 502.5 → 503
    /// let commission = Money::from_cents(10050).apply_rate(TaxRate::from_bps(500));
    /// assert_eq!(commission.cents(), 503);
    /// ```
    pub fn apply_rate(&self, rate: TaxRate) -> Money {
        let product = self.0 as i128 * rate.bps() as i128;
        let rounded = if product >= 0 {
            (product + 5000) / 10000
        } else {
            (product - 5000) / 10000
        };
        Money::from_cents(rounded as i64)
    }

    /// Splits a tax-inclusive amount into `(net, tax)`.
    ///
    /// Prices are stored VAT-inclusive. Fiscal documents need the two parts
    /// separately, with `net + tax == self` exactly.
    ///
    /// ```text
    /// net = round(total × 10000 / (10000 + bps))
    /// tax = total − net
    /// ```
    ///
    /// ## Example
    /// ```rust
    /// use mostrador_core::money::Money;
    /// use mostrador_core::types::TaxRate;
    ///
    /// let (net, tax) = Money::from_cents(10000).split_inclusive_tax(TaxRate::from_bps(2100));
    /// assert_eq!(net.cents(), 8264);
    /// assert_eq!(tax.cents(), 1736);
    /// ```
    pub fn split_inclusive_tax(&self, rate: TaxRate) -> (Money, Money) {
        let denominator = 10000i128 + rate.bps() as i128;
        let numerator = self.0 as i128 * 10000;
        let net = if numerator >= 0 {
            (2 * numerator + denominator) / (2 * denominator)
        } else {
            (2 * numerator - denominator) / (2 * denominator)
        };
        let net = Money::from_cents(net as i64);
        (net, *self - net)
    }

    /// Formats the amount the way fiscal documents print it: `1.234,56`.
    ///
    /// ## Example
    /// ```rust
    /// use mostrador_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(123456).to_document_string(), "1.234,56");
    /// assert_eq!(Money::from_cents(-50).to_document_string(), "-0,50");
    /// ```
    pub fn to_document_string(&self) -> String {
        let digits = self.units().abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(ch);
        }
        let sign = if self.0 < 0 { "-" } else { "" };
        format!("{}{},{:02}", sign, grouped, self.cents_part())
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-friendly display. Documents use [`Money::to_document_string`].
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, self.units().abs(), self.cents_part())
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_arithmetic() {
        let price = Money::from_cents(i64::MAX / 2);
        assert_eq!(price.checked_multiply_quantity(3), None);
        assert_eq!(
            Money::from_cents(299).checked_multiply_quantity(3),
            Some(Money::from_cents(897))
        );
        assert_eq!(Money::from_cents(i64::MAX).checked_add(Money::from_cents(1)), None);
        assert_eq!(
            Money::from_cents(100).checked_add(Money::from_cents(50)),
            Some(Money::from_cents(150))
        );
    }

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.units(), 10);
        assert_eq!(money.cents_part(), 99);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(1099)), "$10.99");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-$5.50");
        assert_eq!(format!("{}", Money::zero()), "$0.00");
    }

    #[test]
    fn test_document_string() {
        assert_eq!(Money::from_cents(0).to_document_string(), "0,00");
        assert_eq!(Money::from_cents(99999).to_document_string(), "999,99");
        assert_eq!(Money::from_cents(100000).to_document_string(), "1.000,00");
        assert_eq!(
            Money::from_cents(123456789).to_document_string(),
            "1.234.567,89"
        );
    }

    #[test]
    fn test_arithmetic_and_sum() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);
        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);

        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total.cents(), 2000);
    }

    #[test]
    fn test_apply_rate_rounds_half_up() {
        assert_eq!(
            Money::from_cents(10000)
                .apply_rate(TaxRate::from_bps(500))
                .cents(),
            500
        );
        assert_eq!(
            Money::from_cents(10050)
                .apply_rate(TaxRate::from_bps(500))
                .cents(),
            503
        );
        assert_eq!(
            Money::from_cents(10049)
                .apply_rate(TaxRate::from_bps(500))
                .cents(),
            502
        );
        assert!(Money::from_cents(10000)
            .apply_rate(TaxRate::zero())
            .is_zero());
    }

    #[test]
    fn test_split_inclusive_tax_is_exact() {
        let rate = TaxRate::from_bps(2100);
        for cents in [1, 99, 121, 1000, 10000, 12100, 999_999] {
            let total = Money::from_cents(cents);
            let (net, tax) = total.split_inclusive_tax(rate);
            assert_eq!(net + tax, total);
            assert!(!tax.is_negative());
        }

        let (net, tax) = Money::from_cents(12100).split_inclusive_tax(rate);
        assert_eq!((net.cents(), tax.cents()), (10000, 2100));
    }

    #[test]
    fn test_zero_and_checks() {
        assert!(Money::zero().is_zero());
        assert!(Money::from_cents(1).is_positive());
        assert!(Money::from_cents(-1).is_negative());
    }
}
