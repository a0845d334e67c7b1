//! # Domain Types
//!
//! Core domain types used throughout Mostrador.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌───────────────┐   ┌───────────────┐   ┌───────────────┐             │
//! │  │   Product     │   │    Client     │   │    Seller     │             │
//! │  │  price, stock │   │ balance/limit │   │ rate, totals  │             │
//! │  └───────┬───────┘   └───────┬───────┘   └───────┬───────┘             │
//! │          │ snapshot          │ debt              │ commission          │
//! │          ▼                   ▼                   ▼                     │
//! │  ┌───────────────┐   ┌───────────────┐   ┌───────────────┐             │
//! │  │ Sale          │◄──│ LedgerEntry   │   │ Commission    │             │
//! │  │ items, split  │   │ debt|payment  │   │ 1:1 with sale │             │
//! │  └───┬───────┬───┘   └───────────────┘   └───────────────┘             │
//! │      │       │                                                          │
//! │      ▼       ▼                                                          │
//! │  ┌────────┐ ┌────────┐      ┌───────────────┐                          │
//! │  │Invoice │ │ Remito │      │ Order         │── completed ──► Sale     │
//! │  │ ≤1/sale│ │ ≤1/sale│      │ status machine│                          │
//! │  └────────┘ └────────┘      └───────────────┘                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! Sale and order lines copy the product name and price at the moment they
//! are written. Later catalog edits never change a historical sale.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Rate (basis points)
// =============================================================================

/// A rate in basis points (1 bps = 0.01%).
///
/// Used for the VAT rate and seller commission rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

// =============================================================================
// Enum helper
// =============================================================================

/// Implements `Display`/`FromStr` over the snake_case wire names.
macro_rules! wire_enum {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// The snake_case name used in JSON, SQL and config.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($name => Ok($ty::$variant),)+
                    _ => Err(ValidationError::NotAllowed {
                        field: stringify!($ty).to_string(),
                        allowed: vec![$($name.to_string()),+],
                    }),
                }
            }
        }
    };
}

// =============================================================================
// Product
// =============================================================================

/// A product in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub name: String,
    /// VAT-inclusive unit price in cents.
    pub price_cents: i64,
    /// Units on hand. Never negative.
    pub stock: i64,
    pub is_enabled: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the price as Money.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

// =============================================================================
// Client
// =============================================================================

/// Tax category of a buyer, as registered with the tax authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TaxCategory {
    /// VAT-registered taxpayer.
    RegisteredTaxpayer,
    /// Simplified small-taxpayer regime.
    SimplifiedRegime,
    /// End consumer with no tax registration.
    FinalConsumer,
    /// VAT exempt.
    Exempt,
    /// Outside the scope of VAT.
    NonTaxable,
}

wire_enum!(TaxCategory {
    RegisteredTaxpayer => "registered_taxpayer",
    SimplifiedRegime => "simplified_regime",
    FinalConsumer => "final_consumer",
    Exempt => "exempt",
    NonTaxable => "non_taxable",
});

/// A customer with an optional running credit account.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Client {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    /// National tax id (CUIT) or identity document number.
    pub tax_id: Option<String>,
    pub tax_category: Option<TaxCategory>,
    /// Maximum debt the client may carry, in cents.
    pub credit_limit_cents: i64,
    /// Materialized ledger balance in cents. Positive means the client owes.
    pub balance_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Client {
    /// Returns the current balance.
    #[inline]
    pub fn balance(&self) -> Money {
        Money::from_cents(self.balance_cents)
    }

    /// Returns the credit limit.
    #[inline]
    pub fn credit_limit(&self) -> Money {
        Money::from_cents(self.credit_limit_cents)
    }
}

// =============================================================================
// Seller
// =============================================================================

/// A salesperson earning commission on the sales they close.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Seller {
    pub id: String,
    pub name: String,
    pub commission_rate_bps: u32,
    /// Running total of sales closed, in cents.
    pub total_sales_cents: i64,
    /// Running total of commission earned, in cents.
    pub total_commission_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Seller {
    /// Returns the current commission rate.
    #[inline]
    pub fn commission_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.commission_rate_bps)
    }
}

// =============================================================================
// Credit Ledger
// =============================================================================

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// Credit extended to the client (raises the balance).
    Debt,
    /// Money received from the client (lowers the balance).
    Payment,
}

wire_enum!(EntryType {
    Debt => "debt",
    Payment => "payment",
});

/// One append-only row of a client's credit account.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LedgerEntry {
    pub id: String,
    pub client_id: String,
    pub entry_type: EntryType,
    /// Always positive; the sign comes from `entry_type`.
    pub amount_cents: i64,
    pub description: String,
    /// The sale that created a debt entry.
    pub sale_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Signed effect of this entry on the balance.
    pub fn signed_amount(&self) -> Money {
        match self.entry_type {
            EntryType::Debt => Money::from_cents(self.amount_cents),
            EntryType::Payment => Money::from_cents(-self.amount_cents),
        }
    }
}

// =============================================================================
// Line Items
// =============================================================================

/// A priced line on an order or a sale.
///
/// Name and price are snapshots taken when the line was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LineItem {
    pub product_id: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: i64,
}

impl LineItem {
    /// `unit_price × quantity`.
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }

    /// Like [`line_total`](Self::line_total), `None` on overflow.
    pub fn checked_line_total(&self) -> Option<Money> {
        Money::from_cents(self.unit_price_cents).checked_multiply_quantity(self.quantity)
    }
}

/// Sum of the line totals, `None` if any step overflows `i64`.
pub fn checked_lines_total(lines: &[LineItem]) -> Option<Money> {
    lines.iter().try_fold(Money::zero(), |acc, line| {
        acc.checked_add(line.checked_line_total()?)
    })
}

// =============================================================================
// Payment
// =============================================================================

/// How a sale is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    /// Fully paid at the counter.
    Cash,
    /// Fully charged to the client's account.
    Credit,
    /// Part cash, remainder charged to the account.
    Mixed,
}

wire_enum!(PaymentType {
    Cash => "cash",
    Credit => "credit",
    Mixed => "mixed",
});

impl PaymentType {
    /// Whether this payment type puts debt on a client account.
    pub const fn uses_credit(&self) -> bool {
        matches!(self, PaymentType::Credit | PaymentType::Mixed)
    }
}

/// Where a sale came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleSource {
    /// Rung up at the counter.
    Direct,
    /// Produced by completing a delivery order.
    Order,
}

wire_enum!(SaleSource {
    Direct => "direct",
    Order => "order",
});

// =============================================================================
// Sale
// =============================================================================

/// A committed sale.
///
/// Immutable once written, except `invoice_*` and `remito_number`, which go
/// from unset to set exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub client_id: Option<String>,
    pub client_name: Option<String>,
    pub client_phone: Option<String>,
    pub client_tax_id: Option<String>,
    pub client_tax_category: Option<TaxCategory>,
    pub seller_id: Option<String>,
    pub seller_name: Option<String>,
    pub payment_type: PaymentType,
    pub cash_amount_cents: i64,
    pub credit_amount_cents: i64,
    pub total_cents: i64,
    pub source: SaleSource,
    pub order_id: Option<String>,
    pub invoice_emitted: bool,
    pub invoice_number: Option<String>,
    pub remito_number: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    /// Loaded separately from `sale_items`.
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub items: Vec<LineItem>,
}

impl Sale {
    /// Returns the total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

// =============================================================================
// Commission
// =============================================================================

/// Commission owed to a seller for one sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Commission {
    pub id: String,
    pub seller_id: String,
    pub sale_id: String,
    pub sale_total_cents: i64,
    /// The seller's rate when the sale closed.
    pub commission_rate_bps: u32,
    pub commission_amount_cents: i64,
    pub is_paid: bool,
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Order
// =============================================================================

/// Delivery pipeline status.
///
/// ```text
/// pending ──► preparation ──► delivery ──► completed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Preparation,
    Delivery,
    Completed,
}

wire_enum!(OrderStatus {
    Pending => "pending",
    Preparation => "preparation",
    Delivery => "delivery",
    Completed => "completed",
});

/// A delivery order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Order {
    pub id: String,
    pub client_id: Option<String>,
    pub seller_id: Option<String>,
    pub address: String,
    /// Settlement chosen at checkout, applied when the order completes.
    pub payment_type: PaymentType,
    pub cash_amount_cents: Option<i64>,
    pub status: OrderStatus,
    /// Set only when `status == completed`.
    pub sale_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub status_updated_at: DateTime<Utc>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub items: Vec<LineItem>,
}

/// One audited status change of an order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderStatusChange {
    pub order_id: String,
    pub from_status: Option<OrderStatus>,
    pub to_status: OrderStatus,
    #[ts(as = "String")]
    pub changed_at: DateTime<Utc>,
}

// =============================================================================
// Fiscal Documents
// =============================================================================

/// Kind of fiscal document issued for a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Electronic invoice between registered taxpayers.
    InvoiceA,
    /// Electronic invoice from a registered taxpayer to anyone else.
    InvoiceB,
    /// Electronic invoice from a simplified-regime issuer.
    InvoiceC,
    /// Non-fiscal internal document; no authority involved.
    Internal,
}

wire_enum!(DocumentType {
    InvoiceA => "invoice_a",
    InvoiceB => "invoice_b",
    InvoiceC => "invoice_c",
    Internal => "internal",
});

impl DocumentType {
    /// Voucher type code used by the tax authority.
    pub const fn authority_code(&self) -> Option<u16> {
        match self {
            DocumentType::InvoiceA => Some(1),
            DocumentType::InvoiceB => Some(6),
            DocumentType::InvoiceC => Some(11),
            DocumentType::Internal => None,
        }
    }

    /// Letter printed in the header box.
    pub const fn glyph(&self) -> char {
        match self {
            DocumentType::InvoiceA => 'A',
            DocumentType::InvoiceB => 'B',
            DocumentType::InvoiceC => 'C',
            DocumentType::Internal => 'X',
        }
    }

    /// Whether the document must be authorized by the tax authority.
    pub const fn is_electronic(&self) -> bool {
        !matches!(self, DocumentType::Internal)
    }

    /// Whether VAT is itemized on the document.
    pub const fn discriminates_vat(&self) -> bool {
        matches!(self, DocumentType::InvoiceA | DocumentType::InvoiceB)
    }
}

/// Where an invoice's authorization came from.
///
/// Reconciliation relies on this to find documents that still need a real
/// authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationSource {
    /// Real code issued by the tax authority.
    Authority,
    /// Placeholder issued locally while the authority was unreachable.
    Simulated,
    /// Internal document; no authorization exists.
    NotRequired,
}

wire_enum!(AuthorizationSource {
    Authority => "authority",
    Simulated => "simulated",
    NotRequired => "not_required",
});

/// Formats a point-of-sale/number pair as `PPPPP-NNNNNNNN`.
pub fn format_document_number(point_of_sale: u32, number: i64) -> String {
    format!("{:05}-{:08}", point_of_sale, number)
}

/// The fiscal invoice issued for a sale. At most one per sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Invoice {
    pub id: String,
    pub sale_id: String,
    pub document_type: DocumentType,
    pub point_of_sale: u32,
    pub document_number: i64,
    /// CAE. `None` for internal documents.
    pub authorization_code: Option<String>,
    #[ts(as = "Option<String>")]
    pub authorization_expiry: Option<NaiveDate>,
    pub authorization_source: AuthorizationSource,
    pub receiver_condition: i64,
    pub buyer_doc_type: i64,
    pub buyer_doc_number: String,
    pub net_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    #[ts(as = "String")]
    pub issued_at: DateTime<Utc>,
}

impl Invoice {
    /// `PPPPP-NNNNNNNN`.
    pub fn formatted_number(&self) -> String {
        format_document_number(self.point_of_sale, self.document_number)
    }

    /// Whether the authorization is a local placeholder.
    pub fn is_simulated(&self) -> bool {
        self.authorization_source == AuthorizationSource::Simulated
    }
}

/// Delivery note for a sale. At most one per sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Remito {
    pub id: String,
    pub sale_id: String,
    pub point_of_sale: u32,
    pub remito_number: i64,
    /// Key under which the rendered note is retrieved.
    pub document_ref: String,
    #[ts(as = "String")]
    pub generated_at: DateTime<Utc>,
}

impl Remito {
    /// `PPPPP-NNNNNNNN`.
    pub fn formatted_number(&self) -> String {
        format_document_number(self.point_of_sale, self.remito_number)
    }
}

/// Which printable document to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    Remito,
}

wire_enum!(DocumentKind {
    Invoice => "invoice",
    Remito => "remito",
});

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_round_trip() {
        assert_eq!(OrderStatus::Preparation.to_string(), "preparation");
        assert_eq!(
            "Registered_Taxpayer".parse::<TaxCategory>().unwrap(),
            TaxCategory::RegisteredTaxpayer
        );
        assert_eq!("mixed".parse::<PaymentType>().unwrap(), PaymentType::Mixed);
        assert!("barter".parse::<PaymentType>().is_err());
    }

    #[test]
    fn test_document_type_codes() {
        assert_eq!(DocumentType::InvoiceA.authority_code(), Some(1));
        assert_eq!(DocumentType::InvoiceB.authority_code(), Some(6));
        assert_eq!(DocumentType::InvoiceC.authority_code(), Some(11));
        assert_eq!(DocumentType::Internal.authority_code(), None);
        assert_eq!(DocumentType::Internal.glyph(), 'X');
        assert!(DocumentType::InvoiceB.discriminates_vat());
        assert!(!DocumentType::InvoiceC.discriminates_vat());
    }

    #[test]
    fn test_document_number_format() {
        assert_eq!(format_document_number(1, 42), "00001-00000042");
    }

    #[test]
    fn test_ledger_entry_sign() {
        let mut entry = LedgerEntry {
            id: "e".into(),
            client_id: "c".into(),
            entry_type: EntryType::Debt,
            amount_cents: 600,
            description: String::new(),
            sale_id: None,
            created_at: Utc::now(),
        };
        assert_eq!(entry.signed_amount().cents(), 600);
        entry.entry_type = EntryType::Payment;
        assert_eq!(entry.signed_amount().cents(), -600);
    }

    #[test]
    fn test_line_total() {
        let line = LineItem {
            product_id: "p".into(),
            name: "Yerba 1kg".into(),
            unit_price_cents: 2500,
            quantity: 4,
        };
        assert_eq!(line.line_total().cents(), 10000);
    }
}
