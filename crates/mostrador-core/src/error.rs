//! # Error Types
//!
//! Domain-specific error types for mostrador-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  mostrador-core errors (this file)                                     │
//! │  ├── CoreError        - Business rule violations                       │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  └── RenderError      - Malformed document input                       │
//! │                                                                         │
//! │  mostrador-db errors                                                   │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── EngineError      - CoreError | DbError                            │
//! │                                                                         │
//! │  mostrador-fiscal errors                                               │
//! │  └── FiscalError      - Issuance failures (rejected, misconfigured)    │
//! │                                                                         │
//! │  apps/api                                                              │
//! │  └── ApiError         - What HTTP callers see                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::types::OrderStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations raised while planning a sale or moving an order.
///
/// Every variant is returned before any persistent write happens.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The sale request carries no line items.
    #[error("Cannot process a sale with no items")]
    EmptyCart,

    /// A credit or mixed sale was requested without a client.
    ///
    /// ## When This Occurs
    /// - `payment_type` is `credit` or `mixed` and `client_id` is absent
    #[error("A client is required for {payment_type} sales")]
    MissingClient { payment_type: String },

    /// The client's balance plus the new credit would exceed their limit.
    ///
    /// ## User Workflow
    /// ```text
    /// Client balance: 2,000   Limit: 5,000
    ///      │
    ///      ▼
    /// Credit sale of 4,000
    ///      │
    ///      ▼
    /// 2,000 + 4,000 = 6,000 > 5,000
    ///      │
    ///      ▼
    /// CreditLimitExceeded { available: 3,000, requested: 4,000 }
    /// ```
    #[error("Credit limit exceeded for client {client_id}: available {available}, requested {requested}")]
    CreditLimitExceeded {
        client_id: String,
        available: i64,
        requested: i64,
    },

    /// Mixed payment split is not strictly inside (0, total).
    #[error("Invalid payment split: cash {cash_amount} must be between 0 and {total} exclusive")]
    InvalidSplit { cash_amount: i64, total: i64 },

    /// Not enough stock to cover a line.
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// Order status change is not the immediate successor of the current status.
    #[error("Invalid order transition for {order_id}: {from} -> {to}")]
    InvalidTransition {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// A referenced product does not exist or is disabled.
    #[error("Product not available: {0}")]
    ProductUnavailable(String),

    /// A commission was already paid out.
    #[error("Commission {0} is already paid")]
    CommissionAlreadyPaid(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Stable machine-readable code for API responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::EmptyCart => "EMPTY_CART",
            CoreError::MissingClient { .. } => "MISSING_CLIENT",
            CoreError::CreditLimitExceeded { .. } => "CREDIT_LIMIT_EXCEEDED",
            CoreError::InvalidSplit { .. } => "INVALID_SPLIT",
            CoreError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            CoreError::InvalidTransition { .. } => "INVALID_TRANSITION",
            CoreError::ProductUnavailable(_) => "PRODUCT_UNAVAILABLE",
            CoreError::CommissionAlreadyPaid(_) => "COMMISSION_ALREADY_PAID",
            CoreError::Validation(_) => "VALIDATION_ERROR",
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, bad tax id checksum).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Render Error
// =============================================================================

/// Malformed renderer input.
///
/// A render failure always means upstream data is inconsistent; the renderer
/// never papers over it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Line items do not add up to the sale total.
    #[error("Line items sum to {lines} but sale total is {total}")]
    TotalsMismatch { lines: i64, total: i64 },

    /// Cash plus credit does not add up to the sale total.
    #[error("Payment split {cash} + {credit} does not match total {total}")]
    SplitMismatch { cash: i64, credit: i64, total: i64 },

    /// Document metadata references a different sale.
    #[error("Document belongs to sale {meta_sale_id}, not {sale_id}")]
    SaleMismatch {
        sale_id: String,
        meta_sale_id: String,
    },

    /// Requested kind does not match the metadata supplied.
    #[error("Cannot render {kind} from the supplied metadata")]
    KindMismatch { kind: String },

    /// Electronic invoice without an authorization code.
    #[error("Electronic invoice {number} has no authorization code")]
    MissingAuthorization { number: String },

    /// More line items than the fixed page can hold.
    #[error("{lines} line items exceed the page capacity of {max}")]
    PageOverflow { lines: usize, max: usize },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
