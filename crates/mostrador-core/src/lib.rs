//! # mostrador-core: Pure Business Logic for Mostrador
//!
//! This crate holds every rule of the sale and fiscal engine that can be
//! expressed without touching a database, a socket or a clock.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Mostrador Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    apps/api (axum)                              │   │
//! │  │   POST /sales, POST /orders/{id}/status, POST /sales/{id}/...  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        mostrador-fiscal          mostrador-db                   │   │
//! │  │        (authority client)        (SQLite, atomic commit)        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ mostrador-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ ┌──────────────┐  │   │
//! │  │  │ types  │ │  sale  │ │ ledger │ │ order  │ │ fiscal/render│  │   │
//! │  │  │ money  │ │  plan  │ │ limits │ │ states │ │ CAE, layout  │  │   │
//! │  │  └────────┘ └────────┘ └────────┘ └────────┘ └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Client, Sale, Order, Invoice, ...)
//! - [`money`] - Money type with integer arithmetic
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//! - [`sale`] - Pure sale planning (totals, payment split, stock check)
//! - [`ledger`] - Credit ledger rules
//! - [`order`] - Order fulfillment state machine
//! - [`commission`] - Seller commission math
//! - [`fiscal`] - Tax authority request building and code tables
//! - [`render`] - Deterministic document renderer
//!
//! ## Example Usage
//!
//! ```rust
//! use mostrador_core::money::Money;
//! use mostrador_core::types::TaxRate;
//!
//! let price = Money::from_cents(12100);
//! let (net, vat) = price.split_inclusive_tax(TaxRate::from_bps(2100));
//! assert_eq!(net.cents(), 10000);
//! assert_eq!(vat.cents(), 2100);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod commission;
pub mod error;
pub mod fiscal;
pub mod ledger;
pub mod money;
pub mod order;
pub mod render;
pub mod sale;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, RenderError, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines on a single sale or order. Every committed sale must print
/// on one document page, so this is also the renderer's item table size.
pub const MAX_SALE_LINES: usize = 30;

/// Highest unit price accepted, in cents ($ 99.999.999,99).
pub const MAX_UNIT_PRICE_CENTS: i64 = 9_999_999_999;

/// Highest line or sale total accepted, in cents ($ 999.999.999,99).
pub const MAX_SALE_TOTAL_CENTS: i64 = 99_999_999_999;

/// Maximum quantity of a single line.
///
/// ## Business Reason
/// Catches fat-finger input (1000 typed instead of 10) before stock is touched.
pub const MAX_ITEM_QUANTITY: i64 = 9_999;

/// The single flat VAT rate applied to every fiscal document (21%).
pub const VAT_RATE: types::TaxRate = types::TaxRate::from_bps(2100);
