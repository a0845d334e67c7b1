//! # mostrador-fiscal: Fiscal Document Issuance for Mostrador
//!
//! Turns committed sales into fiscal documents: electronic invoices
//! authorized by the tax authority, internal invoices for unregistered
//! issuers, and remitos (delivery notes).
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Fiscal Issuance                                  │
//! │                                                                         │
//! │  POST /sales/{id}/invoice          POST /sales/{id}/remito              │
//! │           │                                  │                          │
//! │           ▼                                  ▼                          │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                       InvoiceIssuer                              │  │
//! │  │  per-sale lock · idempotency · retry/timeout · fallback          │  │
//! │  └───────┬───────────────────────────────┬──────────────────────────┘  │
//! │          │                               │                              │
//! │          ▼                               ▼                              │
//! │  ┌────────────────────┐        ┌───────────────────────────────────┐   │
//! │  │ TaxAuthorityClient │        │ mostrador-db                      │   │
//! │  │  Real (HTTP)       │        │  invoices / remitos / sale links  │   │
//! │  │  Fallback (local)  │        └───────────────────────────────────┘   │
//! │  └────────────────────┘                                                │
//! │                                                                         │
//! │  GET /sales/{id}/documents/{kind} ──► DocumentService ──► render()      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`authority`] - `TaxAuthorityClient` and its two implementations
//! - [`config`] - `[authority]` configuration section
//! - [`error`] - Authority and fiscal error types
//! - [`issuer`] - Invoice and remito issuance
//! - [`documents`] - Rendering of stored documents
//!
//! A failed invoice never undoes the sale it belongs to; the sale was
//! committed before issuance started.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod authority;
pub mod config;
pub mod documents;
pub mod error;
pub mod issuer;

// =============================================================================
// Re-exports
// =============================================================================

pub use authority::{FallbackAuthorityClient, RealAuthorityClient, TaxAuthorityClient};
pub use config::{AuthorityConfig, AuthorityMode};
pub use documents::DocumentService;
pub use error::{AuthorityError, FiscalError, FiscalResult};
pub use issuer::InvoiceIssuer;
