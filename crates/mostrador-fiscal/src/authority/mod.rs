//! # Tax Authority Strategies
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      TaxAuthorityClient                                 │
//! │                                                                         │
//! │   next_sequence(pos, doc_type) ──► last number + 1                     │
//! │   submit(request)              ──► Authorization { code, expiry, ... } │
//! │                                                                         │
//! │   ┌──────────────────────────┐      ┌──────────────────────────────┐   │
//! │   │ RealAuthorityClient      │      │ FallbackAuthorityClient      │   │
//! │   │ HTTPS + bearer token     │      │ local simulated sequence,    │   │
//! │   │ (authority.mode = live)  │      │ placeholder code, +3 days    │   │
//! │   └──────────────────────────┘      └──────────────────────────────┘   │
//! │                                                                         │
//! │   The issuer always holds a fallback; in simulated mode it is also     │
//! │   the primary.                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod fallback;
mod live;

pub use fallback::FallbackAuthorityClient;
pub use live::RealAuthorityClient;

use async_trait::async_trait;
use mostrador_core::fiscal::{Authorization, InvoiceRequest};
use mostrador_core::{AuthorizationSource, DocumentType};

use crate::error::AuthorityError;

/// A tax authority able to number and authorize electronic invoices.
#[async_trait]
pub trait TaxAuthorityClient: Send + Sync {
    /// What the authorizations of this client are recorded as.
    fn source(&self) -> AuthorizationSource;

    /// Next document number for `(point_of_sale, document_type)`.
    async fn next_sequence(
        &self,
        point_of_sale: u32,
        document_type: DocumentType,
    ) -> Result<i64, AuthorityError>;

    /// Requests an authorization for a numbered document.
    async fn submit(&self, request: &InvoiceRequest) -> Result<Authorization, AuthorityError>;
}
