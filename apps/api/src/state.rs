//! Shared application state.

use std::sync::Arc;

use mostrador_core::fiscal::IssuerProfile;
use mostrador_db::Database;
use mostrador_fiscal::{AuthorityConfig, DocumentService, FiscalResult, InvoiceIssuer};

/// Everything a handler needs. Cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    /// Shared so the per-sale locks are shared.
    pub invoices: Arc<InvoiceIssuer>,
    pub documents: DocumentService,
}

impl AppState {
    /// Builds the engine services around an open database.
    ///
    /// ## Errors
    /// * `FiscalError::Misconfigured` - the authority section cannot work
    pub fn new(
        db: Database,
        issuer: IssuerProfile,
        authority: &AuthorityConfig,
    ) -> FiscalResult<Self> {
        let invoices = InvoiceIssuer::from_config(db.clone(), issuer.clone(), authority)?;
        Ok(AppState {
            documents: DocumentService::new(db.clone(), issuer),
            invoices: Arc::new(invoices),
            db,
        })
    }
}
