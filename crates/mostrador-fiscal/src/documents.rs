//! Printable documents for stored sales.
//!
//! Loads the sale and its invoice or remito, then hands them to the pure
//! renderer in `mostrador_core::render`.

use chrono::{DateTime, Utc};
use tracing::debug;

use mostrador_core::fiscal::IssuerProfile;
use mostrador_core::render::{render, DocumentMeta};
use mostrador_core::DocumentKind;
use mostrador_db::{Database, DbError};

use crate::error::FiscalResult;

/// Renders invoices and remitos on demand.
#[derive(Debug, Clone)]
pub struct DocumentService {
    db: Database,
    issuer: IssuerProfile,
}

impl DocumentService {
    pub fn new(db: Database, issuer: IssuerProfile) -> Self {
        DocumentService { db, issuer }
    }

    /// Renders the `kind` document of a sale, stamped with the current time.
    ///
    /// ## Errors
    /// * `DbError::NotFound` - unknown sale, or the document was never issued
    /// * `FiscalError::Render` - stored data fails the integrity checks
    pub async fn render_document(&self, kind: DocumentKind, sale_id: &str) -> FiscalResult<Vec<u8>> {
        self.render_document_at(kind, sale_id, Utc::now()).await
    }

    /// Same as [`render_document`](Self::render_document) with an explicit stamp.
    pub async fn render_document_at(
        &self,
        kind: DocumentKind,
        sale_id: &str,
        generated_at: DateTime<Utc>,
    ) -> FiscalResult<Vec<u8>> {
        let sale = self
            .db
            .sales()
            .get_by_id(sale_id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", sale_id))?;

        let bytes = match kind {
            DocumentKind::Invoice => {
                let invoice = self
                    .db
                    .invoices()
                    .find_by_sale(sale_id)
                    .await?
                    .ok_or_else(|| DbError::not_found("Invoice", sale_id))?;
                render(kind, &sale, DocumentMeta::Invoice(&invoice), &self.issuer, generated_at)?
            }
            DocumentKind::Remito => {
                let remito = self
                    .db
                    .remitos()
                    .find_by_sale(sale_id)
                    .await?
                    .ok_or_else(|| DbError::not_found("Remito", sale_id))?;
                render(kind, &sale, DocumentMeta::Remito(&remito), &self.issuer, generated_at)?
            }
        };

        debug!(sale_id, %kind, bytes = bytes.len(), "Document rendered");
        Ok(bytes)
    }
}
