//! Local stand-in for the authority.
//!
//! Numbers come from a sequence kept apart from authority-issued numbers,
//! so a simulated invoice never collides with a real one. The code is the
//! flagged placeholder and the expiry is three days out; such invoices are
//! listed by `InvoiceRepository::list_simulated` for later reconciliation.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use mostrador_core::fiscal::{simulated_authorization, Authorization, InvoiceRequest};
use mostrador_core::{AuthorizationSource, DocumentType};
use mostrador_db::{Database, InvoiceRepository};

use super::TaxAuthorityClient;
use crate::error::AuthorityError;

/// Produces simulated authorizations from the local database.
#[derive(Debug)]
pub struct FallbackAuthorityClient {
    db: Database,
    /// Highest number handed out per `(point_of_sale, document_type)`.
    ///
    /// Covers the window between handing out a number and the invoice row
    /// being committed.
    issued: Mutex<HashMap<(u32, DocumentType), i64>>,
}

impl FallbackAuthorityClient {
    pub fn new(db: Database) -> Self {
        FallbackAuthorityClient {
            db,
            issued: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl TaxAuthorityClient for FallbackAuthorityClient {
    fn source(&self) -> AuthorizationSource {
        AuthorizationSource::Simulated
    }

    async fn next_sequence(
        &self,
        point_of_sale: u32,
        document_type: DocumentType,
    ) -> Result<i64, AuthorityError> {
        let mut issued = self.issued.lock().await;

        let mut conn = self
            .db
            .pool()
            .acquire()
            .await
            .map_err(|e| AuthorityError::not_sent(format!("local sequence: {}", e)))?;
        let stored = InvoiceRepository::max_number(
            &mut conn,
            point_of_sale,
            document_type,
            AuthorizationSource::Simulated,
        )
        .await
        .map_err(|e| AuthorityError::not_sent(format!("local sequence: {}", e)))?;

        let last = issued.entry((point_of_sale, document_type)).or_insert(0);
        let next = stored.max(*last) + 1;
        *last = next;

        debug!(point_of_sale, %document_type, next, "Simulated sequence number");
        Ok(next)
    }

    async fn submit(&self, request: &InvoiceRequest) -> Result<Authorization, AuthorityError> {
        let number = request
            .number
            .ok_or_else(|| AuthorityError::not_sent("request has no document number"))?;
        Ok(simulated_authorization(number, request.date))
    }
}
