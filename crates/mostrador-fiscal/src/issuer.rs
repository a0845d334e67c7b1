//! # Invoice and Remito Issuance
//!
//! ## Invoice Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  emit_invoice(sale_id, buyer)                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  per-sale lock ──► invoice exists? ── yes ──► return it (no call)       │
//! │       │ no                                                              │
//! │       ▼                                                                 │
//! │  InvoiceRequest::build ── None ──► internal document, local number      │
//! │       │ Some                                                            │
//! │       ▼                                                                 │
//! │  primary.next_sequence   retried while unavailable                      │
//! │  primary.submit          retried only if never sent                     │
//! │       │                                                                 │
//! │       ├── Rejected ─────────────► FiscalError::Rejected (nothing saved) │
//! │       ├── Unavailable ──────────► fallback (simulated authorization)    │
//! │       ▼                                                                 │
//! │  BEGIN; INSERT invoice; UPDATE sale backlink; COMMIT                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The per-sale lock only serializes requests inside this process;
//! `UNIQUE(invoices.sale_id)` settles everything else, and the loser of that
//! race returns the winner's invoice.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use backoff::backoff::Backoff;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use mostrador_core::fiscal::{
    buyer_document, document_amounts, receiver_condition_code, Authorization, BuyerTaxInfo,
    InvoiceRequest, IssuerProfile,
};
use mostrador_core::{AuthorizationSource, DocumentType, Invoice, Remito, Sale};
use mostrador_db::{
    Database, DbError, EngineError, InvoiceRepository, RemitoRepository, SaleRepository,
};

use crate::authority::{FallbackAuthorityClient, RealAuthorityClient, TaxAuthorityClient};
use crate::config::{AuthorityConfig, AuthorityMode};
use crate::error::{AuthorityError, FiscalError, FiscalResult};

// =============================================================================
// Per-sale locks
// =============================================================================

#[derive(Debug, Default)]
struct SaleLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SaleLocks {
    async fn acquire(&self, key: String) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Entries only the map still references are idle.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(key).or_default().clone()
        };
        lock.lock_owned().await
    }
}

// =============================================================================
// Issuer
// =============================================================================

/// Issues invoices and remitos for committed sales.
pub struct InvoiceIssuer {
    db: Database,
    issuer: IssuerProfile,
    primary: Arc<dyn TaxAuthorityClient>,
    fallback: Arc<FallbackAuthorityClient>,
    config: AuthorityConfig,
    locks: SaleLocks,
}

impl InvoiceIssuer {
    /// Builds the issuer selected by `authority.mode`.
    ///
    /// ## Errors
    /// * `FiscalError::Misconfigured` - live mode without URL or token
    pub fn from_config(
        db: Database,
        issuer: IssuerProfile,
        config: &AuthorityConfig,
    ) -> FiscalResult<Self> {
        config.validate()?;

        let fallback = Arc::new(FallbackAuthorityClient::new(db.clone()));
        let primary: Arc<dyn TaxAuthorityClient> = match config.mode {
            AuthorityMode::Live => {
                if !issuer.is_tax_registered() {
                    warn!(
                        business = %issuer.business_name,
                        "Live authority configured but the issuer is not tax registered; \
                         only internal documents will be produced"
                    );
                }
                Arc::new(RealAuthorityClient::new(config)?)
            }
            AuthorityMode::Simulated => fallback.clone(),
        };

        info!(mode = %config.mode, point_of_sale = issuer.point_of_sale, "Invoice issuer ready");
        Ok(Self::assemble(db, issuer, primary, fallback, config.clone()))
    }

    /// Builds an issuer around an explicit primary authority.
    pub fn with_authority(
        db: Database,
        issuer: IssuerProfile,
        primary: Arc<dyn TaxAuthorityClient>,
        config: AuthorityConfig,
    ) -> Self {
        let fallback = Arc::new(FallbackAuthorityClient::new(db.clone()));
        Self::assemble(db, issuer, primary, fallback, config)
    }

    fn assemble(
        db: Database,
        issuer: IssuerProfile,
        primary: Arc<dyn TaxAuthorityClient>,
        fallback: Arc<FallbackAuthorityClient>,
        config: AuthorityConfig,
    ) -> Self {
        InvoiceIssuer {
            db,
            issuer,
            primary,
            fallback,
            config,
            locks: SaleLocks::default(),
        }
    }

    /// The issuing business.
    pub fn issuer(&self) -> &IssuerProfile {
        &self.issuer
    }

    /// Issues the invoice for a sale, or returns the one already issued.
    ///
    /// Missing buyer fields are taken from the client snapshot on the sale.
    ///
    /// ## Returns
    /// The stored invoice. Its `authorization_source` tells whether the code
    /// came from the authority, is a simulated placeholder, or was never
    /// needed (internal document).
    ///
    /// ## Errors
    /// * `DbError::NotFound` - no such sale
    /// * `FiscalError::Rejected` - the authority refused the document
    /// * `FiscalError::Authority` - the local fallback failed as well
    pub async fn emit_invoice(&self, sale_id: &str, buyer: BuyerTaxInfo) -> FiscalResult<Invoice> {
        let _guard = self.locks.acquire(format!("invoice:{}", sale_id)).await;

        if let Some(existing) = self.db.invoices().find_by_sale(sale_id).await? {
            info!(sale_id, number = %existing.formatted_number(), "Invoice already issued");
            return Ok(existing);
        }

        let sale = self
            .db
            .sales()
            .get_by_id(sale_id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", sale_id))?;
        let buyer = buyer.or_from_sale(&sale);
        let issued_at = Utc::now();

        let today = issued_at.date_naive();
        let invoice = match InvoiceRequest::build(&sale, &self.issuer, &buyer, today) {
            Some(request) => {
                let (request, authorization) = self.authorize(request).await?;
                authorized_invoice(&request, &authorization, issued_at)
            }
            None => internal_invoice(&sale, &buyer, self.issuer.point_of_sale, issued_at),
        };

        let invoice = self.store_invoice(invoice).await?;
        info!(
            sale_id,
            document_type = %invoice.document_type,
            number = %invoice.formatted_number(),
            source = %invoice.authorization_source,
            "Invoice issued"
        );
        Ok(invoice)
    }

    /// Creates the delivery note for a sale, or returns the existing one.
    pub async fn generate_remito(&self, sale_id: &str) -> FiscalResult<Remito> {
        let _guard = self.locks.acquire(format!("remito:{}", sale_id)).await;

        if let Some(existing) = self.db.remitos().find_by_sale(sale_id).await? {
            debug!(sale_id, number = %existing.formatted_number(), "Remito already generated");
            return Ok(existing);
        }
        if self.db.sales().get_by_id(sale_id).await?.is_none() {
            return Err(DbError::not_found("Sale", sale_id).into());
        }

        let pool = self.db.pool();
        let point_of_sale = self.issuer.point_of_sale;
        let result = self
            .db
            .retry_policy()
            .run("generate_remito", || async move {
                let mut tx = pool.begin().await?;

                let remito = Remito {
                    id: Uuid::new_v4().to_string(),
                    sale_id: sale_id.to_string(),
                    point_of_sale,
                    remito_number: RemitoRepository::next_number(&mut tx, point_of_sale).await?,
                    document_ref: format!("remito:{}", sale_id),
                    generated_at: Utc::now(),
                };
                RemitoRepository::insert(&mut tx, &remito).await?;
                let linked =
                    SaleRepository::set_remito(&mut tx, sale_id, &remito.formatted_number()).await?;
                if !linked {
                    return Err(DbError::duplicate("remitos.sale_id", sale_id).into());
                }

                tx.commit().await?;
                Ok::<_, EngineError>(remito)
            })
            .await;

        match result {
            Ok(remito) => {
                info!(sale_id, number = %remito.formatted_number(), "Remito generated");
                Ok(remito)
            }
            Err(EngineError::Db(e)) if e.is_unique_on("remitos.sale_id") => {
                // Either a concurrent request stored it, or the sale already
                // carries a remito number with no remito row behind it.
                self.db.remitos().find_by_sale(sale_id).await?.ok_or_else(|| {
                    DbError::TransactionFailed(format!(
                        "sale {} already carries a remito number",
                        sale_id
                    ))
                    .into()
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    // =========================================================================
    // Authorization
    // =========================================================================

    async fn authorize(
        &self,
        request: InvoiceRequest,
    ) -> FiscalResult<(InvoiceRequest, Authorization)> {
        let err = match self.authorize_with(self.primary.as_ref(), &request).await {
            Ok(done) => return Ok(done),
            Err(err) => err,
        };

        match err {
            AuthorityError::Rejected { code, message } => {
                warn!(sale_id = %request.sale_id, %code, %message, "Invoice rejected by the tax authority");
                Err(FiscalError::Rejected {
                    sale_id: request.sale_id,
                    code,
                    message,
                })
            }
            err if self.primary.source() == AuthorizationSource::Simulated => Err(err.into()),
            err => {
                warn!(
                    sale_id = %request.sale_id,
                    error = %err,
                    "Tax authority unavailable, issuing simulated authorization"
                );
                Ok(self.authorize_with(self.fallback.as_ref(), &request).await?)
            }
        }
    }

    /// Sequence fetch followed by submission against one authority.
    async fn authorize_with(
        &self,
        authority: &dyn TaxAuthorityClient,
        request: &InvoiceRequest,
    ) -> Result<(InvoiceRequest, Authorization), AuthorityError> {
        let number = self
            .call("next_sequence", AuthorityError::is_unavailable, || {
                authority.next_sequence(request.point_of_sale, request.document_type)
            })
            .await?;

        let numbered = request.clone().with_number(number);
        let authorization = self
            .call("submit", AuthorityError::may_resubmit, || authority.submit(&numbered))
            .await?;

        Ok((numbered, authorization))
    }

    /// Runs one authority call under the request timeout, retrying with
    /// exponential back-off while `retryable` holds.
    async fn call<T, F, Fut>(
        &self,
        operation: &'static str,
        retryable: fn(&AuthorityError) -> bool,
        mut call: F,
    ) -> Result<T, AuthorityError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AuthorityError>>,
    {
        let mut backoff = self.config.backoff();
        let mut attempt = 1;

        loop {
            let result = match tokio::time::timeout(self.config.request_timeout(), call()).await {
                Ok(result) => result,
                Err(_) => Err(AuthorityError::maybe_sent(format!("{} timed out", operation))),
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !retryable(&err) || attempt >= self.config.max_attempts {
                return Err(err);
            }
            let Some(delay) = backoff.next_backoff() else {
                return Err(err);
            };

            warn!(operation, attempt, error = %err, "Authority call failed, retrying in {:?}", delay);
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Inserts the invoice and sets the sale backlink in one transaction.
    ///
    /// Internal documents get their number here, inside the same transaction.
    async fn store_invoice(&self, invoice: Invoice) -> FiscalResult<Invoice> {
        let pool = self.db.pool();
        let sale_id = invoice.sale_id.clone();

        let result = self
            .db
            .retry_policy()
            .run("emit_invoice", || {
                let mut invoice = invoice.clone();
                async move {
                    let mut tx = pool.begin().await?;

                    if invoice.authorization_source == AuthorizationSource::NotRequired {
                        invoice.document_number = InvoiceRepository::max_number(
                            &mut tx,
                            invoice.point_of_sale,
                            invoice.document_type,
                            invoice.authorization_source,
                        )
                        .await?
                            + 1;
                    }

                    InvoiceRepository::insert(&mut tx, &invoice).await?;
                    let linked = SaleRepository::set_invoice(
                        &mut tx,
                        &invoice.sale_id,
                        &invoice.formatted_number(),
                    )
                    .await?;
                    if !linked {
                        return Err(DbError::duplicate("invoices.sale_id", &invoice.sale_id).into());
                    }

                    tx.commit().await?;
                    Ok::<_, EngineError>(invoice)
                }
            })
            .await;

        match result {
            Ok(invoice) => Ok(invoice),
            Err(EngineError::Db(e)) if e.is_unique_on("invoices.sale_id") => {
                info!(sale_id = %sale_id, "Invoice already issued by a concurrent request");
                self.db
                    .invoices()
                    .find_by_sale(&sale_id)
                    .await?
                    .ok_or_else(|| DbError::not_found("Invoice", &sale_id).into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn authorized_invoice(
    request: &InvoiceRequest,
    authorization: &Authorization,
    issued_at: DateTime<Utc>,
) -> Invoice {
    Invoice {
        id: Uuid::new_v4().to_string(),
        sale_id: request.sale_id.clone(),
        document_type: request.document_type,
        point_of_sale: request.point_of_sale,
        document_number: authorization.number,
        authorization_code: Some(authorization.code.clone()),
        authorization_expiry: Some(authorization.expiry),
        authorization_source: authorization.source,
        receiver_condition: request.receiver_condition,
        buyer_doc_type: request.buyer_doc_type,
        buyer_doc_number: request.buyer_doc_number.clone(),
        net_cents: request.net_cents,
        tax_cents: request.tax_cents,
        total_cents: request.total_cents,
        issued_at,
    }
}

/// Internal document; `document_number` is assigned when stored.
fn internal_invoice(
    sale: &Sale,
    buyer: &BuyerTaxInfo,
    point_of_sale: u32,
    issued_at: DateTime<Utc>,
) -> Invoice {
    let doc = buyer_document(buyer.tax_id.as_deref());
    let (net, tax) = document_amounts(DocumentType::Internal, sale.total());

    Invoice {
        id: Uuid::new_v4().to_string(),
        sale_id: sale.id.clone(),
        document_type: DocumentType::Internal,
        point_of_sale,
        document_number: 0,
        authorization_code: None,
        authorization_expiry: None,
        authorization_source: AuthorizationSource::NotRequired,
        receiver_condition: receiver_condition_code(buyer.tax_category),
        buyer_doc_type: doc.doc_type,
        buyer_doc_number: doc.number,
        net_cents: net.cents(),
        tax_cents: tax.cents(),
        total_cents: sale.total_cents,
        issued_at,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use mostrador_core::fiscal::{IssuerCondition, SIMULATED_AUTHORIZATION_CODE};
    use mostrador_core::sale::{SaleRequest, SaleRequestItem};
    use mostrador_core::{PaymentType, Product, TaxCategory};
    use mostrador_db::DbConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type SequenceScript = Box<dyn Fn(usize) -> Result<i64, AuthorityError> + Send + Sync>;
    type SubmitScript =
        Box<dyn Fn(usize, &InvoiceRequest) -> Result<Authorization, AuthorityError> + Send + Sync>;

    /// Authority whose answers are scripted per call index.
    struct ScriptedAuthority {
        sequence: SequenceScript,
        submit: SubmitScript,
        sequence_calls: AtomicUsize,
        submit_calls: AtomicUsize,
    }

    impl ScriptedAuthority {
        fn new(sequence: SequenceScript, submit: SubmitScript) -> Arc<Self> {
            Arc::new(ScriptedAuthority {
                sequence,
                submit,
                sequence_calls: AtomicUsize::new(0),
                submit_calls: AtomicUsize::new(0),
            })
        }

        fn approving() -> Arc<Self> {
            Self::new(Box::new(|_| Ok(101)), Box::new(|_, req| Ok(approve(req))))
        }

        fn calls(&self) -> (usize, usize) {
            (
                self.sequence_calls.load(Ordering::SeqCst),
                self.submit_calls.load(Ordering::SeqCst),
            )
        }
    }

    #[async_trait]
    impl TaxAuthorityClient for ScriptedAuthority {
        fn source(&self) -> AuthorizationSource {
            AuthorizationSource::Authority
        }

        async fn next_sequence(&self, _: u32, _: DocumentType) -> Result<i64, AuthorityError> {
            let n = self.sequence_calls.fetch_add(1, Ordering::SeqCst);
            (self.sequence)(n)
        }

        async fn submit(&self, request: &InvoiceRequest) -> Result<Authorization, AuthorityError> {
            let n = self.submit_calls.fetch_add(1, Ordering::SeqCst);
            (self.submit)(n, request)
        }
    }

    fn approve(request: &InvoiceRequest) -> Authorization {
        Authorization {
            code: "74012345678901".into(),
            expiry: request.date + Duration::days(10),
            number: request.number.unwrap_or_default(),
            source: AuthorizationSource::Authority,
        }
    }

    fn registered_issuer() -> IssuerProfile {
        IssuerProfile {
            business_name: "Distribuidora Ortiz SRL".into(),
            tax_id: Some("30-71234567-8".into()),
            address: "Av. Belgrano 1450, Rosario".into(),
            condition: IssuerCondition::RegisteredTaxpayer,
            point_of_sale: 3,
            gross_income_id: None,
            activity_start: None,
        }
    }

    fn fast_config() -> AuthorityConfig {
        AuthorityConfig {
            mode: AuthorityMode::Live,
            base_url: Some("http://gateway.test".into()),
            api_token: Some("token".into()),
            request_timeout_secs: 5,
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            max_elapsed_secs: 5,
        }
    }

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn cash_sale(db: &Database, total_cents: i64) -> Sale {
        let now = Utc::now();
        let product = db
            .products()
            .insert(&Product {
                id: Uuid::new_v4().to_string(),
                name: "Yerba Mate 1kg".into(),
                price_cents: total_cents,
                stock: 10,
                is_enabled: true,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        let request = SaleRequest {
            items: vec![SaleRequestItem {
                product_id: product.id.clone(),
                quantity: 1,
                unit_price_cents: total_cents,
            }],
            client_id: None,
            seller_id: None,
            payment_type: PaymentType::Cash,
            cash_amount_cents: None,
        };
        db.processor().process_sale(&request).await.unwrap()
    }

    fn issuer_with(db: &Database, authority: Arc<ScriptedAuthority>) -> InvoiceIssuer {
        InvoiceIssuer::with_authority(db.clone(), registered_issuer(), authority, fast_config())
    }

    #[tokio::test]
    async fn test_emit_is_idempotent() {
        let db = setup().await;
        let sale = cash_sale(&db, 12100).await;
        let authority = ScriptedAuthority::approving();
        let issuer = issuer_with(&db, authority.clone());

        let first = issuer.emit_invoice(&sale.id, BuyerTaxInfo::default()).await.unwrap();
        let second = issuer.emit_invoice(&sale.id, BuyerTaxInfo::default()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(authority.calls(), (1, 1));
        assert_eq!(first.document_type, DocumentType::InvoiceB);
        assert_eq!(first.document_number, 101);
        assert_eq!(first.authorization_source, AuthorizationSource::Authority);
        assert_eq!(first.net_cents, 10000);
        assert_eq!(first.tax_cents, 2100);
        assert_eq!(first.receiver_condition, 5);

        let stored = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert!(stored.invoice_emitted);
        assert_eq!(stored.invoice_number.as_deref(), Some("00003-00000101"));
    }

    #[tokio::test]
    async fn test_registered_buyer_gets_invoice_a() {
        let db = setup().await;
        let sale = cash_sale(&db, 5000).await;
        let issuer = issuer_with(&db, ScriptedAuthority::approving());

        let buyer = BuyerTaxInfo {
            name: Some("Almacén Don Pepe".into()),
            tax_id: Some("20-30405060-7".into()),
            tax_category: Some(TaxCategory::RegisteredTaxpayer),
        };
        let invoice = issuer.emit_invoice(&sale.id, buyer).await.unwrap();

        assert_eq!(invoice.document_type, DocumentType::InvoiceA);
        assert_eq!(invoice.buyer_doc_type, 80);
        assert_eq!(invoice.buyer_doc_number, "20304050607");
        assert_eq!(invoice.receiver_condition, 1);
    }

    #[tokio::test]
    async fn test_unreachable_authority_then_recovery() {
        let db = setup().await;
        let sale = cash_sale(&db, 12100).await;

        let down = ScriptedAuthority::new(
            Box::new(|_| Err(AuthorityError::not_sent("connection refused"))),
            Box::new(|_, req| Ok(approve(req))),
        );
        let first = issuer_with(&db, down.clone())
            .emit_invoice(&sale.id, BuyerTaxInfo::default())
            .await
            .unwrap();

        assert!(first.is_simulated());
        assert_eq!(first.authorization_code.as_deref(), Some(SIMULATED_AUTHORIZATION_CODE));
        assert_eq!(
            first.authorization_expiry,
            Some(first.issued_at.date_naive() + Duration::days(3))
        );
        assert_eq!(first.document_number, 1);
        // Sequence retried up to max_attempts, nothing submitted.
        assert_eq!(down.calls(), (3, 0));

        let up = ScriptedAuthority::approving();
        let second = issuer_with(&db, up.clone())
            .emit_invoice(&sale.id, BuyerTaxInfo::default())
            .await
            .unwrap();

        assert_eq!(second, first);
        assert_eq!(up.calls(), (0, 0));
        assert_eq!(db.invoices().list_simulated().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unsent_submission_is_retried() {
        let db = setup().await;
        let sale = cash_sale(&db, 3000).await;
        let authority = ScriptedAuthority::new(
            Box::new(|_| Ok(7)),
            Box::new(|n, req| {
                if n == 0 {
                    Err(AuthorityError::not_sent("connection reset before send"))
                } else {
                    Ok(approve(req))
                }
            }),
        );

        let invoice = issuer_with(&db, authority.clone())
            .emit_invoice(&sale.id, BuyerTaxInfo::default())
            .await
            .unwrap();

        assert_eq!(authority.calls(), (1, 2));
        assert_eq!(invoice.authorization_source, AuthorizationSource::Authority);
        assert_eq!(invoice.document_number, 7);
    }

    #[tokio::test]
    async fn test_possibly_sent_submission_is_not_repeated() {
        let db = setup().await;
        let sale = cash_sale(&db, 3000).await;
        let authority = ScriptedAuthority::new(
            Box::new(|_| Ok(7)),
            Box::new(|_, _| Err(AuthorityError::maybe_sent("gateway answered 502"))),
        );

        let invoice = issuer_with(&db, authority.clone())
            .emit_invoice(&sale.id, BuyerTaxInfo::default())
            .await
            .unwrap();

        assert_eq!(authority.calls(), (1, 1));
        assert!(invoice.is_simulated());
        assert_eq!(invoice.document_number, 1);
    }

    #[tokio::test]
    async fn test_rejection_persists_nothing() {
        let db = setup().await;
        let sale = cash_sale(&db, 3000).await;
        let authority = ScriptedAuthority::new(
            Box::new(|_| Ok(7)),
            Box::new(|_, _| {
                Err(AuthorityError::Rejected {
                    code: "10015".into(),
                    message: "Documento del receptor invalido".into(),
                })
            }),
        );
        let issuer = issuer_with(&db, authority.clone());

        let err = issuer
            .emit_invoice(&sale.id, BuyerTaxInfo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FiscalError::Rejected { ref code, .. } if code == "10015"));
        assert_eq!(authority.calls(), (1, 1));

        assert!(db.invoices().find_by_sale(&sale.id).await.unwrap().is_none());
        let stored = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert!(!stored.invoice_emitted);
        assert!(stored.invoice_number.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_emits_call_authority_once() {
        let db = setup().await;
        let sale = cash_sale(&db, 4500).await;
        let authority = ScriptedAuthority::approving();
        let issuer = issuer_with(&db, authority.clone());

        let (a, b) = tokio::join!(
            issuer.emit_invoice(&sale.id, BuyerTaxInfo::default()),
            issuer.emit_invoice(&sale.id, BuyerTaxInfo::default()),
        );

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(authority.calls(), (1, 1));
    }

    #[tokio::test]
    async fn test_unregistered_issuer_gets_internal_documents() {
        let db = setup().await;
        let s1 = cash_sale(&db, 2000).await;
        let s2 = cash_sale(&db, 3500).await;
        let authority = ScriptedAuthority::approving();
        let profile = IssuerProfile {
            tax_id: None,
            condition: IssuerCondition::Unregistered,
            ..registered_issuer()
        };
        let issuer =
            InvoiceIssuer::with_authority(db.clone(), profile, authority.clone(), fast_config());

        let first = issuer.emit_invoice(&s1.id, BuyerTaxInfo::default()).await.unwrap();
        let second = issuer.emit_invoice(&s2.id, BuyerTaxInfo::default()).await.unwrap();

        assert_eq!(authority.calls(), (0, 0));
        assert_eq!(first.document_type, DocumentType::Internal);
        assert_eq!(first.authorization_source, AuthorizationSource::NotRequired);
        assert!(first.authorization_code.is_none());
        assert_eq!(first.net_cents, 2000);
        assert_eq!(first.tax_cents, 0);
        assert_eq!(first.document_number, 1);
        assert_eq!(second.document_number, 2);
    }

    #[tokio::test]
    async fn test_simulated_mode_numbers_locally() {
        let db = setup().await;
        let s1 = cash_sale(&db, 1000).await;
        let s2 = cash_sale(&db, 1000).await;
        let issuer =
            InvoiceIssuer::from_config(db.clone(), registered_issuer(), &AuthorityConfig::default())
                .unwrap();

        let first = issuer.emit_invoice(&s1.id, BuyerTaxInfo::default()).await.unwrap();
        let second = issuer.emit_invoice(&s2.id, BuyerTaxInfo::default()).await.unwrap();

        assert!(first.is_simulated() && second.is_simulated());
        assert_eq!(first.document_number, 1);
        assert_eq!(second.document_number, 2);
    }

    #[tokio::test]
    async fn test_live_mode_requires_credentials() {
        let db = setup().await;
        let config = AuthorityConfig {
            mode: AuthorityMode::Live,
            ..Default::default()
        };
        assert!(matches!(
            InvoiceIssuer::from_config(db, registered_issuer(), &config),
            Err(FiscalError::Misconfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_sale() {
        let db = setup().await;
        let issuer = issuer_with(&db, ScriptedAuthority::approving());

        let err = issuer
            .emit_invoice("missing", BuyerTaxInfo::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(issuer.generate_remito("missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_remito_is_idempotent_and_numbered() {
        let db = setup().await;
        let s1 = cash_sale(&db, 1000).await;
        let s2 = cash_sale(&db, 1000).await;
        let issuer = issuer_with(&db, ScriptedAuthority::approving());

        let first = issuer.generate_remito(&s1.id).await.unwrap();
        let again = issuer.generate_remito(&s1.id).await.unwrap();
        let other = issuer.generate_remito(&s2.id).await.unwrap();

        assert_eq!(first, again);
        assert_eq!(first.remito_number, 1);
        assert_eq!(other.remito_number, 2);
        assert_eq!(first.document_ref, format!("remito:{}", s1.id));

        let stored = db.sales().get_by_id(&s1.id).await.unwrap().unwrap();
        assert_eq!(stored.remito_number.as_deref(), Some("00003-00000001"));
    }

    #[tokio::test]
    async fn test_remito_not_stored_when_sale_already_linked() {
        let db = setup().await;
        let sale = cash_sale(&db, 1000).await;
        sqlx::query("UPDATE sales SET remito_number = '00003-00000099' WHERE id = ?1")
            .bind(&sale.id)
            .execute(db.pool())
            .await
            .unwrap();
        let issuer = issuer_with(&db, ScriptedAuthority::approving());

        let err = issuer.generate_remito(&sale.id).await.unwrap_err();
        assert!(matches!(
            err,
            FiscalError::Engine(EngineError::Db(DbError::TransactionFailed(_)))
        ));

        assert!(db.remitos().find_by_sale(&sale.id).await.unwrap().is_none());
        let stored = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(stored.remito_number.as_deref(), Some("00003-00000099"));
    }
}
