//! # HTTP Routes
//!
//! ```text
//! POST /sales                          process_sale
//! GET  /sales/{id}                     stored sale with items
//! POST /sales/{id}/invoice             emit_invoice (idempotent)
//! POST /sales/{id}/remito              generate_remito (idempotent)
//! GET  /sales/{id}/documents/{kind}    render_document (invoice | remito)
//! POST /orders                         create_order
//! POST /orders/{id}/status             advance_order
//! POST /clients/{id}/payments          register_payment
//! POST /commissions/{id}/paid          mark_commission_paid
//! GET  /invoices/simulated             invoices awaiting reconciliation
//! GET  /health
//! ```

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::debug;

use mostrador_core::fiscal::BuyerTaxInfo;
use mostrador_core::order::NewOrder;
use mostrador_core::sale::SaleRequest;
use mostrador_core::{
    Commission, DocumentKind, Invoice, LedgerEntry, Money, Order, OrderStatus, Remito, Sale,
};
use mostrador_db::{migrations, DbError, OrderAdvance};

use crate::error::ApiError;
use crate::state::AppState;

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sales", post(create_sale))
        .route("/sales/{id}", get(get_sale))
        .route("/sales/{id}/invoice", post(emit_invoice))
        .route("/sales/{id}/remito", post(generate_remito))
        .route("/sales/{id}/documents/{kind}", get(render_document))
        .route("/orders", post(create_order))
        .route("/orders/{id}/status", post(advance_order))
        .route("/clients/{id}/payments", post(register_payment))
        .route("/commissions/{id}/paid", post(mark_commission_paid))
        .route("/invoices/simulated", get(list_simulated))
        .with_state(state)
}

// =============================================================================
// Request / Response Bodies
// =============================================================================

/// Body of `POST /orders/{id}/status`.
#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: OrderStatus,
}

/// Body of `POST /clients/{id}/payments`.
#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub amount_cents: i64,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub database: bool,
    pub migrations_applied: usize,
    pub migrations_total: usize,
}

// =============================================================================
// Sales
// =============================================================================

async fn create_sale(
    State(state): State<AppState>,
    Json(request): Json<SaleRequest>,
) -> Result<(StatusCode, Json<Sale>), ApiError> {
    debug!(items = request.items.len(), payment_type = %request.payment_type, "POST /sales");
    let sale = state.db.processor().process_sale(&request).await?;
    Ok((StatusCode::CREATED, Json(sale)))
}

async fn get_sale(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Sale>, ApiError> {
    let sale = state
        .db
        .sales()
        .get_by_id(&id)
        .await?
        .ok_or_else(|| DbError::not_found("Sale", &id))?;
    Ok(Json(sale))
}

async fn emit_invoice(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(buyer): Json<BuyerTaxInfo>,
) -> Result<Json<Invoice>, ApiError> {
    let invoice = state.invoices.emit_invoice(&id, buyer).await?;
    Ok(Json(invoice))
}

async fn generate_remito(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Remito>, ApiError> {
    let remito = state.invoices.generate_remito(&id).await?;
    Ok(Json(remito))
}

async fn render_document(
    State(state): State<AppState>,
    Path((id, kind)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let kind: DocumentKind = kind
        .parse()
        .map_err(|e: mostrador_core::ValidationError| ApiError::bad_request(e.to_string()))?;
    let bytes = state.documents.render_document(kind, &id).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=us-ascii")], bytes))
}

async fn list_simulated(State(state): State<AppState>) -> Result<Json<Vec<Invoice>>, ApiError> {
    Ok(Json(state.db.invoices().list_simulated().await?))
}

// =============================================================================
// Orders
// =============================================================================

async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<NewOrder>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state.db.processor().create_order(&request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn advance_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(change): Json<StatusChange>,
) -> Result<Json<OrderAdvance>, ApiError> {
    debug!(order_id = %id, target = %change.status, "POST /orders/status");
    let advance = state.db.processor().advance_order(&id, change.status).await?;
    Ok(Json(advance))
}

// =============================================================================
// Credit and Commissions
// =============================================================================

async fn register_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payment): Json<PaymentRequest>,
) -> Result<(StatusCode, Json<LedgerEntry>), ApiError> {
    let entry = state
        .db
        .clients()
        .register_payment(&id, Money::from_cents(payment.amount_cents), payment.description)
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn mark_commission_paid(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Commission>, ApiError> {
    Ok(Json(state.db.sellers().mark_commission_paid(&id).await?))
}

// =============================================================================
// Health
// =============================================================================

async fn health(State(state): State<AppState>) -> Json<Health> {
    let database = state.db.health_check().await;
    let (migrations_total, migrations_applied) = migrations::migration_status(state.db.pool())
        .await
        .unwrap_or((0, 0));

    Json(Health {
        status: if database { "ok" } else { "degraded" },
        database,
        migrations_applied,
        migrations_total,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mostrador_core::fiscal::{IssuerCondition, IssuerProfile};
    use mostrador_core::sale::SaleRequestItem;
    use mostrador_core::{AuthorizationSource, Client, PaymentType, Product, Seller, TaxCategory};
    use mostrador_db::{Database, DbConfig};
    use mostrador_fiscal::AuthorityConfig;
    use uuid::Uuid;

    async fn state() -> AppState {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let issuer = IssuerProfile {
            business_name: "Distribuidora Ortiz SRL".into(),
            tax_id: Some("30-71234567-8".into()),
            address: "Av. Belgrano 1450, Rosario".into(),
            condition: IssuerCondition::RegisteredTaxpayer,
            point_of_sale: 3,
            gross_income_id: None,
            activity_start: None,
        };
        AppState::new(db, issuer, &AuthorityConfig::default()).unwrap()
    }

    async fn product(state: &AppState, price_cents: i64, stock: i64) -> Product {
        let now = Utc::now();
        state
            .db
            .products()
            .insert(&Product {
                id: Uuid::new_v4().to_string(),
                name: "Galletitas de Agua".into(),
                price_cents,
                stock,
                is_enabled: true,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap()
    }

    async fn client(state: &AppState, limit: i64) -> Client {
        state
            .db
            .clients()
            .insert(&Client {
                id: Uuid::new_v4().to_string(),
                name: "Despensa Mirta".into(),
                phone: None,
                tax_id: None,
                tax_category: Some(TaxCategory::FinalConsumer),
                credit_limit_cents: limit,
                balance_cents: 0,
                created_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    fn items(product: &Product, quantity: i64) -> Vec<SaleRequestItem> {
        vec![SaleRequestItem {
            product_id: product.id.clone(),
            quantity,
            unit_price_cents: product.price_cents,
        }]
    }

    #[tokio::test]
    async fn test_sale_invoice_and_documents() {
        let state = state().await;
        let p = product(&state, 850, 10).await;

        let request = SaleRequest {
            items: items(&p, 2),
            client_id: None,
            seller_id: None,
            payment_type: PaymentType::Cash,
            cash_amount_cents: None,
        };
        let (status, Json(sale)) = create_sale(State(state.clone()), Json(request)).await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(sale.total_cents, 1700);

        let Json(invoice) = emit_invoice(
            State(state.clone()),
            Path(sale.id.clone()),
            Json(BuyerTaxInfo::default()),
        )
        .await
        .unwrap();
        assert_eq!(invoice.authorization_source, AuthorizationSource::Simulated);

        let Json(remito) = generate_remito(State(state.clone()), Path(sale.id.clone()))
            .await
            .unwrap();
        assert_eq!(remito.remito_number, 1);

        let page = render_document(State(state.clone()), Path((sale.id.clone(), "invoice".into())))
            .await
            .unwrap()
            .into_response();
        assert_eq!(page.status(), StatusCode::OK);

        let err = render_document(State(state.clone()), Path((sale.id.clone(), "receipt".into())))
            .await
            .err()
            .unwrap();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let Json(stored) = get_sale(State(state.clone()), Path(sale.id.clone())).await.unwrap();
        assert!(stored.invoice_emitted);
        assert!(stored.remito_number.is_some());

        let Json(pending) = list_simulated(State(state)).await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_rule_violations_map_to_status_codes() {
        let state = state().await;
        let p = product(&state, 6000, 1).await;
        let c = client(&state, 5000).await;

        let empty = SaleRequest {
            items: vec![],
            client_id: None,
            seller_id: None,
            payment_type: PaymentType::Cash,
            cash_amount_cents: None,
        };
        let err = create_sale(State(state.clone()), Json(empty)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let over_limit = SaleRequest {
            items: items(&p, 1),
            client_id: Some(c.id.clone()),
            seller_id: None,
            payment_type: PaymentType::Credit,
            cash_amount_cents: None,
        };
        let err = create_sale(State(state.clone()), Json(over_limit)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code(), "CREDIT_LIMIT_EXCEEDED");

        let too_many = SaleRequest {
            items: items(&p, 2),
            client_id: None,
            seller_id: None,
            payment_type: PaymentType::Cash,
            cash_amount_cents: None,
        };
        let err = create_sale(State(state.clone()), Json(too_many)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err = get_sale(State(state), Path("missing".into())).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_order_lifecycle_over_http() {
        let state = state().await;
        let p = product(&state, 1200, 5).await;
        let c = client(&state, 10000).await;

        let new_order = NewOrder {
            items: items(&p, 3),
            client_id: Some(c.id.clone()),
            seller_id: None,
            address: "Mitre 220, Funes".into(),
            payment_type: PaymentType::Credit,
            cash_amount_cents: None,
        };
        let (status, Json(order)) = create_order(State(state.clone()), Json(new_order))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(order.status, OrderStatus::Pending);

        let skip = advance_order(
            State(state.clone()),
            Path(order.id.clone()),
            Json(StatusChange {
                status: OrderStatus::Completed,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(skip.status(), StatusCode::CONFLICT);

        let mut last = None;
        for status in [
            OrderStatus::Preparation,
            OrderStatus::Delivery,
            OrderStatus::Completed,
        ] {
            let Json(advance) = advance_order(
                State(state.clone()),
                Path(order.id.clone()),
                Json(StatusChange { status }),
            )
            .await
            .unwrap();
            last = Some(advance);
        }

        let advance = last.unwrap();
        assert_eq!(advance.order.status, OrderStatus::Completed);
        let sale = advance.sale.unwrap();
        assert_eq!(sale.credit_amount_cents, 3600);

        let (status, Json(entry)) = register_payment(
            State(state.clone()),
            Path(c.id.clone()),
            Json(PaymentRequest {
                amount_cents: 1000,
                description: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(entry.amount_cents, 1000);

        let overpay = register_payment(
            State(state),
            Path(c.id.clone()),
            Json(PaymentRequest {
                amount_cents: 999_999,
                description: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(overpay.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_commission_paid_once() {
        let state = state().await;
        let p = product(&state, 10000, 5).await;
        let seller = state
            .db
            .sellers()
            .insert(&Seller {
                id: Uuid::new_v4().to_string(),
                name: "Julián Ortiz".into(),
                commission_rate_bps: 300,
                total_sales_cents: 0,
                total_commission_cents: 0,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let request = SaleRequest {
            items: items(&p, 1),
            client_id: None,
            seller_id: Some(seller.id.clone()),
            payment_type: PaymentType::Cash,
            cash_amount_cents: None,
        };
        let (_, Json(sale)) = create_sale(State(state.clone()), Json(request)).await.unwrap();
        let commission = state
            .db
            .sellers()
            .commission_for_sale(&sale.id)
            .await
            .unwrap()
            .unwrap();

        let Json(paid) = mark_commission_paid(State(state.clone()), Path(commission.id.clone()))
            .await
            .unwrap();
        assert!(paid.is_paid);

        let again = mark_commission_paid(State(state), Path(commission.id))
            .await
            .unwrap_err();
        assert_eq!(again.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_health() {
        let state = state().await;
        let Json(health) = health(State(state)).await;
        assert_eq!(health.status, "ok");
        assert!(health.database);
        assert_eq!(health.migrations_applied, health.migrations_total);
    }
}
