//! # Sale Transaction Processor
//!
//! Commits a sale (and, for delivery orders, the order's completion) as one
//! SQLite write transaction.
//!
//! ## Commit Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    read products / client / seller                                      │
//! │    plan_sale()                        ← rules 1-5, no writes yet        │
//! │    UPDATE products ... stock >= qty   ← per product, guarded            │
//! │    UPDATE clients ... <= limit        ← credit portion, guarded         │
//! │    INSERT ledger_entries (debt)                                         │
//! │    INSERT commissions + seller totals                                   │
//! │    INSERT sales + sale_items                                            │
//! │    UPDATE orders ... status='delivery' ← only when completing an order  │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  Any error → ROLLBACK (the transaction is dropped), nothing persisted  │
//! │  SQLITE_BUSY → whole transaction retried, linear back-off              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The guarded statements re-check, atomically, what `plan_sale` checked
//! against the snapshots. A concurrent writer that got there first makes the
//! guard match zero rows, and the sale fails with the same error the plan
//! would have produced.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, EngineError, EngineResult, Retryable};
use crate::repository::client::ClientRepository;
use crate::repository::order::OrderRepository;
use crate::repository::product::ProductRepository;
use crate::repository::sale::SaleRepository;
use crate::repository::seller::SellerRepository;
use mostrador_core::ledger::{check_credit, sale_debt_description};
use mostrador_core::order::{validate_new_order, validate_transition, NewOrder};
use mostrador_core::sale::{plan_sale, SaleRequest, SaleRequestItem};
use mostrador_core::{
    Commission, CoreError, EntryType, LedgerEntry, LineItem, Order, OrderStatus, Sale, SaleSource,
};

// =============================================================================
// Retry Policy
// =============================================================================

/// Whole-transaction retry on `SQLITE_BUSY`.
///
/// Attempt `n` waits `backoff_step × n` before running again.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            backoff_step: Duration::from_millis(25),
        }
    }
}

impl RetryPolicy {
    /// Runs `attempt` until it succeeds, fails with a non-busy error, or the
    /// policy runs out of attempts.
    ///
    /// `attempt` must open and commit its own transaction so every retry
    /// starts from a fresh snapshot.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> EngineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let mut n = 1;
        loop {
            match attempt().await {
                Err(e) if e.should_retry() && n < self.max_attempts => {
                    warn!(operation, attempt = n, error = %e, "Write conflict, retrying transaction");
                    tokio::time::sleep(self.backoff_step * n).await;
                    n += 1;
                }
                result => return result,
            }
        }
    }
}

// =============================================================================
// Processor
// =============================================================================

/// Result of [`SaleProcessor::advance_order`].
#[derive(Debug, Clone, Serialize)]
pub struct OrderAdvance {
    pub order: Order,
    /// The sale committed when the order reached `completed`.
    pub sale: Option<Sale>,
}

/// Runs sales, order creation and order transitions.
#[derive(Debug, Clone)]
pub struct SaleProcessor {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl SaleProcessor {
    /// Creates a new SaleProcessor.
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        SaleProcessor { pool, retry }
    }

    /// Validates and commits a counter sale.
    ///
    /// ## Errors
    /// * `CoreError::*` - a business rule failed; nothing was written
    /// * `DbError::NotFound` - the referenced client or seller does not exist
    /// * `DbError::Busy` - write conflicts outlasted the retry policy
    pub async fn process_sale(&self, request: &SaleRequest) -> EngineResult<Sale> {
        self.retry
            .run("process_sale", || self.try_process_sale(request, None))
            .await
    }

    /// Stores a new delivery order as `pending`.
    ///
    /// Stock and credit are not reserved; they are checked when the order
    /// completes.
    pub async fn create_order(&self, request: &NewOrder) -> EngineResult<Order> {
        validate_new_order(request)?;

        let mut conn = self.pool.acquire().await?;
        let mut items = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let product = ProductRepository::fetch(&mut conn, &item.product_id)
                .await?
                .filter(|p| p.is_enabled)
                .ok_or_else(|| CoreError::ProductUnavailable(item.product_id.clone()))?;
            items.push(LineItem {
                product_id: product.id,
                name: product.name,
                unit_price_cents: item.unit_price_cents,
                quantity: item.quantity,
            });
        }

        if let Some(client_id) = &request.client_id {
            ClientRepository::fetch(&mut conn, client_id)
                .await?
                .ok_or_else(|| DbError::not_found("Client", client_id))?;
        }
        if let Some(seller_id) = &request.seller_id {
            SellerRepository::fetch(&mut conn, seller_id)
                .await?
                .ok_or_else(|| DbError::not_found("Seller", seller_id))?;
        }
        drop(conn);

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4().to_string(),
            client_id: request.client_id.clone(),
            seller_id: request.seller_id.clone(),
            address: request.address.trim().to_string(),
            payment_type: request.payment_type,
            cash_amount_cents: request.cash_amount_cents,
            status: OrderStatus::Pending,
            sale_id: None,
            created_at: now,
            status_updated_at: now,
            items,
        };

        self.retry.run("create_order", || async {
            OrderRepository::new(self.pool.clone())
                .insert(&order)
                .await
                .map_err(Into::into)
        })
        .await?;

        info!(order_id = %order.id, items = order.items.len(), "Order created");
        Ok(order)
    }

    /// Moves an order to `target`, which must be its immediate successor.
    ///
    /// Reaching `completed` commits the order's sale in the same transaction
    /// that marks the order completed. If the sale fails the order stays in
    /// `delivery`.
    pub async fn advance_order(
        &self,
        order_id: &str,
        target: OrderStatus,
    ) -> EngineResult<OrderAdvance> {
        let sale = self
            .retry
            .run("advance_order", || self.try_advance_order(order_id, target))
            .await?;

        let order = OrderRepository::new(self.pool.clone())
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_id))?;

        Ok(OrderAdvance { order, sale })
    }

    // =========================================================================
    // Transaction bodies
    // =========================================================================

    async fn try_advance_order(
        &self,
        order_id: &str,
        target: OrderStatus,
    ) -> EngineResult<Option<Sale>> {
        let mut conn = self.pool.acquire().await?;
        let order = OrderRepository::fetch(&mut conn, order_id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_id))?;
        drop(conn);

        validate_transition(&order.id, order.status, target)?;

        if target == OrderStatus::Completed {
            let request = sale_request_for(&order);
            let sale = self.try_process_sale(&request, Some(&order)).await?;
            return Ok(Some(sale));
        }

        let mut tx = self.pool.begin().await?;
        let moved =
            OrderRepository::set_status(&mut tx, order_id, order.status, target, Utc::now())
                .await?;
        if !moved {
            let current = OrderRepository::fetch_status(&mut tx, order_id)
                .await?
                .unwrap_or(order.status);
            return Err(CoreError::InvalidTransition {
                order_id: order_id.to_string(),
                from: current,
                to: target,
            }
            .into());
        }
        tx.commit().await?;

        info!(order_id = %order_id, from = %order.status, to = %target, "Order advanced");
        Ok(None)
    }

    async fn try_process_sale(
        &self,
        request: &SaleRequest,
        order: Option<&Order>,
    ) -> EngineResult<Sale> {
        let mut tx = self.pool.begin().await?;

        // Snapshots
        let mut products = HashMap::new();
        for id in request.product_ids() {
            if let Some(product) = ProductRepository::fetch(&mut tx, &id).await? {
                products.insert(id, product);
            }
        }

        let client = match &request.client_id {
            Some(id) => Some(
                ClientRepository::fetch(&mut tx, id)
                    .await?
                    .ok_or_else(|| DbError::not_found("Client", id))?,
            ),
            None => None,
        };

        let seller = match &request.seller_id {
            Some(id) => Some(
                SellerRepository::fetch(&mut tx, id)
                    .await?
                    .ok_or_else(|| DbError::not_found("Seller", id))?,
            ),
            None => None,
        };

        let plan = plan_sale(request, &products, client.as_ref(), seller.as_ref())?;

        let sale_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        debug!(sale_id = %sale_id, total = plan.total.cents(), "Sale planned");

        // Stock
        for (product_id, quantity) in &plan.stock_deductions {
            if !ProductRepository::decrement_stock(&mut tx, product_id, *quantity).await? {
                let available = ProductRepository::fetch(&mut tx, product_id)
                    .await?
                    .map(|p| p.stock)
                    .unwrap_or(0);
                return Err(CoreError::InsufficientStock {
                    product_id: product_id.clone(),
                    available,
                    requested: *quantity,
                }
                .into());
            }
        }

        // Credit
        if plan.credit_amount.is_positive() {
            let client = client
                .as_ref()
                .ok_or_else(|| DbError::Internal("credit sale without client".to_string()))?;

            if !ClientRepository::extend_credit(&mut tx, &client.id, plan.credit_amount).await? {
                let current = ClientRepository::fetch(&mut tx, &client.id)
                    .await?
                    .ok_or_else(|| DbError::not_found("Client", &client.id))?;
                check_credit(&current, plan.credit_amount)?;
                return Err(DbError::TransactionFailed(format!(
                    "credit for client {} lost a concurrent update",
                    client.id
                ))
                .into());
            }

            let entry = LedgerEntry {
                id: Uuid::new_v4().to_string(),
                client_id: client.id.clone(),
                entry_type: EntryType::Debt,
                amount_cents: plan.credit_amount.cents(),
                description: sale_debt_description(&sale_id),
                sale_id: Some(sale_id.clone()),
                created_at: now,
            };
            ClientRepository::append_ledger_entry(&mut tx, &entry).await?;
        }

        // Commission
        if let Some(planned) = &plan.commission {
            let commission = Commission {
                id: Uuid::new_v4().to_string(),
                seller_id: planned.seller_id.clone(),
                sale_id: sale_id.clone(),
                sale_total_cents: planned.sale_total.cents(),
                commission_rate_bps: planned.rate.bps(),
                commission_amount_cents: planned.amount.cents(),
                is_paid: false,
                paid_at: None,
                created_at: now,
            };
            SellerRepository::record_commission(&mut tx, &commission).await?;
        }

        // Sale
        let sale = Sale {
            id: sale_id,
            client_id: client.as_ref().map(|c| c.id.clone()),
            client_name: client.as_ref().map(|c| c.name.clone()),
            client_phone: client.as_ref().and_then(|c| c.phone.clone()),
            client_tax_id: client.as_ref().and_then(|c| c.tax_id.clone()),
            client_tax_category: client.as_ref().and_then(|c| c.tax_category),
            seller_id: seller.as_ref().map(|s| s.id.clone()),
            seller_name: seller.as_ref().map(|s| s.name.clone()),
            payment_type: plan.payment_type,
            cash_amount_cents: plan.cash_amount.cents(),
            credit_amount_cents: plan.credit_amount.cents(),
            total_cents: plan.total.cents(),
            source: if order.is_some() {
                SaleSource::Order
            } else {
                SaleSource::Direct
            },
            order_id: order.map(|o| o.id.clone()),
            invoice_emitted: false,
            invoice_number: None,
            remito_number: None,
            created_at: now,
            items: plan.lines,
        };
        if let Err(e) = SaleRepository::insert(&mut tx, &sale).await {
            return match order {
                // Another completion already wrote this order's sale.
                Some(order) if e.is_unique_on("sales.order_id") => {
                    Err(completion_conflict(&mut tx, order).await)
                }
                _ => Err(e.into()),
            };
        }

        // Order completion
        if let Some(order) = order {
            if !OrderRepository::complete(&mut tx, &order.id, &sale.id, now).await? {
                return Err(completion_conflict(&mut tx, order).await);
            }
        }

        tx.commit().await?;

        info!(
            sale_id = %sale.id,
            total = sale.total_cents,
            payment_type = %sale.payment_type,
            cash = sale.cash_amount_cents,
            credit = sale.credit_amount_cents,
            order_id = ?sale.order_id,
            "Sale committed"
        );
        Ok(sale)
    }
}

/// `InvalidTransition` carrying the order's status as seen inside `conn`.
async fn completion_conflict(conn: &mut SqliteConnection, order: &Order) -> EngineError {
    let current = match OrderRepository::fetch_status(conn, &order.id).await {
        Ok(status) => status.unwrap_or(OrderStatus::Delivery),
        Err(e) => return e.into(),
    };
    CoreError::InvalidTransition {
        order_id: order.id.clone(),
        from: current,
        to: OrderStatus::Completed,
    }
    .into()
}

/// The sale an order turns into when it completes.
fn sale_request_for(order: &Order) -> SaleRequest {
    SaleRequest {
        items: order
            .items
            .iter()
            .map(|item| SaleRequestItem {
                product_id: item.product_id.clone(),
                quantity: item.quantity,
                unit_price_cents: item.unit_price_cents,
            })
            .collect(),
        client_id: order.client_id.clone(),
        seller_id: order.seller_id.clone(),
        payment_type: order.payment_type,
        cash_amount_cents: order.cash_amount_cents,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
