//! # Order Repository
//!
//! Orders, their items and the status audit trail.
//!
//! Every status write is guarded on the status the caller read:
//!
//! ```text
//! UPDATE orders SET status = :to ... WHERE id = :id AND status = :from
//! ```
//!
//! so two clerks pressing "advance" at the same time move the order once;
//! the loser sees zero rows affected and reports `InvalidTransition`.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use mostrador_core::{LineItem, Order, OrderStatus, OrderStatusChange};

const ORDER_COLUMNS: &str = "id, client_id, seller_id, address, payment_type, \
     cash_amount_cents, status, sale_id, created_at, status_updated_at";

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Gets an order by ID, items included.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn, id).await
    }

    /// Reads an order (with items) on a caller-owned connection or transaction.
    pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLUMNS);
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        let Some(mut order) = order else {
            return Ok(None);
        };

        order.items = sqlx::query_as::<_, LineItem>(
            r#"
            SELECT product_id, name, unit_price_cents, quantity
            FROM order_items
            WHERE order_id = ?1
            ORDER BY line_no
            "#,
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(Some(order))
    }

    /// Current status only.
    pub async fn fetch_status(
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<OrderStatus>> {
        let status = sqlx::query_scalar::<_, OrderStatus>("SELECT status FROM orders WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(status)
    }

    /// Stores a new order with its items and the initial history row.
    pub async fn insert(&self, order: &Order) -> DbResult<()> {
        debug!(id = %order.id, items = order.items.len(), "Inserting order");

        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO orders ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            ORDER_COLUMNS
        ))
        .bind(&order.id)
        .bind(&order.client_id)
        .bind(&order.seller_id)
        .bind(&order.address)
        .bind(order.payment_type)
        .bind(order.cash_amount_cents)
        .bind(order.status)
        .bind(&order.sale_id)
        .bind(order.created_at)
        .bind(order.status_updated_at)
        .execute(&mut *tx)
        .await?;

        for (line_no, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, line_no, product_id, name, unit_price_cents, quantity)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&order.id)
            .bind(line_no as i64)
            .bind(&item.product_id)
            .bind(&item.name)
            .bind(item.unit_price_cents)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await?;
        }

        Self::record_change(&mut tx, &order.id, None, order.status, order.created_at).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Moves a non-terminal status forward if it still equals `from`.
    pub async fn set_status(
        conn: &mut SqliteConnection,
        id: &str,
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = ?3, status_updated_at = ?4
            WHERE id = ?1 AND status = ?2 AND status != 'completed'
            "#,
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }
        Self::record_change(conn, id, Some(from), to, at).await?;
        Ok(true)
    }

    /// Marks a delivered order completed and links its sale.
    ///
    /// Must run in the same transaction that wrote the sale.
    pub async fn complete(
        conn: &mut SqliteConnection,
        id: &str,
        sale_id: &str,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'completed', sale_id = ?2, status_updated_at = ?3
            WHERE id = ?1 AND status = 'delivery' AND sale_id IS NULL
            "#,
        )
        .bind(id)
        .bind(sale_id)
        .bind(at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }
        Self::record_change(
            conn,
            id,
            Some(OrderStatus::Delivery),
            OrderStatus::Completed,
            at,
        )
        .await?;
        Ok(true)
    }

    async fn record_change(
        conn: &mut SqliteConnection,
        order_id: &str,
        from: Option<OrderStatus>,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO order_status_history (order_id, from_status, to_status, changed_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(order_id)
        .bind(from)
        .bind(to)
        .bind(at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Status audit trail, oldest first.
    pub async fn history(&self, order_id: &str) -> DbResult<Vec<OrderStatusChange>> {
        let changes = sqlx::query_as::<_, OrderStatusChange>(
            r#"
            SELECT order_id, from_status, to_status, changed_at
            FROM order_status_history
            WHERE order_id = ?1
            ORDER BY id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(changes)
    }
}
