//! # Sale Repository
//!
//! Database operations for sales and sale items.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. COMMIT (SaleProcessor, one transaction)                            │
//! │     └── insert() → sales row + sale_items rows                         │
//! │                                                                         │
//! │  2. INVOICE (optional, once)                                           │
//! │     └── set_invoice() → invoice_emitted = 1, invoice_number            │
//! │                                                                         │
//! │  3. REMITO (optional, once)                                            │
//! │     └── set_remito() → remito_number                                   │
//! │                                                                         │
//! │  Nothing else about a committed sale ever changes.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use mostrador_core::{LineItem, Sale};

const SALE_COLUMNS: &str = "id, client_id, client_name, client_phone, client_tax_id, \
     client_tax_category, seller_id, seller_name, payment_type, cash_amount_cents, \
     credit_amount_cents, total_cents, source, order_id, invoice_emitted, invoice_number, \
     remito_number, created_at";

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale by ID, items included.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn, id).await
    }

    /// Reads a sale (with items) on a caller-owned connection or transaction.
    pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Sale>> {
        let sql = format!("SELECT {} FROM sales WHERE id = ?1", SALE_COLUMNS);
        let sale = sqlx::query_as::<_, Sale>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        match sale {
            Some(mut sale) => {
                sale.items = Self::fetch_items(conn, id).await?;
                Ok(Some(sale))
            }
            None => Ok(None),
        }
    }

    async fn fetch_items(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<LineItem>> {
        let items = sqlx::query_as::<_, LineItem>(
            r#"
            SELECT product_id, name, unit_price_cents, quantity
            FROM sale_items
            WHERE sale_id = ?1
            ORDER BY line_no
            "#,
        )
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(items)
    }

    /// Writes a sale and its items.
    ///
    /// ## Snapshot Pattern
    /// Client, seller and product details are copied onto the sale so the
    /// record stays accurate even if those rows change later.
    pub async fn insert(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
        debug!(id = %sale.id, total = sale.total_cents, items = sale.items.len(), "Inserting sale");

        sqlx::query(&format!(
            "INSERT INTO sales ({}) VALUES \
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            SALE_COLUMNS
        ))
        .bind(&sale.id)
        .bind(&sale.client_id)
        .bind(&sale.client_name)
        .bind(&sale.client_phone)
        .bind(&sale.client_tax_id)
        .bind(sale.client_tax_category)
        .bind(&sale.seller_id)
        .bind(&sale.seller_name)
        .bind(sale.payment_type)
        .bind(sale.cash_amount_cents)
        .bind(sale.credit_amount_cents)
        .bind(sale.total_cents)
        .bind(sale.source)
        .bind(&sale.order_id)
        .bind(sale.invoice_emitted)
        .bind(&sale.invoice_number)
        .bind(&sale.remito_number)
        .bind(sale.created_at)
        .execute(&mut *conn)
        .await?;

        for (line_no, item) in sale.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO sale_items (sale_id, line_no, product_id, name, unit_price_cents, quantity)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&sale.id)
            .bind(line_no as i64)
            .bind(&item.product_id)
            .bind(&item.name)
            .bind(item.unit_price_cents)
            .bind(item.quantity)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    /// Sets the invoice backlink if it is still unset.
    ///
    /// ## Returns
    /// `false` when the sale already carries an invoice (or does not exist).
    pub async fn set_invoice(
        conn: &mut SqliteConnection,
        sale_id: &str,
        invoice_number: &str,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sales
            SET invoice_emitted = 1, invoice_number = ?2
            WHERE id = ?1 AND invoice_emitted = 0
            "#,
        )
        .bind(sale_id)
        .bind(invoice_number)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Sets the remito backlink if it is still unset.
    pub async fn set_remito(
        conn: &mut SqliteConnection,
        sale_id: &str,
        remito_number: &str,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE sales SET remito_number = ?2 WHERE id = ?1 AND remito_number IS NULL",
        )
        .bind(sale_id)
        .bind(remito_number)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Counts all sales.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
