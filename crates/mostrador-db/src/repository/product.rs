//! # Product Repository
//!
//! Catalog reads plus the one write the sale engine needs: a guarded stock
//! decrement.
//!
//! ## Guarded Decrement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  UPDATE products SET stock = stock - :qty                              │
//! │  WHERE id = :id AND stock >= :qty                                      │
//! │                                                                         │
//! │  rows_affected = 1  → units reserved                                   │
//! │  rows_affected = 0  → someone else sold them first → InsufficientStock │
//! │                                                                         │
//! │  The check and the write are one statement, so two terminals selling  │
//! │  the last unit can never both succeed.                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use mostrador_core::Product;

const PRODUCT_COLUMNS: &str =
    "id, name, price_cents, stock, is_enabled, created_at, updated_at";

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn, id).await
    }

    /// Reads a product on a caller-owned connection or transaction.
    pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS);
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(product)
    }

    /// Lists enabled products ordered by name.
    pub async fn list_enabled(&self, limit: u32) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {} FROM products WHERE is_enabled = 1 ORDER BY name LIMIT ?1",
            PRODUCT_COLUMNS
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    /// Inserts a new product.
    pub async fn insert(&self, product: &Product) -> DbResult<Product> {
        debug!(id = %product.id, name = %product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (id, name, price_cents, stock, is_enabled, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(product.stock)
        .bind(product.is_enabled)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, &product.id),
            other => other,
        })?;

        Ok(product.clone())
    }

    /// Adds units to a product's stock (receiving, returns, seeding).
    pub async fn restock(&self, id: &str, quantity: i64) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE products SET stock = stock + ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        Ok(())
    }

    /// Decrements stock only if enough units remain.
    ///
    /// ## Returns
    /// * `Ok(true)` - Stock decremented
    /// * `Ok(false)` - Not enough stock (nothing written)
    pub async fn decrement_stock(
        conn: &mut SqliteConnection,
        id: &str,
        quantity: i64,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock - ?2, updated_at = ?3
            WHERE id = ?1 AND stock >= ?2
            "#,
        )
        .bind(id)
        .bind(quantity)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        debug!(product_id = %id, quantity, applied = result.rows_affected() == 1, "Stock decrement");
        Ok(result.rows_affected() == 1)
    }

    /// Counts all products.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    fn product(stock: i64) -> Product {
        let now = Utc::now();
        Product {
            id: uuid::Uuid::new_v4().to_string(),
            name: "Yerba Mate 1kg".into(),
            price_cents: 4500,
            stock,
            is_enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_guarded_decrement() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let p = db.products().insert(&product(3)).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        assert!(ProductRepository::decrement_stock(&mut conn, &p.id, 2).await.unwrap());
        assert!(!ProductRepository::decrement_stock(&mut conn, &p.id, 2).await.unwrap());
        drop(conn);

        let stored = db.products().get_by_id(&p.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 1);
    }

    #[tokio::test]
    async fn test_restock_and_count() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let p = db.products().insert(&product(0)).await.unwrap();
        db.products().restock(&p.id, 10).await.unwrap();

        assert_eq!(db.products().get_by_id(&p.id).await.unwrap().unwrap().stock, 10);
        assert_eq!(db.products().count().await.unwrap(), 1);
        assert!(matches!(
            db.products().restock("missing", 1).await,
            Err(DbError::NotFound { .. })
        ));
    }
}
