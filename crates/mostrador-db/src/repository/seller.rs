//! # Seller Repository
//!
//! Sellers, their commission log and the running totals kept on the seller
//! row. A commission is created once per sale and its `is_paid` flag flips
//! once; nothing else about it ever changes.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult, EngineResult};
use mostrador_core::{Commission, CoreError, Seller, TaxRate};

const SELLER_COLUMNS: &str =
    "id, name, commission_rate_bps, total_sales_cents, total_commission_cents, created_at";

const COMMISSION_COLUMNS: &str = "id, seller_id, sale_id, sale_total_cents, commission_rate_bps, \
     commission_amount_cents, is_paid, paid_at, created_at";

/// Repository for sellers and commissions.
#[derive(Debug, Clone)]
pub struct SellerRepository {
    pool: SqlitePool,
}

impl SellerRepository {
    /// Creates a new SellerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SellerRepository { pool }
    }

    /// Gets a seller by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Seller>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn, id).await
    }

    /// Reads a seller on a caller-owned connection or transaction.
    pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Seller>> {
        let sql = format!("SELECT {} FROM sellers WHERE id = ?1", SELLER_COLUMNS);
        let seller = sqlx::query_as::<_, Seller>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(seller)
    }

    /// The seller's current commission rate.
    pub async fn commission_rate(&self, id: &str) -> DbResult<TaxRate> {
        let bps: Option<u32> =
            sqlx::query_scalar("SELECT commission_rate_bps FROM sellers WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        bps.map(TaxRate::from_bps)
            .ok_or_else(|| DbError::not_found("Seller", id))
    }

    /// Inserts a new seller.
    pub async fn insert(&self, seller: &Seller) -> DbResult<Seller> {
        debug!(id = %seller.id, name = %seller.name, "Inserting seller");

        sqlx::query(
            r#"
            INSERT INTO sellers (
                id, name, commission_rate_bps,
                total_sales_cents, total_commission_cents, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&seller.id)
        .bind(&seller.name)
        .bind(seller.commission_rate_bps)
        .bind(seller.total_sales_cents)
        .bind(seller.total_commission_cents)
        .bind(seller.created_at)
        .execute(&self.pool)
        .await?;

        Ok(seller.clone())
    }

    /// Writes a commission row and bumps the seller's running totals.
    pub async fn record_commission(
        conn: &mut SqliteConnection,
        commission: &Commission,
    ) -> DbResult<()> {
        debug!(
            seller_id = %commission.seller_id,
            sale_id = %commission.sale_id,
            amount = commission.commission_amount_cents,
            "Recording commission"
        );

        sqlx::query(&format!(
            "INSERT INTO commissions ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            COMMISSION_COLUMNS
        ))
        .bind(&commission.id)
        .bind(&commission.seller_id)
        .bind(&commission.sale_id)
        .bind(commission.sale_total_cents)
        .bind(commission.commission_rate_bps)
        .bind(commission.commission_amount_cents)
        .bind(commission.is_paid)
        .bind(commission.paid_at)
        .bind(commission.created_at)
        .execute(&mut *conn)
        .await?;

        let result = sqlx::query(
            r#"
            UPDATE sellers
            SET total_sales_cents = total_sales_cents + ?2,
                total_commission_cents = total_commission_cents + ?3
            WHERE id = ?1
            "#,
        )
        .bind(&commission.seller_id)
        .bind(commission.sale_total_cents)
        .bind(commission.commission_amount_cents)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Seller", &commission.seller_id));
        }
        Ok(())
    }

    /// Gets a commission by ID.
    pub async fn get_commission(&self, id: &str) -> DbResult<Option<Commission>> {
        let sql = format!("SELECT {} FROM commissions WHERE id = ?1", COMMISSION_COLUMNS);
        let commission = sqlx::query_as::<_, Commission>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(commission)
    }

    /// The commission recorded for a sale, if any.
    pub async fn commission_for_sale(&self, sale_id: &str) -> DbResult<Option<Commission>> {
        let sql = format!(
            "SELECT {} FROM commissions WHERE sale_id = ?1",
            COMMISSION_COLUMNS
        );
        let commission = sqlx::query_as::<_, Commission>(&sql)
            .bind(sale_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(commission)
    }

    /// Commissions of a seller, newest first.
    pub async fn commissions(&self, seller_id: &str, unpaid_only: bool) -> DbResult<Vec<Commission>> {
        let sql = format!(
            "SELECT {} FROM commissions WHERE seller_id = ?1 AND (?2 = 0 OR is_paid = 0) \
             ORDER BY created_at DESC",
            COMMISSION_COLUMNS
        );
        let commissions = sqlx::query_as::<_, Commission>(&sql)
            .bind(seller_id)
            .bind(unpaid_only)
            .fetch_all(&self.pool)
            .await?;
        Ok(commissions)
    }

    /// Marks a commission as paid.
    ///
    /// ## Errors
    /// * `CommissionAlreadyPaid` - The flag already flipped; it never reverts
    /// * `NotFound` - No such commission
    pub async fn mark_commission_paid(&self, id: &str) -> EngineResult<Commission> {
        let result = sqlx::query(
            "UPDATE commissions SET is_paid = 1, paid_at = ?2 WHERE id = ?1 AND is_paid = 0",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let commission = self
            .get_commission(id)
            .await?
            .ok_or_else(|| DbError::not_found("Commission", id))?;

        if result.rows_affected() == 0 {
            return Err(CoreError::CommissionAlreadyPaid(id.to_string()).into());
        }

        info!(
            commission_id = %id,
            seller_id = %commission.seller_id,
            amount = commission.commission_amount_cents,
            "Commission marked paid"
        );
        Ok(commission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::{Database, DbConfig};
    use uuid::Uuid;

    fn seller(rate_bps: u32) -> Seller {
        Seller {
            id: Uuid::new_v4().to_string(),
            name: "Marta Gómez".into(),
            commission_rate_bps: rate_bps,
            total_sales_cents: 0,
            total_commission_cents: 0,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_commission_rate_lookup() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let s = db.sellers().insert(&seller(350)).await.unwrap();

        assert_eq!(db.sellers().commission_rate(&s.id).await.unwrap().bps(), 350);
        assert!(matches!(
            db.sellers().commission_rate("missing").await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_commission_not_found() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(matches!(
            db.sellers().mark_commission_paid("missing").await,
            Err(EngineError::Db(DbError::NotFound { .. }))
        ));
    }
}
