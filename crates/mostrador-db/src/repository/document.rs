//! # Fiscal Document Repositories
//!
//! Invoices and remitos. Both tables carry `UNIQUE(sale_id)`, which is the
//! last word on "at most one document of each kind per sale" no matter how
//! many requests race.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use mostrador_core::{AuthorizationSource, DocumentType, Invoice, Remito};

const INVOICE_COLUMNS: &str = "id, sale_id, document_type, point_of_sale, document_number, \
     authorization_code, authorization_expiry, authorization_source, receiver_condition, \
     buyer_doc_type, buyer_doc_number, net_cents, tax_cents, total_cents, issued_at";

const REMITO_COLUMNS: &str =
    "id, sale_id, point_of_sale, remito_number, document_ref, generated_at";

// =============================================================================
// Invoices
// =============================================================================

/// Repository for issued invoices.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    /// Creates a new InvoiceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    /// The invoice issued for a sale, if any.
    pub async fn find_by_sale(&self, sale_id: &str) -> DbResult<Option<Invoice>> {
        let sql = format!("SELECT {} FROM invoices WHERE sale_id = ?1", INVOICE_COLUMNS);
        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(sale_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(invoice)
    }

    /// Highest number used locally for `(point_of_sale, document_type)` by
    /// documents of the given authorization source.
    ///
    /// Read it inside the transaction that inserts the next document; a
    /// concurrent writer then surfaces as `Busy` instead of a duplicate.
    pub async fn max_number(
        conn: &mut SqliteConnection,
        point_of_sale: u32,
        document_type: DocumentType,
        source: AuthorizationSource,
    ) -> DbResult<i64> {
        let max: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(MAX(document_number), 0)
            FROM invoices
            WHERE point_of_sale = ?1 AND document_type = ?2 AND authorization_source = ?3
            "#,
        )
        .bind(point_of_sale)
        .bind(document_type)
        .bind(source)
        .fetch_one(&mut *conn)
        .await?;
        Ok(max)
    }

    /// Invoices still carrying a simulated authorization, oldest first.
    pub async fn list_simulated(&self) -> DbResult<Vec<Invoice>> {
        let sql = format!(
            "SELECT {} FROM invoices WHERE authorization_source = 'simulated' ORDER BY issued_at",
            INVOICE_COLUMNS
        );
        let invoices = sqlx::query_as::<_, Invoice>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(invoices)
    }

    /// Writes an invoice row.
    ///
    /// Fails with `UniqueViolation` on `invoices.sale_id` if the sale already
    /// has one.
    pub async fn insert(conn: &mut SqliteConnection, invoice: &Invoice) -> DbResult<()> {
        debug!(
            sale_id = %invoice.sale_id,
            number = %invoice.formatted_number(),
            source = %invoice.authorization_source,
            "Inserting invoice"
        );

        sqlx::query(&format!(
            "INSERT INTO invoices ({}) VALUES \
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            INVOICE_COLUMNS
        ))
        .bind(&invoice.id)
        .bind(&invoice.sale_id)
        .bind(invoice.document_type)
        .bind(invoice.point_of_sale)
        .bind(invoice.document_number)
        .bind(&invoice.authorization_code)
        .bind(invoice.authorization_expiry)
        .bind(invoice.authorization_source)
        .bind(invoice.receiver_condition)
        .bind(invoice.buyer_doc_type)
        .bind(&invoice.buyer_doc_number)
        .bind(invoice.net_cents)
        .bind(invoice.tax_cents)
        .bind(invoice.total_cents)
        .bind(invoice.issued_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

// =============================================================================
// Remitos
// =============================================================================

/// Repository for delivery notes.
#[derive(Debug, Clone)]
pub struct RemitoRepository {
    pool: SqlitePool,
}

impl RemitoRepository {
    /// Creates a new RemitoRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RemitoRepository { pool }
    }

    /// The remito generated for a sale, if any.
    pub async fn find_by_sale(&self, sale_id: &str) -> DbResult<Option<Remito>> {
        let sql = format!("SELECT {} FROM remitos WHERE sale_id = ?1", REMITO_COLUMNS);
        let remito = sqlx::query_as::<_, Remito>(&sql)
            .bind(sale_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(remito)
    }

    /// Next free remito number for a point of sale.
    ///
    /// Call inside the transaction that inserts the remito; SQLite's single
    /// writer plus `UNIQUE(point_of_sale, remito_number)` keep it gap-free.
    pub async fn next_number(conn: &mut SqliteConnection, point_of_sale: u32) -> DbResult<i64> {
        let max: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(remito_number), 0) FROM remitos WHERE point_of_sale = ?1",
        )
        .bind(point_of_sale)
        .fetch_one(&mut *conn)
        .await?;
        Ok(max + 1)
    }

    /// Writes a remito row.
    pub async fn insert(conn: &mut SqliteConnection, remito: &Remito) -> DbResult<()> {
        debug!(sale_id = %remito.sale_id, number = %remito.formatted_number(), "Inserting remito");

        sqlx::query(&format!(
            "INSERT INTO remitos ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            REMITO_COLUMNS
        ))
        .bind(&remito.id)
        .bind(&remito.sale_id)
        .bind(remito.point_of_sale)
        .bind(remito.remito_number)
        .bind(&remito.document_ref)
        .bind(remito.generated_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}
