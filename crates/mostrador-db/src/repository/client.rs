//! # Client Repository & Credit Ledger
//!
//! ## Storage Model
//! ```text
//! ┌──────────────────────────┐        ┌──────────────────────────────────┐
//! │ clients                  │        │ ledger_entries (append-only)     │
//! │  balance_cents ◄─────────┼── Σ ───┤  debt    +6000  sale s-1         │
//! │  credit_limit_cents      │        │  payment −2500                   │
//! └──────────────────────────┘        └──────────────────────────────────┘
//! ```
//!
//! `balance_cents` is a materialized aggregate. Every write that appends an
//! entry updates the balance in the same transaction, so
//! [`ClientRepository::ledger_balance`] (recomputed from the log) always
//! equals the stored balance.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult, EngineResult};
use crate::processor::RetryPolicy;
use mostrador_core::ledger::{check_payment, default_payment_description};
use mostrador_core::{Client, EntryType, LedgerEntry, Money};

const CLIENT_COLUMNS: &str =
    "id, name, phone, tax_id, tax_category, credit_limit_cents, balance_cents, created_at";

/// Repository for clients and their credit ledger.
#[derive(Debug, Clone)]
pub struct ClientRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl ClientRepository {
    /// Creates a new ClientRepository. `retry` governs payment transactions.
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        ClientRepository { pool, retry }
    }

    /// Gets a client by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Client>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn, id).await
    }

    /// Reads a client on a caller-owned connection or transaction.
    pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Client>> {
        let sql = format!("SELECT {} FROM clients WHERE id = ?1", CLIENT_COLUMNS);
        let client = sqlx::query_as::<_, Client>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(client)
    }

    /// Inserts a new client.
    pub async fn insert(&self, client: &Client) -> DbResult<Client> {
        debug!(id = %client.id, name = %client.name, "Inserting client");

        sqlx::query(
            r#"
            INSERT INTO clients (
                id, name, phone, tax_id, tax_category,
                credit_limit_cents, balance_cents, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&client.id)
        .bind(&client.name)
        .bind(&client.phone)
        .bind(&client.tax_id)
        .bind(client.tax_category)
        .bind(client.credit_limit_cents)
        .bind(client.balance_cents)
        .bind(client.created_at)
        .execute(&self.pool)
        .await?;

        Ok(client.clone())
    }

    /// Raises the balance by `amount` only if it stays within the limit.
    ///
    /// ## Returns
    /// * `Ok(true)` - Credit extended
    /// * `Ok(false)` - Limit would be exceeded (nothing written)
    pub async fn extend_credit(
        conn: &mut SqliteConnection,
        client_id: &str,
        amount: Money,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE clients
            SET balance_cents = balance_cents + ?2
            WHERE id = ?1 AND balance_cents + ?2 <= credit_limit_cents
            "#,
        )
        .bind(client_id)
        .bind(amount.cents())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Appends a ledger entry. Never updates or deletes existing rows.
    pub async fn append_ledger_entry(
        conn: &mut SqliteConnection,
        entry: &LedgerEntry,
    ) -> DbResult<()> {
        debug!(
            client_id = %entry.client_id,
            entry_type = %entry.entry_type,
            amount = entry.amount_cents,
            "Appending ledger entry"
        );

        sqlx::query(
            r#"
            INSERT INTO ledger_entries (
                id, client_id, entry_type, amount_cents, description, sale_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.client_id)
        .bind(entry.entry_type)
        .bind(entry.amount_cents)
        .bind(&entry.description)
        .bind(&entry.sale_id)
        .bind(entry.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Records money received from a client against their balance.
    ///
    /// ## Rules
    /// - `amount` must be positive
    /// - `amount` may not exceed the current balance
    ///
    /// The balance update is guarded the same way, so two concurrent payments
    /// cannot together drive the balance below zero. Busy conflicts re-run
    /// the whole transaction under the repository's [`RetryPolicy`].
    pub async fn register_payment(
        &self,
        client_id: &str,
        amount: Money,
        description: Option<String>,
    ) -> EngineResult<LedgerEntry> {
        let description = description.as_deref();
        let entry = self
            .retry
            .run("register_payment", || {
                self.try_register_payment(client_id, amount, description)
            })
            .await?;

        info!(client_id = %client_id, amount = amount.cents(), "Payment registered");
        Ok(entry)
    }

    async fn try_register_payment(
        &self,
        client_id: &str,
        amount: Money,
        description: Option<&str>,
    ) -> EngineResult<LedgerEntry> {
        let mut tx = self.pool.begin().await?;

        let client = Self::fetch(&mut tx, client_id)
            .await?
            .ok_or_else(|| DbError::not_found("Client", client_id))?;
        check_payment(&client, amount)?;

        let result = sqlx::query(
            r#"
            UPDATE clients
            SET balance_cents = balance_cents - ?2
            WHERE id = ?1 AND balance_cents >= ?2
            "#,
        )
        .bind(client_id)
        .bind(amount.cents())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // Balance moved between the read and the write.
            let current = Self::fetch(&mut tx, client_id).await?.unwrap_or(client);
            check_payment(&current, amount)?;
            return Err(DbError::TransactionFailed(format!(
                "payment for client {} lost a concurrent update",
                client_id
            ))
            .into());
        }

        let entry = LedgerEntry {
            id: Uuid::new_v4().to_string(),
            client_id: client_id.to_string(),
            entry_type: EntryType::Payment,
            amount_cents: amount.cents(),
            description: description
                .filter(|d| !d.trim().is_empty())
                .unwrap_or(default_payment_description(EntryType::Payment))
                .to_string(),
            sale_id: None,
            created_at: Utc::now(),
        };
        Self::append_ledger_entry(&mut tx, &entry).await?;

        tx.commit().await?;
        Ok(entry)
    }

    /// All ledger entries of a client, oldest first.
    pub async fn entries(&self, client_id: &str) -> DbResult<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, client_id, entry_type, amount_cents, description, sale_id, created_at
            FROM ledger_entries
            WHERE client_id = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Balance recomputed from the entry log (Σ debt − Σ payment).
    pub async fn ledger_balance(&self, client_id: &str) -> DbResult<Money> {
        let cents: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(CASE entry_type
                WHEN 'debt' THEN amount_cents
                ELSE -amount_cents END), 0)
            FROM ledger_entries
            WHERE client_id = ?1
            "#,
        )
        .bind(client_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(Money::from_cents(cents))
    }
}
