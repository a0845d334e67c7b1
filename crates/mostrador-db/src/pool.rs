//! # SQLite Handle
//!
//! [`DbConfig`] describes where the register's database lives and how writers
//! behave under contention; [`Database`] owns the pool and hands out
//! repositories and the [`SaleProcessor`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  HTTP handlers ──► Database (Clone, shares one SqlitePool)              │
//! │                       │                                                 │
//! │        ┌──────────────┼──────────────────┬──────────────────┐           │
//! │        ▼              ▼                  ▼                  ▼           │
//! │   repositories   SaleProcessor     InvoiceRepository   RemitoRepository │
//! │   (reads, single (one write tx,    (fiscal crate)      (fiscal crate)   │
//! │    statements)    RetryPolicy)                                          │
//! │                                                                         │
//! │  One writer at a time (SQLite). A writer waits `busy_timeout` for the   │
//! │  lock, then RetryPolicy re-runs the whole transaction.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Connections open in WAL mode with foreign keys enforced, so stock,
//! ledger and document reads never wait on a committing sale.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::processor::{RetryPolicy, SaleProcessor};
use crate::repository::client::ClientRepository;
use crate::repository::document::{InvoiceRepository, RemitoRepository};
use crate::repository::order::OrderRepository;
use crate::repository::product::ProductRepository;
use crate::repository::sale::SaleRepository;
use crate::repository::seller::SellerRepository;

// =============================================================================
// Configuration
// =============================================================================

const MEMORY_PATH: &str = ":memory:";

/// Where the register database lives and how it handles write contention.
///
/// ```rust,ignore
/// let config = DbConfig::new(data_dir.join("mostrador.db"))
///     .max_connections(8)
///     .busy_timeout(Duration::from_secs(2));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database file, created on first open. `:memory:` for tests.
    pub database_path: PathBuf,
    /// Pool size. Only one of these can hold the write lock.
    pub max_connections: u32,
    /// How long a pool checkout may wait.
    pub acquire_timeout: Duration,
    /// How long SQLite waits on a locked database before reporting busy.
    pub busy_timeout: Duration,
    /// Whole-transaction retry once `busy_timeout` is exhausted.
    pub retry: RetryPolicy,
    pub run_migrations: bool,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            run_migrations: true,
        }
    }

    /// Private database for a single test. One connection, since every
    /// `:memory:` connection would otherwise see its own empty database.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(MEMORY_PATH),
            max_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(1),
            ..DbConfig::new(MEMORY_PATH)
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn connect_url(&self) -> String {
        if self.database_path.as_os_str() == MEMORY_PATH {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", self.database_path.display())
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Shared handle to the register database. Clones share the pool and the
/// retry policy.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl Database {
    /// Opens (or creates) the database and applies pending migrations.
    ///
    /// ## Errors
    /// * `DbError::ConnectionFailed` - bad path or the file cannot be opened
    /// * `DbError::MigrationFailed` - the embedded schema could not be applied
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        debug!(
            path = %config.database_path.display(),
            max_connections = config.max_connections,
            busy_timeout_ms = config.busy_timeout.as_millis() as u64,
            "Opening register database"
        );

        let options = SqliteConnectOptions::from_str(&config.connect_url())
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        let db = Database {
            pool,
            retry: config.retry,
        };
        if config.run_migrations {
            migrations::run_migrations(&db.pool).await?;
        }

        info!(path = %config.database_path.display(), "Register database ready");
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    /// Clients and their credit ledger.
    pub fn clients(&self) -> ClientRepository {
        ClientRepository::new(self.pool.clone(), self.retry.clone())
    }

    /// Sellers and commissions.
    pub fn sellers(&self) -> SellerRepository {
        SellerRepository::new(self.pool.clone())
    }

    pub fn sales(&self) -> SaleRepository {
        SaleRepository::new(self.pool.clone())
    }

    pub fn orders(&self) -> OrderRepository {
        OrderRepository::new(self.pool.clone())
    }

    pub fn invoices(&self) -> InvoiceRepository {
        InvoiceRepository::new(self.pool.clone())
    }

    pub fn remitos(&self) -> RemitoRepository {
        RemitoRepository::new(self.pool.clone())
    }

    /// Busy-retry policy for every multi-statement write, including the
    /// fiscal crate's invoice and remito transactions.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn processor(&self) -> SaleProcessor {
        SaleProcessor::new(self.pool.clone(), self.retry.clone())
    }

    pub async fn close(&self) {
        info!("Closing register database");
        self.pool.close().await;
    }

    /// `SELECT 1` round trip, used by `GET /health`.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database_is_migrated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);

        let (total, applied) = migrations::migration_status(db.pool()).await.unwrap();
        assert_eq!(total, applied);
        assert_eq!(db.products().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_file_database_created_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mostrador.db");
        let db = Database::new(DbConfig::new(&path)).await.unwrap();

        assert!(db.health_check().await);
        assert!(path.exists());
        db.close().await;
        assert!(!db.health_check().await);
    }

    #[test]
    fn test_config_urls_and_contention_settings() {
        let config = DbConfig::new("/tmp/register.db")
            .max_connections(8)
            .busy_timeout(Duration::from_millis(250));

        assert_eq!(config.max_connections, 8);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert_eq!(config.connect_url(), "sqlite:///tmp/register.db?mode=rwc");

        let memory = DbConfig::in_memory();
        assert_eq!(memory.max_connections, 1);
        assert_eq!(memory.connect_url(), "sqlite::memory:");
    }
}
