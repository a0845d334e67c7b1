//! # Storage Errors
//!
//! ```text
//! sqlx::Error ──► DbError ──┬──► EngineError ◄── CoreError (rule violations)
//!                           │         │
//!                           └─────────┴──► ApiError (apps/api)
//! ```
//!
//! SQLite reports lock contention, constraint failures and plain SQL errors
//! through the same `Database` variant; [`DbError`] sorts them so callers can
//! tell a retryable busy write from a duplicate document or a broken query.

use mostrador_core::CoreError;
use sqlx::error::ErrorKind;
use thiserror::Error;

/// SQLite primary/extended result codes for a locked database
/// (`SQLITE_BUSY`, `SQLITE_LOCKED`, `SQLITE_BUSY_SNAPSHOT`).
const LOCK_CODES: [&str; 3] = ["5", "6", "517"];

#[derive(Debug, Error)]
pub enum DbError {
    /// A required row is missing (unknown sale, client, order...).
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// `field` is the `table.column` SQLite names in the failure, e.g.
    /// `invoices.sale_id` when a second invoice races the first.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Unknown product, client or seller referenced by a write.
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// The write lock was not released within the busy timeout. Only
    /// surfaces once [`RetryPolicy`](crate::processor::RetryPolicy) gives up.
    #[error("Database is busy: {0}")]
    Busy(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// SQL error or CHECK constraint failure.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A guarded update matched no row although the preceding read said it
    /// would; the transaction is rolled back.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether re-running the whole transaction may succeed.
    pub fn is_busy(&self) -> bool {
        matches!(self, DbError::Busy(_))
    }

    /// UNIQUE violation on `table.column`.
    pub fn is_unique_on(&self, column: &str) -> bool {
        matches!(self, DbError::UniqueViolation { field, .. } if field == column)
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Row", "unknown"),
            sqlx::Error::Database(db_err) => {
                let msg = db_err.message().to_string();
                let locked = db_err
                    .code()
                    .is_some_and(|code| LOCK_CODES.contains(&code.as_ref()))
                    || msg.contains("database is locked");
                if locked {
                    return DbError::Busy(msg);
                }

                match db_err.kind() {
                    ErrorKind::UniqueViolation => {
                        // "UNIQUE constraint failed: invoices.sale_id"
                        let field = msg
                            .rsplit(": ")
                            .next()
                            .unwrap_or_default()
                            .to_string();
                        DbError::duplicate(field, "unknown")
                    }
                    ErrorKind::ForeignKeyViolation => DbError::ForeignKeyViolation(msg),
                    _ => DbError::QueryFailed(msg),
                }
            }
            sqlx::Error::PoolTimedOut => DbError::Busy("timed out waiting for a connection".into()),
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool is closed".into()),
            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Engine Error
// =============================================================================

/// Failure of an operation that applies business rules to stored data.
///
/// Rule violations ([`CoreError`]) are always raised before any write; a
/// [`DbError`] may come from anywhere in the transaction, which is then
/// rolled back as a whole.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Db(err.into())
    }
}

impl From<mostrador_core::ValidationError> for EngineError {
    fn from(err: mostrador_core::ValidationError) -> Self {
        EngineError::Core(err.into())
    }
}

impl EngineError {
    fn is_busy(&self) -> bool {
        matches!(self, EngineError::Db(e) if e.is_busy())
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

pub(crate) trait Retryable {
    fn should_retry(&self) -> bool;
}

impl Retryable for EngineError {
    fn should_retry(&self) -> bool {
        self.is_busy()
    }
}

impl Retryable for DbError {
    fn should_retry(&self) -> bool {
        self.is_busy()
    }
}
