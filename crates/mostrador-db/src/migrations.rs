//! # Database Migrations
//!
//! The schema lives in `migrations/sqlite/` at the workspace root and is
//! compiled into the binary.
//!
//! ```text
//! Database::new ──► run_migrations ──► _sqlx_migrations lookup
//!                                          │
//!                                          ├── 001_initial_schema.sql ✓
//!                                          └── next file ⬜ applied now
//! ```
//!
//! Never edit a migration that has shipped; add `NNN_description.sql`.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

/// Embedded migrations from the `migrations/sqlite` directory.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies every pending migration, each in its own transaction.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!(
        embedded = MIGRATOR.migrations.len(),
        "Checking for pending migrations"
    );

    MIGRATOR.run(pool).await?;

    info!("All migrations applied successfully");
    Ok(())
}

/// `(embedded, applied)` migration counts, for the health endpoint.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let total = MIGRATOR.migrations.len();

    let applied: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    Ok((total, applied as usize))
}
