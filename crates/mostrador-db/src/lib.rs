//! # mostrador-db: Database Layer for Mostrador
//!
//! This crate provides database access for the Mostrador sale engine.
//! It uses SQLite for local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Mostrador Data Flow                              │
//! │                                                                         │
//! │  HTTP handler (POST /sales)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   mostrador-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │ SaleProcessor │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ (processor.rs)│    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ one tx per    │    │ 001_initial  │  │   │
//! │  │   │ Repositories  │    │ sale + retry  │    │ _schema.sql  │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database and engine error types
//! - [`repository`] - Repository implementations (product, client, sale, ...)
//! - [`processor`] - Atomic sale commit and order transitions
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mostrador_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/mostrador.db")).await?;
//!
//! let sale = db.processor().process_sale(&request).await?;
//! let stored = db.sales().get_by_id(&sale.id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod processor;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult, EngineError, EngineResult};
pub use pool::{Database, DbConfig};
pub use processor::{OrderAdvance, RetryPolicy, SaleProcessor};

// Repository re-exports for convenience
pub use repository::client::ClientRepository;
pub use repository::document::{InvoiceRepository, RemitoRepository};
pub use repository::order::OrderRepository;
pub use repository::product::ProductRepository;
pub use repository::sale::SaleRepository;
pub use repository::seller::SellerRepository;
