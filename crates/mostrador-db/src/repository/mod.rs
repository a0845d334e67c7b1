//! # Repository Module
//!
//! Database repository implementations for Mostrador.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Two Kinds of Repository Methods                      │
//! │                                                                         │
//! │  &self methods          run on the pool, one statement or one short     │
//! │                         transaction of their own                        │
//! │                                                                         │
//! │      db.sales().get_by_id("…")                                          │
//! │      db.clients().register_payment("…", amount, None)                   │
//! │                                                                         │
//! │  associated fns taking  run inside a caller-owned transaction so the    │
//! │  &mut SqliteConnection  SaleProcessor can commit many steps atomically  │
//! │                                                                         │
//! │      ProductRepository::decrement_stock(&mut tx, id, qty)               │
//! │      ClientRepository::extend_credit(&mut tx, id, amount)               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`product::ProductRepository`] - Catalog reads and guarded stock decrement
//! - [`client::ClientRepository`] - Clients and the credit ledger
//! - [`seller::SellerRepository`] - Sellers and commissions
//! - [`sale::SaleRepository`] - Sales, sale items and document backlinks
//! - [`order::OrderRepository`] - Orders, order items and status history
//! - [`document::InvoiceRepository`] / [`document::RemitoRepository`] - Fiscal documents

pub mod client;
pub mod document;
pub mod order;
pub mod product;
pub mod sale;
pub mod seller;
