//! # mostrador-api
//!
//! HTTP surface of the sale engine. The binary in `main.rs` loads the
//! configuration, opens the database and serves [`routes::router`].

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::AppConfig;
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
