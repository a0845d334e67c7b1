//! # Mostrador API Server
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  tracing (RUST_LOG) ──► AppConfig::load ──► Database::new (migrations)  │
//! │        ──► AppState (issuer, authority strategy) ──► axum::serve        │
//! │                                                                         │
//! │  Ctrl+C / SIGTERM ──► graceful shutdown ──► pool closed                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```bash
//! mostrador-api --config /etc/mostrador/mostrador.toml
//! MOSTRADOR_AUTHORITY_MODE=simulated mostrador-api
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mostrador_api::{router, AppConfig, AppState};
use mostrador_db::Database;

const DEFAULT_LOG_FILTER: &str = "info,mostrador=debug,sqlx=warn";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_target(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Mostrador API server...");

    let config = AppConfig::load(parse_args()?).context("loading configuration")?;
    info!(
        bind = %config.server.bind_address(),
        database = %config.database.resolved_path().display(),
        authority = %config.authority.mode,
        point_of_sale = config.issuer.point_of_sale,
        "Configuration loaded"
    );

    if let Some(dir) = config.database.resolved_path().parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating data directory {}", dir.display()))?;
        }
    }

    let db = Database::new(config.database.to_db_config())
        .await
        .context("opening database")?;
    let state = AppState::new(db.clone(), config.issuer.clone(), &config.authority)
        .context("building invoice issuer")?;

    let listener = TcpListener::bind(config.server.bind_address())
        .await
        .with_context(|| format!("binding {}", config.server.bind_address()))?;
    info!(addr = %config.server.bind_address(), "HTTP server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// `--config <path>`; everything else comes from the file and environment.
fn parse_args() -> anyhow::Result<Option<PathBuf>> {
    let mut args = std::env::args().skip(1);
    let mut config = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => match args.next() {
                Some(path) => config = Some(PathBuf::from(path)),
                None => bail!("--config requires a path"),
            },
            "--help" | "-h" => {
                println!("Usage: mostrador-api [--config <path>]");
                println!();
                println!("Environment: MOSTRADOR_CONFIG, MOSTRADOR_HOST, MOSTRADOR_PORT,");
                println!("  MOSTRADOR_DB_PATH, MOSTRADOR_POINT_OF_SALE, MOSTRADOR_ISSUER_TAX_ID,");
                println!("  MOSTRADOR_AUTHORITY_MODE, MOSTRADOR_AUTHORITY_URL,");
                println!("  MOSTRADOR_AUTHORITY_TOKEN, RUST_LOG");
                std::process::exit(0);
            }
            other => bail!("unknown argument: {}", other),
        }
    }

    Ok(config)
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
