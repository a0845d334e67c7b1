//! # Server Configuration
//!
//! ## Load Order
//! ```text
//! --config <path> / MOSTRADOR_CONFIG ──┐
//!                                      ├──► TOML file ──► MOSTRADOR_* env ──► validate()
//! platform config dir (mostrador.toml)─┘    (optional)      overrides
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [database]
//! path = "/var/lib/mostrador/mostrador.db"
//! max_connections = 8
//!
//! [issuer]
//! business_name = "Distribuidora Ortiz SRL"
//! tax_id = "30-71234567-8"
//! address = "Av. Belgrano 1450, Rosario"
//! condition = "registered_taxpayer"
//! point_of_sale = 3
//!
//! [authority]
//! mode = "live"
//! base_url = "https://fiscal-gateway.example.com"
//! api_token = "..."
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use mostrador_core::fiscal::{IssuerCondition, IssuerProfile};
use mostrador_db::{DbConfig, RetryPolicy};
use mostrador_fiscal::{AuthorityConfig, FiscalError};

// =============================================================================
// Errors
// =============================================================================

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid TOML in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error(transparent)]
    Authority(#[from] FiscalError),
}

// =============================================================================
// Sections
// =============================================================================

/// `[server]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `[database]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file. Defaults to the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    /// Whole-transaction attempts on write conflicts.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5000
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_retry_backoff() -> u64 {
    25
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: None,
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

impl DatabaseConfig {
    /// The configured path, or `mostrador.db` in the platform data directory.
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("com", "mostrador", "pos")
                .map(|dirs| dirs.data_dir().join("mostrador.db"))
                .unwrap_or_else(|| PathBuf::from("mostrador.db"))
        })
    }

    pub fn to_db_config(&self) -> DbConfig {
        DbConfig::new(self.resolved_path())
            .max_connections(self.max_connections)
            .busy_timeout(Duration::from_millis(self.busy_timeout_ms))
            .retry(RetryPolicy {
                max_attempts: self.retry_attempts,
                backoff_step: Duration::from_millis(self.retry_backoff_ms),
            })
    }
}

fn default_issuer() -> IssuerProfile {
    IssuerProfile {
        business_name: "Mostrador".to_string(),
        tax_id: None,
        address: String::new(),
        condition: IssuerCondition::Unregistered,
        point_of_sale: 1,
        gross_income_id: None,
        activity_start: None,
    }
}

// =============================================================================
// AppConfig
// =============================================================================

/// Complete server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default = "default_issuer")]
    pub issuer: IssuerProfile,

    #[serde(default)]
    pub authority: AuthorityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            issuer: default_issuer(),
            authority: AuthorityConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads, overrides from the environment and validates.
    ///
    /// A missing file is not an error; defaults apply. A file that exists
    /// but does not parse is.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let path = config_path
            .or_else(|| std::env::var("MOSTRADOR_CONFIG").ok().map(PathBuf::from))
            .or_else(Self::default_config_path);

        if let Some(path) = path {
            if path.exists() {
                info!(?path, "Loading configuration file");
                let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                    path: path.clone(),
                    source,
                })?;
                config = toml::from_str(&contents)
                    .map_err(|source| ConfigError::Parse { path, source })?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `MOSTRADOR_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("MOSTRADOR_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("MOSTRADOR_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidValue("MOSTRADOR_PORT".to_string()))?;
        }
        if let Some(path) = lookup("MOSTRADOR_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }
        if let Some(pos) = lookup("MOSTRADOR_POINT_OF_SALE") {
            self.issuer.point_of_sale = pos
                .parse()
                .map_err(|_| ConfigError::InvalidValue("MOSTRADOR_POINT_OF_SALE".to_string()))?;
        }
        if let Some(tax_id) = lookup("MOSTRADOR_ISSUER_TAX_ID") {
            self.issuer.tax_id = Some(tax_id);
        }
        if let Some(mode) = lookup("MOSTRADOR_AUTHORITY_MODE") {
            debug!(mode = %mode, "Overriding authority mode from environment");
            self.authority.mode = mode.parse()?;
        }
        if let Some(url) = lookup("MOSTRADOR_AUTHORITY_URL") {
            self.authority.base_url = Some(url);
        }
        if let Some(token) = lookup("MOSTRADOR_AUTHORITY_TOKEN") {
            self.authority.api_token = Some(token);
        }
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue("server.port".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidValue("database.max_connections".to_string()));
        }
        if self.database.retry_attempts == 0 {
            return Err(ConfigError::InvalidValue("database.retry_attempts".to_string()));
        }
        if self.issuer.business_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue("issuer.business_name".to_string()));
        }
        if self.issuer.point_of_sale == 0 || self.issuer.point_of_sale > 99_999 {
            return Err(ConfigError::InvalidValue("issuer.point_of_sale".to_string()));
        }

        let wants_invoices = matches!(
            self.issuer.condition,
            IssuerCondition::RegisteredTaxpayer | IssuerCondition::SimplifiedRegime
        );
        if wants_invoices && !self.issuer.is_tax_registered() {
            warn!(
                condition = ?self.issuer.condition,
                "Issuer tax id missing or malformed; invoices will be internal documents"
            );
        }

        self.authority.validate()?;
        Ok(())
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "mostrador", "pos")
            .map(|dirs| dirs.config_dir().join("mostrador.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mostrador_fiscal::AuthorityMode;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.authority.mode, AuthorityMode::Simulated);
        assert_eq!(config.issuer.condition, IssuerCondition::Unregistered);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mostrador.toml");
        std::fs::write(
            &path,
            r#"
            [server]
            port = 9090

            [database]
            path = "/tmp/shop.db"

            [issuer]
            business_name = "Distribuidora Ortiz SRL"
            tax_id = "30-71234567-8"
            address = "Av. Belgrano 1450"
            condition = "registered_taxpayer"
            point_of_sale = 3
            "#,
        )
        .unwrap();

        let config = AppConfig::load(Some(path)).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.database.resolved_path(), PathBuf::from("/tmp/shop.db"));
        assert_eq!(config.database.retry_attempts, 5);
        assert!(config.issuer.is_tax_registered());
        assert_eq!(config.issuer.point_of_sale, 3);
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();

        assert!(matches!(
            AppConfig::load(Some(path)),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("MOSTRADOR_PORT", "7070"),
            ("MOSTRADOR_DB_PATH", "/data/m.db"),
            ("MOSTRADOR_AUTHORITY_MODE", "live"),
            ("MOSTRADOR_AUTHORITY_URL", "https://gw.example.com"),
            ("MOSTRADOR_AUTHORITY_TOKEN", "secret"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.port, 7070);
        assert_eq!(config.database.path, Some(PathBuf::from("/data/m.db")));
        assert_eq!(config.authority.mode, AuthorityMode::Live);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_override_and_live_without_token() {
        let mut config = AppConfig::default();
        assert!(matches!(
            config.apply_overrides(|key| (key == "MOSTRADOR_PORT").then(|| "http".to_string())),
            Err(ConfigError::InvalidValue(_))
        ));

        let mut config = AppConfig::default();
        config.authority.mode = AuthorityMode::Live;
        config.authority.base_url = Some("https://gw.example.com".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Authority(FiscalError::Misconfigured(_)))
        ));
    }

    #[test]
    fn test_database_config_maps_retry_policy() {
        let db = DatabaseConfig {
            path: Some(PathBuf::from("/tmp/x.db")),
            retry_attempts: 9,
            retry_backoff_ms: 40,
            ..Default::default()
        }
        .to_db_config();

        assert_eq!(db.retry.max_attempts, 9);
        assert_eq!(db.retry.backoff_step, Duration::from_millis(40));
        assert_eq!(db.database_path, PathBuf::from("/tmp/x.db"));
    }
}
