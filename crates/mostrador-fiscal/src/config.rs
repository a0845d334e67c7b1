//! # Authority Configuration
//!
//! ## Configuration File Format
//! ```toml
//! [authority]
//! mode = "live"            # live | simulated
//! base_url = "https://fiscal-gateway.example.com"
//! api_token = "..."
//! request_timeout_secs = 10
//! max_attempts = 4
//! initial_backoff_ms = 250
//! max_backoff_ms = 2000
//! max_elapsed_secs = 20
//! ```
//!
//! In `live` mode a missing URL or token is a startup error, never a silent
//! switch to simulated authorizations.

use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{FiscalError, FiscalResult};

/// Which authority strategy the issuer talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityMode {
    /// Real authority over HTTP, simulated authorizations only on outage.
    Live,
    /// Every electronic invoice gets a simulated authorization.
    #[default]
    Simulated,
}

impl std::fmt::Display for AuthorityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthorityMode::Live => write!(f, "live"),
            AuthorityMode::Simulated => write!(f, "simulated"),
        }
    }
}

impl std::str::FromStr for AuthorityMode {
    type Err = FiscalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "live" | "production" => Ok(AuthorityMode::Live),
            "simulated" | "offline" => Ok(AuthorityMode::Simulated),
            other => Err(FiscalError::Misconfigured(format!(
                "Unknown authority mode: '{}'. Valid options: live, simulated",
                other
            ))),
        }
    }
}

/// Tax authority connection and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityConfig {
    #[serde(default)]
    pub mode: AuthorityMode,

    /// Base URL of the authority gateway (required in live mode).
    #[serde(default)]
    pub base_url: Option<String>,

    /// Bearer token for the gateway (required in live mode).
    #[serde(default)]
    pub api_token: Option<String>,

    /// Upper bound for a single call.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Attempts per call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Total time budget for the retries of one call.
    #[serde(default = "default_max_elapsed")]
    pub max_elapsed_secs: u64,
}

fn default_request_timeout() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    4
}

fn default_initial_backoff() -> u64 {
    250
}

fn default_max_backoff() -> u64 {
    2000
}

fn default_max_elapsed() -> u64 {
    20
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        AuthorityConfig {
            mode: AuthorityMode::default(),
            base_url: None,
            api_token: None,
            request_timeout_secs: default_request_timeout(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            max_elapsed_secs: default_max_elapsed(),
        }
    }
}

impl AuthorityConfig {
    /// Checks the settings before anything is built from them.
    pub fn validate(&self) -> FiscalResult<()> {
        if self.request_timeout_secs == 0 {
            return Err(FiscalError::Misconfigured(
                "authority.request_timeout_secs must be positive".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(FiscalError::Misconfigured(
                "authority.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.mode == AuthorityMode::Live {
            let url = self.base_url.as_deref().map(str::trim).unwrap_or_default();
            if url.is_empty() {
                return Err(FiscalError::Misconfigured(
                    "authority.base_url is required in live mode".to_string(),
                ));
            }
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(FiscalError::Misconfigured(format!(
                    "authority.base_url must start with http:// or https://, got '{}'",
                    url
                )));
            }
            let token = self.api_token.as_deref().map(str::trim).unwrap_or_default();
            if token.is_empty() {
                return Err(FiscalError::Misconfigured(
                    "authority.api_token is required in live mode".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Fresh back-off schedule for one call.
    pub(crate) fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(self.initial_backoff_ms),
            max_interval: Duration::from_millis(self.max_backoff_ms),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.max_elapsed_secs)),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(url: Option<&str>, token: Option<&str>) -> AuthorityConfig {
        AuthorityConfig {
            mode: AuthorityMode::Live,
            base_url: url.map(str::to_string),
            api_token: token.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_are_simulated_and_valid() {
        let config = AuthorityConfig::default();
        assert_eq!(config.mode, AuthorityMode::Simulated);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_live_without_credentials_is_misconfigured() {
        assert!(matches!(
            live(None, Some("t")).validate(),
            Err(FiscalError::Misconfigured(_))
        ));
        assert!(matches!(
            live(Some("https://gw.example.com"), Some("  ")).validate(),
            Err(FiscalError::Misconfigured(_))
        ));
        assert!(matches!(
            live(Some("gw.example.com"), Some("t")).validate(),
            Err(FiscalError::Misconfigured(_))
        ));
        assert!(live(Some("https://gw.example.com"), Some("t")).validate().is_ok());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("LIVE".parse::<AuthorityMode>().unwrap(), AuthorityMode::Live);
        assert_eq!("offline".parse::<AuthorityMode>().unwrap(), AuthorityMode::Simulated);
        assert!("maybe".parse::<AuthorityMode>().is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: AuthorityConfig =
            serde_json::from_str(r#"{"mode":"live","base_url":"http://x"}"#).unwrap();
        assert_eq!(config.mode, AuthorityMode::Live);
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.initial_backoff_ms, 250);
        assert!(config.api_token.is_none());
    }
}
