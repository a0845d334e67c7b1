//! # Fiscal Error Types
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Fiscal Error Categories                            │
//! │                                                                         │
//! │  AuthorityError (one network call)      FiscalError (one operation)     │
//! │  ─────────────────────────────────      ───────────────────────────     │
//! │  Unavailable { sent: false } ─ retry    Misconfigured   (startup)       │
//! │  Unavailable { sent: true }  ─ no       Rejected        (HTTP 422)      │
//! │      resubmit; fallback                 Authority       (fallback down) │
//! │  Rejected ─ never retried ───────────►  Render / Engine                 │
//! │                                                                         │
//! │  Unavailable never reaches the caller: the issuer falls back to a      │
//! │  simulated authorization instead.                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use mostrador_core::RenderError;
use mostrador_db::{DbError, EngineError};
use thiserror::Error;

/// Result type alias for fiscal operations.
pub type FiscalResult<T> = Result<T, FiscalError>;

/// Failure of a single call to a tax authority.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthorityError {
    /// Transport error, timeout or 5xx.
    ///
    /// `sent` is false only when the request provably never left this
    /// machine (connect failure), which is the one case where a submission
    /// may be repeated.
    #[error("Tax authority unavailable: {reason}")]
    Unavailable { sent: bool, reason: String },

    /// The authority answered and refused the document.
    #[error("Tax authority rejected the request ({code}): {message}")]
    Rejected { code: String, message: String },
}

impl AuthorityError {
    /// Creates an Unavailable error for a request that never reached the authority.
    pub fn not_sent(reason: impl Into<String>) -> Self {
        AuthorityError::Unavailable {
            sent: false,
            reason: reason.into(),
        }
    }

    /// Creates an Unavailable error for a request that may have been received.
    pub fn maybe_sent(reason: impl Into<String>) -> Self {
        AuthorityError::Unavailable {
            sent: true,
            reason: reason.into(),
        }
    }

    /// Whether the authority could not be reached.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, AuthorityError::Unavailable { .. })
    }

    /// Whether a submission can safely be sent again.
    pub fn may_resubmit(&self) -> bool {
        matches!(self, AuthorityError::Unavailable { sent: false, .. })
    }
}

impl From<reqwest::Error> for AuthorityError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            AuthorityError::not_sent(err.to_string())
        } else {
            AuthorityError::maybe_sent(err.to_string())
        }
    }
}

/// Fiscal operation errors.
#[derive(Debug, Error)]
pub enum FiscalError {
    /// Fiscal configuration cannot work.
    ///
    /// ## When This Occurs
    /// - `authority.mode = live` without a base URL or API token
    /// - Zero timeouts or retry attempts
    #[error("Invalid fiscal configuration: {0}")]
    Misconfigured(String),

    /// The authority refused the invoice. Nothing was persisted.
    #[error("Invoice for sale {sale_id} rejected by the tax authority ({code}): {message}")]
    Rejected {
        sale_id: String,
        code: String,
        message: String,
    },

    /// The local fallback could not produce an authorization either.
    #[error("Authorization failed: {0}")]
    Authority(#[from] AuthorityError),

    /// Stored data did not pass the renderer's integrity checks.
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<DbError> for FiscalError {
    fn from(err: DbError) -> Self {
        FiscalError::Engine(err.into())
    }
}

impl FiscalError {
    /// Whether this is a missing-record error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FiscalError::Engine(EngineError::Db(DbError::NotFound { .. })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resubmission_rules() {
        let refused = AuthorityError::not_sent("connection refused");
        assert!(refused.is_unavailable());
        assert!(refused.may_resubmit());

        let timed_out = AuthorityError::maybe_sent("timed out");
        assert!(timed_out.is_unavailable());
        assert!(!timed_out.may_resubmit());

        let rejected = AuthorityError::Rejected {
            code: "10016".into(),
            message: "bad date".into(),
        };
        assert!(!rejected.is_unavailable());
        assert!(!rejected.may_resubmit());
    }

    #[test]
    fn test_not_found_detection() {
        let err: FiscalError = DbError::not_found("Sale", "s-1").into();
        assert!(err.is_not_found());
        assert!(!FiscalError::Misconfigured("x".into()).is_not_found());
    }
}
