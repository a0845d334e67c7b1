//! HTTP error mapping.
//!
//! Every failure leaves the server as `{ "code": "...", "message": "..." }`.
//!
//! | error                                        | status |
//! |----------------------------------------------|--------|
//! | malformed input, empty cart, bad split       | 400    |
//! | not found                                    | 404    |
//! | stock, order transition, already paid        | 409    |
//! | credit limit, unavailable product, rejected  | 422    |
//! | database, configuration, anything else       | 500    |
//!
//! 500 responses carry a generic message; the details go to the log.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use mostrador_core::CoreError;
use mostrador_db::{DbError, EngineError};
use mostrador_fiscal::FiscalError;

/// Error returned by every handler.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        ApiError {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    fn internal(err: &dyn std::fmt::Display) -> Self {
        error!(error = %err, "Request failed");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "Internal server error",
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code,
            message: &self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = match &err {
            CoreError::EmptyCart
            | CoreError::MissingClient { .. }
            | CoreError::InvalidSplit { .. }
            | CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::InsufficientStock { .. }
            | CoreError::InvalidTransition { .. }
            | CoreError::CommissionAlreadyPaid(_) => StatusCode::CONFLICT,
            CoreError::CreditLimitExceeded { .. } | CoreError::ProductUnavailable(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
        };
        ApiError::new(status, err.code(), err.to_string())
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { .. } => {
                ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
            }
            other => ApiError::internal(&other),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Core(e) => e.into(),
            EngineError::Db(e) => e.into(),
        }
    }
}

impl From<FiscalError> for ApiError {
    fn from(err: FiscalError) -> Self {
        match err {
            FiscalError::Rejected { .. } => ApiError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "AUTHORITY_REJECTED",
                err.to_string(),
            ),
            FiscalError::Engine(e) => e.into(),
            other => ApiError::internal(&other),
        }
    }
}
