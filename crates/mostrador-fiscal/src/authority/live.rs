//! HTTP client for the authority gateway.
//!
//! ## Gateway Contract
//! ```text
//! GET  {base}/v1/points-of-sale/{pos}/vouchers/{type}/last
//!      200 { "number": 41 }
//!
//! POST {base}/v1/vouchers            (InvoiceRequest as JSON)
//!      200 { "result": "approved", "authorization_code": "7401...",
//!            "authorization_expiry": "20261027", "number": 42 }
//!      200 { "result": "rejected", "errors": [{ "code": "10016", "message": "..." }] }
//!
//! 5xx / 408 / 429        → Unavailable
//! other 4xx              → Rejected
//! connect failure        → Unavailable { sent: false }
//! ```

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};

use mostrador_core::fiscal::{Authorization, InvoiceRequest};
use mostrador_core::{AuthorizationSource, DocumentType};

use super::TaxAuthorityClient;
use crate::config::AuthorityConfig;
use crate::error::{AuthorityError, FiscalError, FiscalResult};

/// Talks to the real tax authority.
#[derive(Debug, Clone)]
pub struct RealAuthorityClient {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl RealAuthorityClient {
    /// Builds the client from a validated live configuration.
    pub fn new(config: &AuthorityConfig) -> FiscalResult<Self> {
        config.validate()?;

        let base_url = config
            .base_url
            .as_deref()
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .ok_or_else(|| FiscalError::Misconfigured("authority.base_url is missing".into()))?;
        let api_token = config
            .api_token
            .clone()
            .ok_or_else(|| FiscalError::Misconfigured("authority.api_token is missing".into()))?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.request_timeout())
            .user_agent(concat!("mostrador/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FiscalError::Misconfigured(format!("HTTP client: {}", e)))?;

        info!(base_url = %base_url, "Tax authority client configured");
        Ok(RealAuthorityClient {
            http,
            base_url,
            api_token,
        })
    }

    async fn read_body(response: reqwest::Response) -> Result<String, AuthorityError> {
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(classify_status(status, &body))
        }
    }
}

#[async_trait]
impl TaxAuthorityClient for RealAuthorityClient {
    fn source(&self) -> AuthorizationSource {
        AuthorizationSource::Authority
    }

    async fn next_sequence(
        &self,
        point_of_sale: u32,
        document_type: DocumentType,
    ) -> Result<i64, AuthorityError> {
        let voucher_type = document_type.authority_code().ok_or_else(|| {
            AuthorityError::Rejected {
                code: "LOCAL".to_string(),
                message: format!("{} documents are not numbered by the authority", document_type),
            }
        })?;

        let url = format!(
            "{}/v1/points-of-sale/{}/vouchers/{}/last",
            self.base_url, point_of_sale, voucher_type
        );
        debug!(%url, "Fetching last voucher number");

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await?;
        let body = Self::read_body(response).await?;

        Ok(parse_last_number(&body)? + 1)
    }

    async fn submit(&self, request: &InvoiceRequest) -> Result<Authorization, AuthorityError> {
        let number = request.number.ok_or_else(|| AuthorityError::Rejected {
            code: "LOCAL".to_string(),
            message: "request has no document number".to_string(),
        })?;

        let url = format!("{}/v1/vouchers", self.base_url);
        debug!(%url, sale_id = %request.sale_id, number, "Submitting voucher");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(request)
            .send()
            .await?;
        let body = Self::read_body(response).await?;

        parse_authorization(&body, number)
    }
}

// =============================================================================
// Response parsing
// =============================================================================

#[derive(Debug, Deserialize)]
struct LastNumberResponse {
    number: i64,
}

#[derive(Debug, Deserialize)]
struct VoucherResponse {
    result: String,
    #[serde(default)]
    authorization_code: Option<String>,
    #[serde(default)]
    authorization_expiry: Option<String>,
    #[serde(default)]
    number: Option<i64>,
    #[serde(default)]
    errors: Vec<GatewayError>,
}

#[derive(Debug, Deserialize)]
struct GatewayError {
    code: String,
    message: String,
}

fn parse_last_number(body: &str) -> Result<i64, AuthorityError> {
    serde_json::from_str::<LastNumberResponse>(body)
        .map(|r| r.number)
        .map_err(|e| AuthorityError::maybe_sent(format!("malformed sequence response: {}", e)))
}

fn parse_authorization(body: &str, requested_number: i64) -> Result<Authorization, AuthorityError> {
    let response: VoucherResponse = serde_json::from_str(body)
        .map_err(|e| AuthorityError::maybe_sent(format!("malformed voucher response: {}", e)))?;

    if !response.result.eq_ignore_ascii_case("approved") {
        let (code, message) = match response.errors.into_iter().next() {
            Some(err) => (err.code, err.message),
            None => (response.result, "rejected without details".to_string()),
        };
        return Err(AuthorityError::Rejected { code, message });
    }

    let code = response
        .authorization_code
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AuthorityError::maybe_sent("approved voucher without authorization code"))?;
    let expiry = response
        .authorization_expiry
        .as_deref()
        .and_then(parse_expiry)
        .ok_or_else(|| AuthorityError::maybe_sent("approved voucher without a valid expiry"))?;

    Ok(Authorization {
        code,
        expiry,
        number: response.number.unwrap_or(requested_number),
        source: AuthorizationSource::Authority,
    })
}

/// Accepts `YYYYMMDD` (authority style) and `YYYY-MM-DD`.
fn parse_expiry(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

fn classify_status(status: StatusCode, body: &str) -> AuthorityError {
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        return AuthorityError::maybe_sent(format!("gateway answered {}", status));
    }

    let message = serde_json::from_str::<VoucherResponse>(body)
        .ok()
        .and_then(|r| r.errors.into_iter().next())
        .map(|e| e.message)
        .unwrap_or_else(|| body.chars().take(200).collect());

    AuthorityError::Rejected {
        code: status.as_u16().to_string(),
        message,
    }
}
