//! Shared plumbing for outbound provider calls.
//!
//! Every upstream failure is classified into one of three kinds so
//! callers can pick the right remediation: connectivity problems are
//! retryable/service-unavailable, status failures mean the provider
//! rejected us, shape failures mean the payload did not match its
//! contract. The three are never collapsed into each other.

use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Default timeout for provider calls
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Upstream call errors, by remediation class
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Timeout, DNS failure, connection refused - the provider was
    /// never reached
    #[error("Unable to connect to {service}: {detail}")]
    Connectivity { service: &'static str, detail: String },

    /// The provider answered with a non-2xx status (or an in-body
    /// error code, for APIs that tunnel errors through HTTP 200)
    #[error("{service} returned status {status}: {detail}")]
    Status {
        service: &'static str,
        status: u16,
        detail: String,
    },

    /// The payload parsed but did not match the documented shape
    #[error("Unexpected data format from {service}: {detail}")]
    Shape { service: &'static str, detail: String },
}

impl UpstreamError {
    pub fn shape(service: &'static str, detail: impl Into<String>) -> Self {
        UpstreamError::Shape {
            service,
            detail: detail.into(),
        }
    }

    fn from_reqwest(service: &'static str, err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => UpstreamError::Status {
                service,
                status: status.as_u16(),
                detail: err.to_string(),
            },
            None => UpstreamError::Connectivity {
                service,
                detail: err.to_string(),
            },
        }
    }
}

/// Build the shared outbound client
pub fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// GET a JSON document, classifying failures
pub async fn get_json(
    client: &reqwest::Client,
    service: &'static str,
    url: &str,
) -> Result<Value, UpstreamError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| UpstreamError::from_reqwest(service, e))?;

    read_json(service, response).await
}

/// Send a prepared request (for endpoints needing auth headers or a
/// JSON body) and
/// read a JSON document back
pub async fn send_json(
    service: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<Value, UpstreamError> {
    let response = request
        .send()
        .await
        .map_err(|e| UpstreamError::from_reqwest(service, e))?;

    read_json(service, response).await
}

/// Send a prepared request where success carries no body (204-style
/// endpoints)
pub async fn send_no_content(
    service: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<(), UpstreamError> {
    let response = request
        .send()
        .await
        .map_err(|e| UpstreamError::from_reqwest(service, e))?;

    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(UpstreamError::Status {
            service,
            status: status.as_u16(),
            detail,
        });
    }
    Ok(())
}

async fn read_json(
    service: &'static str,
    response: reqwest::Response,
) -> Result<Value, UpstreamError> {
    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(UpstreamError::Status {
            service,
            status: status.as_u16(),
            detail,
        });
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| UpstreamError::shape(service, e.to_string()))
}

/// Extract a required string field
pub fn field_str<'a>(
    service: &'static str,
    value: &'a Value,
    key: &str,
) -> Result<&'a str, UpstreamError> {
    value
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| UpstreamError::shape(service, format!("missing string field '{key}'")))
}

/// Extract a required numeric field, accepting the string-wrapped
/// numbers some providers emit
pub fn field_f64(service: &'static str, value: &Value, key: &str) -> Result<f64, UpstreamError> {
    let field = value
        .get(key)
        .ok_or_else(|| UpstreamError::shape(service, format!("missing field '{key}'")))?;

    match field {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| UpstreamError::shape(service, format!("field '{key}' out of range"))),
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|_| UpstreamError::shape(service, format!("field '{key}' is not numeric"))),
        _ => Err(UpstreamError::shape(
            service,
            format!("field '{key}' has unexpected type"),
        )),
    }
}
