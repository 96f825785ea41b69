use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::database::DatabaseError;
use crate::services::electricity::ElectricityError;
use crate::services::todoist::TodoError;
use crate::services::weather::WeatherError;
use crate::stocks::StocksError;
use crate::upstream::UpstreamError;

/// Uniform error body
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

pub(crate) fn error_response(status: StatusCode, message: String) -> Response {
    let body = Json(ErrorResponse {
        error: status.to_string(),
        message,
    });
    (status, body).into_response()
}

pub(crate) fn bad_request(message: impl Into<String>) -> Response {
    error_response(StatusCode::BAD_REQUEST, message.into())
}

pub(crate) fn not_found(message: impl Into<String>) -> Response {
    error_response(StatusCode::NOT_FOUND, message.into())
}

/// Upstream failures map by remediation class: unreachable providers
/// are 503, providers that answered badly are 502
fn upstream_status(error: &UpstreamError) -> StatusCode {
    match error {
        UpstreamError::Connectivity { .. } => StatusCode::SERVICE_UNAVAILABLE,
        UpstreamError::Status { .. } | UpstreamError::Shape { .. } => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for UpstreamError {
    fn into_response(self) -> Response {
        error_response(upstream_status(&self), self.to_string())
    }
}

impl IntoResponse for DatabaseError {
    fn into_response(self) -> Response {
        error_response(StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
    }
}

impl IntoResponse for StocksError {
    fn into_response(self) -> Response {
        match self {
            StocksError::Upstream(e) => e.into_response(),
            StocksError::Database(e) => e.into_response(),
        }
    }
}

impl IntoResponse for ElectricityError {
    fn into_response(self) -> Response {
        match self {
            ElectricityError::Upstream(e) => e.into_response(),
            ElectricityError::Database(e) => e.into_response(),
        }
    }
}

impl IntoResponse for TodoError {
    fn into_response(self) -> Response {
        match self {
            TodoError::Upstream(e) => e.into_response(),
            TodoError::Database(e) => e.into_response(),
        }
    }
}

impl IntoResponse for WeatherError {
    fn into_response(self) -> Response {
        match self {
            WeatherError::Upstream(e) => e.into_response(),
            WeatherError::Settings(e) => {
                error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        }
    }
}
