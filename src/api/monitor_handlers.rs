use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::handlers::AppState;
use super::responses::error_response;
use crate::services::network::NetworkHealth;
use crate::services::sensor::SensorReading;
use crate::services::transit::StopDepartures;
use crate::upstream::UpstreamError;

/// The latest local network snapshot
#[utoipa::path(
    get,
    path = "/api/v1/network/health",
    tag = "Monitoring",
    responses(
        (status = 200, description = "Latest snapshot", body = NetworkHealth),
        (status = 503, description = "No sample taken yet")
    )
)]
pub async fn get_network_health(State(state): State<AppState>) -> Response {
    match state.network.latest() {
        Some(health) => Json(health).into_response(),
        None => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "no network sample yet".to_string(),
        ),
    }
}

/// The latest environment sensor reading
#[utoipa::path(
    get,
    path = "/api/v1/sensor/latest",
    tag = "Monitoring",
    responses(
        (status = 200, description = "Latest reading", body = SensorReading),
        (status = 503, description = "No reading received yet")
    )
)]
pub async fn get_sensor_reading(State(state): State<AppState>) -> Response {
    match state.sensor.latest() {
        Some(reading) => Json(reading).into_response(),
        None => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "no sensor reading yet".to_string(),
        ),
    }
}

/// Departure boards for the configured stops
#[utoipa::path(
    get,
    path = "/api/v1/transit/stops",
    tag = "Transit",
    responses(
        (status = 200, description = "One board per reachable stop", body = Vec<StopDepartures>),
        (status = 502, description = "Routing API rejected the request"),
        (status = 503, description = "Routing API unreachable")
    )
)]
pub async fn get_departures(
    State(state): State<AppState>,
) -> Result<Json<Vec<StopDepartures>>, UpstreamError> {
    Ok(Json(state.transit.departures().await?))
}
