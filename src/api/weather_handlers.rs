use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use utoipa::IntoParams;

use super::handlers::AppState;
use super::responses::bad_request;
use crate::services::weather::{CurrentWeather, Location, WeatherError};

#[derive(Debug, Deserialize, IntoParams)]
pub struct LocationSearchQuery {
    /// Free-text place name
    pub query: String,
}

/// Current conditions at the configured location
#[utoipa::path(
    get,
    path = "/api/v1/weather",
    tag = "Weather",
    responses(
        (status = 200, description = "Current conditions", body = CurrentWeather),
        (status = 502, description = "Weather provider answered garbage"),
        (status = 503, description = "Weather provider unreachable")
    )
)]
pub async fn get_weather(
    State(state): State<AppState>,
) -> Result<Json<CurrentWeather>, WeatherError> {
    Ok(Json(state.weather.current_weather().await?))
}

/// The configured weather location
#[utoipa::path(
    get,
    path = "/api/v1/weather/location",
    tag = "Weather",
    responses(
        (status = 200, description = "Configured location", body = Location)
    )
)]
pub async fn get_location(State(state): State<AppState>) -> Json<Location> {
    Json(state.weather.location())
}

/// Change the weather location
#[utoipa::path(
    put,
    path = "/api/v1/weather/location",
    tag = "Weather",
    request_body = Location,
    responses(
        (status = 200, description = "Location updated and persisted", body = Location),
        (status = 400, description = "Coordinates out of range")
    )
)]
pub async fn set_location(
    State(state): State<AppState>,
    Json(location): Json<Location>,
) -> Response {
    if !(-90.0..=90.0).contains(&location.latitude)
        || !(-180.0..=180.0).contains(&location.longitude)
    {
        return bad_request("coordinates out of range");
    }

    match state.weather.set_location(location.clone()).await {
        Ok(()) => Json(location).into_response(),
        Err(error) => error.into_response(),
    }
}

/// Geocode a place name into candidate locations
#[utoipa::path(
    get,
    path = "/api/v1/weather/locations/search",
    tag = "Weather",
    params(LocationSearchQuery),
    responses(
        (status = 200, description = "Candidate locations, best match first", body = Vec<Location>),
        (status = 400, description = "Empty query")
    )
)]
pub async fn search_locations(
    State(state): State<AppState>,
    Query(query): Query<LocationSearchQuery>,
) -> Response {
    let query = query.query.trim();
    if query.is_empty() {
        return bad_request("query must not be empty");
    }

    match state.weather.search_locations(query).await {
        Ok(locations) => Json(locations).into_response(),
        Err(error) => error.into_response(),
    }
}
