use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::IntoParams;

use super::handlers::AppState;
use super::responses::bad_request;
use crate::database::models::ElectricityPrice;

#[derive(Debug, Deserialize, IntoParams)]
pub struct PriceRangeQuery {
    /// Range start (RFC 3339); both bounds or neither
    pub from: Option<DateTime<Utc>>,
    /// Range end, exclusive
    pub to: Option<DateTime<Utc>>,
}

/// Hourly electricity spot prices
///
/// Without a range this returns today and tomorrow in market local
/// time; tomorrow appears once the upstream has published it.
#[utoipa::path(
    get,
    path = "/api/v1/electricity/prices",
    tag = "Electricity",
    params(PriceRangeQuery),
    responses(
        (status = 200, description = "Hourly prices, oldest first", body = Vec<ElectricityPrice>),
        (status = 400, description = "Half-open or inverted range")
    )
)]
pub async fn get_prices(
    State(state): State<AppState>,
    Query(query): Query<PriceRangeQuery>,
) -> Response {
    let result = match (query.from, query.to) {
        (Some(from), Some(to)) => {
            if from >= to {
                return bad_request("'from' must be before 'to'");
            }
            state.electricity.prices_between(from, to).await
        }
        (None, None) => state.electricity.upcoming_prices().await,
        _ => return bad_request("provide both 'from' and 'to', or neither"),
    };

    match result {
        Ok(prices) => Json(prices).into_response(),
        Err(error) => error.into_response(),
    }
}

/// Result of a manual price refresh
#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct RefreshResponse {
    pub stored: usize,
}

/// Manually trigger the fetch the daily job runs
#[utoipa::path(
    post,
    path = "/api/v1/electricity/refresh",
    tag = "Electricity",
    responses(
        (status = 200, description = "Sheet fetched and stored", body = RefreshResponse),
        (status = 502, description = "Price provider rejected the request or answered garbage"),
        (status = 503, description = "Price provider unreachable")
    )
)]
pub async fn refresh_prices(
    State(state): State<AppState>,
) -> Result<Json<RefreshResponse>, crate::services::electricity::ElectricityError> {
    let stored = state.electricity.fetch_and_store().await?;
    Ok(Json(RefreshResponse { stored }))
}
