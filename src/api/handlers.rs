use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use std::sync::Arc;

use crate::database::repositories::StockRepository;
use crate::services::{
    ElectricityService, NetworkMonitor, TelemetryCell, TodoistService, TransitService,
    WeatherService,
};
use crate::stocks::{QuotaGuard, StocksService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub stocks: Arc<StocksService>,
    pub stock_repository: Arc<dyn StockRepository>,
    pub quota: Arc<QuotaGuard>,
    pub electricity: Arc<ElectricityService>,
    pub todoist: Arc<TodoistService>,
    pub network: Arc<NetworkMonitor>,
    pub weather: Arc<WeatherService>,
    pub transit: Arc<TransitService>,
    pub sensor: Arc<TelemetryCell>,
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy")
    )
)]
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339()
    }))
}
