use axum::{
    routing::{delete, get, post, put},
    Router,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::electricity_handlers;
use super::handlers::{health_check, AppState};
use super::monitor_handlers;
use super::openapi::ApiDoc;
use super::stock_handlers;
use super::todo_handlers;
use super::weather_handlers;

/// Create the API router with Swagger UI
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/api/v1/health", get(health_check))
        // Stocks
        .route("/api/v1/stocks/quotes", get(stock_handlers::get_quotes))
        .route("/api/v1/stocks/history", get(stock_handlers::get_history))
        .route("/api/v1/stocks/watchlist", get(stock_handlers::get_watchlist))
        .route("/api/v1/stocks/watchlist", post(stock_handlers::add_watchlist_symbol))
        .route(
            "/api/v1/stocks/watchlist/:symbol",
            delete(stock_handlers::remove_watchlist_symbol),
        )
        .route("/api/v1/stocks/quota", get(stock_handlers::get_quota_status))
        .route("/api/v1/stocks/prune", post(stock_handlers::trigger_prune))
        // Electricity
        .route("/api/v1/electricity/prices", get(electricity_handlers::get_prices))
        .route("/api/v1/electricity/refresh", post(electricity_handlers::refresh_prices))
        // Todos
        .route("/api/v1/todos", get(todo_handlers::get_tasks))
        .route("/api/v1/todos/:id/complete", post(todo_handlers::complete_task))
        .route("/api/v1/todos/:id/reopen", post(todo_handlers::reopen_task))
        .route("/api/v1/todos/completed", get(todo_handlers::get_completed))
        // Weather
        .route("/api/v1/weather", get(weather_handlers::get_weather))
        .route("/api/v1/weather/location", get(weather_handlers::get_location))
        .route("/api/v1/weather/location", put(weather_handlers::set_location))
        .route(
            "/api/v1/weather/locations/search",
            get(weather_handlers::search_locations),
        )
        // Monitoring and transit
        .route("/api/v1/network/health", get(monitor_handlers::get_network_health))
        .route("/api/v1/sensor/latest", get(monitor_handlers::get_sensor_reading))
        .route("/api/v1/transit/stops", get(monitor_handlers::get_departures))
        .with_state(state)
}
