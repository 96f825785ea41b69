use utoipa::OpenApi;

use crate::api::{
    electricity_handlers, handlers, monitor_handlers, stock_handlers, todo_handlers,
    weather_handlers,
};
use crate::api::responses::ErrorResponse;
use crate::api::stock_handlers::{AddWatchlistRequest, QuotaStatusResponse};
use crate::database::models::{
    CompletedTask, ElectricityPrice, PricePoint, StockQuote, SymbolHistory, WatchlistSymbol,
};
use crate::services::network::NetworkHealth;
use crate::services::sensor::SensorReading;
use crate::services::todoist::{DueDate, TodoTask};
use crate::services::transit::{Departure, StopDepartures};
use crate::services::weather::{CurrentWeather, Location};
use crate::stocks::Interval;

/// OpenAPI specification
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Home Dashboard API",
        version = "1.0.0",
        description = "Backend for a personal home dashboard: stock market data behind a rate-governed cache, electricity spot prices, todos, weather, transit and local telemetry"
    ),
    paths(
        handlers::health_check,
        stock_handlers::get_quotes,
        stock_handlers::get_history,
        stock_handlers::get_watchlist,
        stock_handlers::add_watchlist_symbol,
        stock_handlers::remove_watchlist_symbol,
        stock_handlers::get_quota_status,
        stock_handlers::trigger_prune,
        electricity_handlers::get_prices,
        electricity_handlers::refresh_prices,
        todo_handlers::get_tasks,
        todo_handlers::complete_task,
        todo_handlers::reopen_task,
        todo_handlers::get_completed,
        weather_handlers::get_weather,
        weather_handlers::get_location,
        weather_handlers::set_location,
        weather_handlers::search_locations,
        monitor_handlers::get_network_health,
        monitor_handlers::get_sensor_reading,
        monitor_handlers::get_departures,
    ),
    components(
        schemas(
            StockQuote,
            WatchlistSymbol,
            PricePoint,
            SymbolHistory,
            Interval,
            AddWatchlistRequest,
            QuotaStatusResponse,
            stock_handlers::PruneResponse,
            ElectricityPrice,
            electricity_handlers::RefreshResponse,
            TodoTask,
            DueDate,
            CompletedTask,
            CurrentWeather,
            Location,
            NetworkHealth,
            SensorReading,
            Departure,
            StopDepartures,
            ErrorResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Stocks", description = "Quotes, history, watchlist and quota"),
        (name = "Electricity", description = "Spot electricity prices"),
        (name = "Todos", description = "Todoist mirror and completion log"),
        (name = "Weather", description = "Weather and location settings"),
        (name = "Transit", description = "Public transit departure boards"),
        (name = "Monitoring", description = "Local network and sensor telemetry"),
    )
)]
pub struct ApiDoc;
