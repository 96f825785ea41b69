use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use super::handlers::AppState;
use super::responses::{bad_request, not_found};
use crate::database::models::{NewWatchlistSymbol, StockQuote, SymbolHistory, WatchlistSymbol};
use crate::database::DatabaseError;
use crate::stocks::{Interval, StocksError};

/// Query parameters for quote/history lookups
#[derive(Debug, Deserialize, IntoParams)]
pub struct SymbolsQuery {
    /// Comma-separated ticker symbols; defaults to the whole watchlist
    pub symbols: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryQuery {
    /// Comma-separated ticker symbols; defaults to the whole watchlist
    pub symbols: Option<String>,
    /// Bar resolution: 1min, 5min, 15min, 30min or 1h
    pub interval: Option<String>,
}

/// Request to add a watchlist symbol
#[derive(Debug, Deserialize, ToSchema)]
pub struct AddWatchlistRequest {
    pub symbol: String,
    /// Display name; defaults to the symbol itself
    pub name: Option<String>,
}

/// Upstream quota consumption snapshot
#[derive(Debug, serde::Serialize, ToSchema)]
pub struct QuotaStatusResponse {
    pub credits_used_today: u32,
    pub daily_credit_limit: u32,
    pub max_requests_per_minute: usize,
    pub max_tokens_per_minute: usize,
}

async fn requested_symbols(
    state: &AppState,
    symbols: Option<String>,
) -> Result<Vec<String>, DatabaseError> {
    match symbols {
        Some(raw) => Ok(raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_uppercase)
            .collect()),
        None => Ok(state
            .stock_repository
            .watchlist()
            .await?
            .into_iter()
            .map(|entry| entry.symbol)
            .collect()),
    }
}

/// Get quotes for the requested symbols
#[utoipa::path(
    get,
    path = "/api/v1/stocks/quotes",
    tag = "Stocks",
    params(SymbolsQuery),
    responses(
        (status = 200, description = "Quotes in request order; unresolved symbols omitted", body = Vec<StockQuote>),
        (status = 502, description = "Provider rejected the request or answered garbage"),
        (status = 503, description = "Provider unreachable")
    )
)]
pub async fn get_quotes(
    State(state): State<AppState>,
    Query(query): Query<SymbolsQuery>,
) -> Result<Json<Vec<StockQuote>>, StocksError> {
    let symbols = requested_symbols(&state, query.symbols).await?;
    Ok(Json(state.stocks.get_quotes(&symbols).await?))
}

/// Get intraday history for the requested symbols
#[utoipa::path(
    get,
    path = "/api/v1/stocks/history",
    tag = "Stocks",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Per-symbol series over the target session", body = Vec<SymbolHistory>),
        (status = 400, description = "Unknown interval"),
        (status = 502, description = "Provider rejected the request or answered garbage"),
        (status = 503, description = "Provider unreachable")
    )
)]
pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let raw_interval = query.interval.as_deref().unwrap_or("5min");
    let Some(interval) = Interval::from_str(raw_interval) else {
        return bad_request(format!("unknown interval '{raw_interval}'"));
    };

    let symbols = match requested_symbols(&state, query.symbols).await {
        Ok(symbols) => symbols,
        Err(error) => return error.into_response(),
    };

    match state.stocks.get_history(&symbols, interval).await {
        Ok(history) => Json(history).into_response(),
        Err(error) => error.into_response(),
    }
}

/// List watchlist symbols
#[utoipa::path(
    get,
    path = "/api/v1/stocks/watchlist",
    tag = "Stocks",
    responses(
        (status = 200, description = "Watchlist entries", body = Vec<WatchlistSymbol>)
    )
)]
pub async fn get_watchlist(
    State(state): State<AppState>,
) -> Result<Json<Vec<WatchlistSymbol>>, DatabaseError> {
    Ok(Json(state.stock_repository.watchlist().await?))
}

/// Add a symbol to the watchlist
#[utoipa::path(
    post,
    path = "/api/v1/stocks/watchlist",
    tag = "Stocks",
    request_body = AddWatchlistRequest,
    responses(
        (status = 201, description = "Symbol added (or already present)", body = WatchlistSymbol),
        (status = 400, description = "Empty symbol")
    )
)]
pub async fn add_watchlist_symbol(
    State(state): State<AppState>,
    Json(request): Json<AddWatchlistRequest>,
) -> Response {
    let symbol = request.symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return bad_request("symbol must not be empty");
    }

    let name = request
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| symbol.clone());

    match state
        .stock_repository
        .add_watchlist_symbol(NewWatchlistSymbol { symbol, name })
        .await
    {
        Ok(entry) => (StatusCode::CREATED, Json(entry)).into_response(),
        Err(error) => error.into_response(),
    }
}

/// Remove a symbol and all its stored market data
#[utoipa::path(
    delete,
    path = "/api/v1/stocks/watchlist/{symbol}",
    tag = "Stocks",
    params(
        ("symbol" = String, Path, description = "Ticker symbol")
    ),
    responses(
        (status = 204, description = "Symbol removed with its quote and history"),
        (status = 404, description = "Symbol not on the watchlist")
    )
)]
pub async fn remove_watchlist_symbol(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Response {
    match state
        .stock_repository
        .remove_watchlist_symbol(symbol.trim().to_uppercase())
        .await
    {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => not_found(format!("'{symbol}' is not on the watchlist")),
        Err(error) => error.into_response(),
    }
}

/// Manually trigger the retention sweep the hourly job runs
#[utoipa::path(
    post,
    path = "/api/v1/stocks/prune",
    tag = "Stocks",
    responses(
        (status = 200, description = "Sweep completed", body = PruneResponse)
    )
)]
pub async fn trigger_prune(
    State(state): State<AppState>,
) -> Result<Json<PruneResponse>, StocksError> {
    let deleted = state.stocks.prune_history().await?;
    Ok(Json(PruneResponse { deleted }))
}

/// Result of a manual retention sweep
#[derive(Debug, serde::Serialize, ToSchema)]
pub struct PruneResponse {
    pub deleted: usize,
}

/// Current upstream quota consumption
#[utoipa::path(
    get,
    path = "/api/v1/stocks/quota",
    tag = "Stocks",
    responses(
        (status = 200, description = "Quota snapshot", body = QuotaStatusResponse)
    )
)]
pub async fn get_quota_status(State(state): State<AppState>) -> Json<QuotaStatusResponse> {
    let config = state.quota.config();
    Json(QuotaStatusResponse {
        credits_used_today: state.quota.credits_used_today(),
        daily_credit_limit: config.daily_credit_limit,
        max_requests_per_minute: config.max_requests_per_minute,
        max_tokens_per_minute: config.max_tokens_per_minute,
    })
}
