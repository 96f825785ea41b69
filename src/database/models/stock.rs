use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Watchlist entry - a symbol the user tracks on the dashboard
///
/// Removing a symbol cascades to its quote and history rows.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize, ToSchema)]
#[diesel(table_name = crate::database::schema::watchlist_symbols)]
#[diesel(primary_key(symbol))]
pub struct WatchlistSymbol {
    /// Ticker symbol (e.g., "AAPL")
    pub symbol: String,

    /// Human-readable display name
    pub name: String,

    /// Timestamp when the symbol was added
    pub created_at: DateTime<Utc>,
}

/// New watchlist entry for insertion
#[derive(Debug, Clone, Insertable, Serialize, Deserialize, ToSchema)]
#[diesel(table_name = crate::database::schema::watchlist_symbols)]
pub struct NewWatchlistSymbol {
    pub symbol: String,
    pub name: String,
}

/// Point-in-time quote for a watchlist symbol
///
/// Upserted by symbol on every successful upstream fetch; never
/// individually deleted except via watchlist removal.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize, ToSchema)]
#[diesel(table_name = crate::database::schema::stock_quotes)]
#[diesel(primary_key(symbol))]
pub struct StockQuote {
    /// Ticker symbol (e.g., "AAPL")
    pub symbol: String,

    /// Human-readable display name
    pub name: String,

    /// Last close price, rounded to 2 decimals (upstream contract)
    pub close: f64,

    /// Absolute change since previous close
    pub change: f64,

    /// Percent change since previous close
    pub percent_change: f64,

    /// Day high
    pub high: f64,

    /// Day low
    pub low: f64,

    /// Day volume
    pub volume: i64,

    /// Observation timestamp
    pub quoted_at: DateTime<Utc>,
}

/// New quote for upsert
#[derive(Debug, Clone, Insertable, AsChangeset, Serialize, Deserialize, ToSchema)]
#[diesel(table_name = crate::database::schema::stock_quotes)]
pub struct NewStockQuote {
    pub symbol: String,
    pub name: String,
    pub close: f64,
    pub change: f64,
    pub percent_change: f64,
    pub high: f64,
    pub low: f64,
    pub volume: i64,
    pub quoted_at: DateTime<Utc>,
}

impl From<NewStockQuote> for StockQuote {
    fn from(q: NewStockQuote) -> Self {
        StockQuote {
            symbol: q.symbol,
            name: q.name,
            close: q.close,
            change: q.change,
            percent_change: q.percent_change,
            high: q.high,
            low: q.low,
            volume: q.volume,
            quoted_at: q.quoted_at,
        }
    }
}

/// One OHLC-close sample of an intraday series
///
/// Identity is (symbol, interval, entry_time); read ordered by
/// entry_time ascending.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize, ToSchema)]
#[diesel(table_name = crate::database::schema::stock_price_entries)]
pub struct StockPriceEntry {
    pub id: i64,
    pub symbol: String,
    pub interval: String,
    pub entry_time: DateTime<Utc>,
    pub price: f64,
}

/// New history sample for batch insertion
#[derive(Debug, Clone, Insertable, Serialize, Deserialize, ToSchema)]
#[diesel(table_name = crate::database::schema::stock_price_entries)]
pub struct NewStockPriceEntry {
    pub symbol: String,
    pub interval: String,
    pub entry_time: DateTime<Utc>,
    pub price: f64,
}

/// A single (time, price) point as served to the frontend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PricePoint {
    pub time: DateTime<Utc>,
    pub price: f64,
}

impl From<StockPriceEntry> for PricePoint {
    fn from(e: StockPriceEntry) -> Self {
        PricePoint {
            time: e.entry_time,
            price: e.price,
        }
    }
}

/// Per-symbol price series response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SymbolHistory {
    pub symbol: String,
    pub history: Vec<PricePoint>,
}
