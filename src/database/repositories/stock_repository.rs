use crate::database::connection::{DatabaseError, PgPooledConnection};
use crate::database::models::{
    NewStockPriceEntry, NewStockQuote, NewWatchlistSymbol, StockPriceEntry, StockQuote,
    WatchlistSymbol,
};
use crate::database::schema::{stock_price_entries, stock_quotes, watchlist_symbols};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use std::sync::Arc;

/// Stock repository trait - quotes, intraday history and the watchlist
///
/// All batch writes are transactional: a failure mid-batch must leave
/// no partial rows behind.
#[async_trait::async_trait]
pub trait StockRepository: Send + Sync {
    /// Upsert a batch of quotes by symbol
    async fn upsert_quotes(&self, quotes: Vec<NewStockQuote>) -> Result<usize, DatabaseError>;

    /// Load quotes for a symbol set
    async fn quotes_by_symbols(
        &self,
        symbols: Vec<String>,
    ) -> Result<Vec<StockQuote>, DatabaseError>;

    /// Load history rows for a symbol set within [from, to), ordered by
    /// entry_time ascending
    async fn history_in_window(
        &self,
        symbols: Vec<String>,
        interval: String,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StockPriceEntry>, DatabaseError>;

    /// Replace history rows for each (symbol, interval) pair within
    /// [from, to): delete-then-insert inside a single transaction so a
    /// failure on any symbol rolls the whole batch back
    async fn replace_history(
        &self,
        interval: String,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        batches: Vec<(String, Vec<NewStockPriceEntry>)>,
    ) -> Result<usize, DatabaseError>;

    /// Delete history rows older than the cutoff (retention pruning)
    async fn delete_history_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError>;

    /// Get the full watchlist, ordered by symbol
    async fn watchlist(&self) -> Result<Vec<WatchlistSymbol>, DatabaseError>;

    /// Add a symbol to the watchlist
    async fn add_watchlist_symbol(
        &self,
        entry: NewWatchlistSymbol,
    ) -> Result<WatchlistSymbol, DatabaseError>;

    /// Remove a symbol and cascade to its quote and history rows
    async fn remove_watchlist_symbol(&self, symbol: String) -> Result<bool, DatabaseError>;
}

/// Concrete implementation backed by diesel/PostgreSQL
///
/// Diesel is blocking, so every operation runs on the blocking pool to
/// keep the async scheduler free for pollers and request handlers.
pub struct StockRepositoryImpl {
    get_conn: Arc<dyn Fn() -> Result<PgPooledConnection, DatabaseError> + Send + Sync>,
}

impl StockRepositoryImpl {
    /// Create a new stock repository with a connection provider
    pub fn new<F>(get_conn: F) -> Self
    where
        F: Fn() -> Result<PgPooledConnection, DatabaseError> + Send + Sync + 'static,
    {
        Self {
            get_conn: Arc::new(get_conn),
        }
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T, DatabaseError>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgPooledConnection) -> Result<T, DatabaseError> + Send + 'static,
    {
        let get_conn = Arc::clone(&self.get_conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = get_conn()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| DatabaseError::TaskJoin(e.to_string()))?
    }
}

#[async_trait::async_trait]
impl StockRepository for StockRepositoryImpl {
    async fn upsert_quotes(&self, quotes: Vec<NewStockQuote>) -> Result<usize, DatabaseError> {
        if quotes.is_empty() {
            return Ok(0);
        }

        self.run_blocking(move |conn| {
            conn.transaction::<_, DatabaseError, _>(|conn| {
                let mut count = 0;
                for quote in quotes {
                    diesel::insert_into(stock_quotes::table)
                        .values(&quote)
                        .on_conflict(stock_quotes::symbol)
                        .do_update()
                        .set(&quote)
                        .execute(conn)?;
                    count += 1;
                }
                Ok(count)
            })
        })
        .await
    }

    async fn quotes_by_symbols(
        &self,
        symbols: Vec<String>,
    ) -> Result<Vec<StockQuote>, DatabaseError> {
        self.run_blocking(move |conn| {
            stock_quotes::table
                .filter(stock_quotes::symbol.eq_any(&symbols))
                .load::<StockQuote>(conn)
                .map_err(DatabaseError::from)
        })
        .await
    }

    async fn history_in_window(
        &self,
        symbols: Vec<String>,
        interval: String,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StockPriceEntry>, DatabaseError> {
        self.run_blocking(move |conn| {
            stock_price_entries::table
                .filter(stock_price_entries::symbol.eq_any(&symbols))
                .filter(stock_price_entries::interval.eq(&interval))
                .filter(stock_price_entries::entry_time.ge(from))
                .filter(stock_price_entries::entry_time.lt(to))
                .order(stock_price_entries::entry_time.asc())
                .load::<StockPriceEntry>(conn)
                .map_err(DatabaseError::from)
        })
        .await
    }

    async fn replace_history(
        &self,
        interval: String,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        batches: Vec<(String, Vec<NewStockPriceEntry>)>,
    ) -> Result<usize, DatabaseError> {
        if batches.is_empty() {
            return Ok(0);
        }

        self.run_blocking(move |conn| {
            conn.transaction::<_, DatabaseError, _>(|conn| {
                let mut inserted = 0;
                for (symbol, entries) in batches {
                    diesel::delete(stock_price_entries::table)
                        .filter(stock_price_entries::symbol.eq(&symbol))
                        .filter(stock_price_entries::interval.eq(&interval))
                        .filter(stock_price_entries::entry_time.ge(from))
                        .filter(stock_price_entries::entry_time.lt(to))
                        .execute(conn)?;

                    inserted += diesel::insert_into(stock_price_entries::table)
                        .values(&entries)
                        .execute(conn)?;
                }
                Ok(inserted)
            })
        })
        .await
    }

    async fn delete_history_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError> {
        self.run_blocking(move |conn| {
            let deleted = diesel::delete(stock_price_entries::table)
                .filter(stock_price_entries::entry_time.lt(cutoff))
                .execute(conn)?;

            tracing::info!("Deleted {} history rows before {}", deleted, cutoff);

            Ok(deleted)
        })
        .await
    }

    async fn watchlist(&self) -> Result<Vec<WatchlistSymbol>, DatabaseError> {
        self.run_blocking(move |conn| {
            watchlist_symbols::table
                .order(watchlist_symbols::symbol.asc())
                .load::<WatchlistSymbol>(conn)
                .map_err(DatabaseError::from)
        })
        .await
    }

    async fn add_watchlist_symbol(
        &self,
        entry: NewWatchlistSymbol,
    ) -> Result<WatchlistSymbol, DatabaseError> {
        self.run_blocking(move |conn| {
            diesel::insert_into(watchlist_symbols::table)
                .values(&entry)
                .on_conflict(watchlist_symbols::symbol)
                .do_update()
                .set(watchlist_symbols::name.eq(&entry.name))
                .get_result::<WatchlistSymbol>(conn)
                .map_err(DatabaseError::from)
        })
        .await
    }

    async fn remove_watchlist_symbol(&self, symbol: String) -> Result<bool, DatabaseError> {
        self.run_blocking(move |conn| {
            conn.transaction::<_, DatabaseError, _>(|conn| {
                diesel::delete(stock_price_entries::table)
                    .filter(stock_price_entries::symbol.eq(&symbol))
                    .execute(conn)?;

                diesel::delete(stock_quotes::table)
                    .filter(stock_quotes::symbol.eq(&symbol))
                    .execute(conn)?;

                let deleted = diesel::delete(watchlist_symbols::table)
                    .filter(watchlist_symbols::symbol.eq(&symbol))
                    .execute(conn)?;

                Ok(deleted > 0)
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    // Repository tests require an actual database connection - skip in CI
    #[test]
    #[ignore]
    fn test_replace_history_rolls_back_on_failure() {
        // With a live database: seed rows for three symbols, force a
        // constraint violation on the second batch entry, then assert
        // history_in_window returns the pre-existing rows unchanged.
    }
}
