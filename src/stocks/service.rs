use crate::database::models::{
    NewStockPriceEntry, PricePoint, StockQuote, SymbolHistory,
};
use crate::database::repositories::StockRepository;
use crate::database::DatabaseError;
use crate::stocks::cache::{history_key, quote_key, TtlCache};
use crate::stocks::provider::MarketDataProvider;
use crate::stocks::quota::QuotaGuard;
use crate::stocks::session::MarketCalendar;
use crate::stocks::Interval;
use crate::upstream::UpstreamError;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Stocks subsystem errors
#[derive(Debug, Error)]
pub enum StocksError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Staleness and retention tuning
///
/// Product-tuned values carried over from the deployed system; kept as
/// defaults so they can be retuned without code changes.
#[derive(Debug, Clone, Copy)]
pub struct StalenessPolicy {
    /// A closed-session quote is fresh from this long before the close
    pub pre_close_buffer: Duration,
    /// A closed-session series may miss at most this much window tail
    pub post_close_gap: Duration,
    /// Open-session quote lifespan
    pub quote_lifespan: Duration,
    /// History rows older than this are pruned
    pub retention: Duration,
    /// Memory-cache entry TTL
    pub cache_ttl: std::time::Duration,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self {
            pre_close_buffer: Duration::minutes(15),
            post_close_gap: Duration::minutes(10),
            quote_lifespan: Duration::seconds(60),
            retention: Duration::hours(72),
            cache_ttl: std::time::Duration::from_secs(60),
        }
    }
}

/// Rate-budget-aware smart cache for quotes and intraday history
///
/// Lookup is strictly tiered: memory cache, then durable store, then a
/// quota-gated upstream fetch - each tier is more expensive than the
/// one before it, so the order is never changed. When the quota guard
/// denies a fetch, stale store data is served silently instead;
/// freshness is sacrificed to respect the budget.
pub struct StocksService {
    repository: Arc<dyn StockRepository>,
    provider: Arc<dyn MarketDataProvider>,
    quota: Arc<QuotaGuard>,
    calendar: MarketCalendar,
    policy: StalenessPolicy,
    quote_cache: TtlCache<StockQuote>,
    history_cache: TtlCache<Vec<PricePoint>>,
}

impl StocksService {
    pub fn new(
        repository: Arc<dyn StockRepository>,
        provider: Arc<dyn MarketDataProvider>,
        quota: Arc<QuotaGuard>,
        calendar: MarketCalendar,
        policy: StalenessPolicy,
    ) -> Self {
        Self {
            repository,
            provider,
            quota,
            calendar,
            policy,
            quote_cache: TtlCache::new(policy.cache_ttl),
            history_cache: TtlCache::new(policy.cache_ttl),
        }
    }

    /// Get quotes for the requested symbols, one per symbol that could
    /// be resolved, in input order
    pub async fn get_quotes(&self, symbols: &[String]) -> Result<Vec<StockQuote>, StocksError> {
        self.get_quotes_at(symbols, Utc::now()).await
    }

    /// Get intraday series for the requested symbols within the target
    /// session window
    pub async fn get_history(
        &self,
        symbols: &[String],
        interval: Interval,
    ) -> Result<Vec<SymbolHistory>, StocksError> {
        self.get_history_at(symbols, interval, Utc::now()).await
    }

    /// Delete history rows past the retention window. Idempotent;
    /// runs on a schedule and can be triggered manually.
    pub async fn prune_history(&self) -> Result<usize, StocksError> {
        let cutoff = Utc::now() - self.policy.retention;
        Ok(self.repository.delete_history_before(cutoff).await?)
    }

    async fn get_quotes_at(
        &self,
        symbols: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<StockQuote>, StocksError> {
        let symbols = dedupe(symbols);

        let mut resolved: HashMap<String, StockQuote> = HashMap::new();
        let mut missing = Vec::new();

        for symbol in &symbols {
            match self.quote_cache.get(&quote_key(symbol)) {
                Some(quote) => {
                    resolved.insert(symbol.clone(), quote);
                }
                None => missing.push(symbol.clone()),
            }
        }

        if !missing.is_empty() {
            let store_rows = self.repository.quotes_by_symbols(missing.clone()).await?;
            let store_map: HashMap<String, StockQuote> = store_rows
                .into_iter()
                .map(|q| (q.symbol.clone(), q))
                .collect();

            let mut to_fetch = Vec::new();
            for symbol in &missing {
                match store_map.get(symbol) {
                    Some(row) if self.quote_is_fresh(row.quoted_at, now) => {
                        self.quote_cache.insert(quote_key(symbol), row.clone());
                        resolved.insert(symbol.clone(), row.clone());
                    }
                    _ => to_fetch.push(symbol.clone()),
                }
            }

            if !to_fetch.is_empty() {
                if self.quota.can_proceed_at(now, to_fetch.len()) {
                    let fetched = self.provider.fetch_quotes(&to_fetch).await?;
                    self.quota.record_usage_at(now, to_fetch.len());

                    self.repository.upsert_quotes(fetched.clone()).await?;

                    for quote in fetched {
                        let quote: StockQuote = quote.into();
                        self.quote_cache
                            .insert(quote_key(&quote.symbol), quote.clone());
                        resolved.insert(quote.symbol.clone(), quote);
                    }
                } else {
                    tracing::debug!(
                        symbols = to_fetch.len(),
                        "Quota denied quote fetch, serving stale store data"
                    );
                    for symbol in &to_fetch {
                        if let Some(row) = store_map.get(symbol) {
                            resolved.insert(symbol.clone(), row.clone());
                        }
                    }
                }
            }
        }

        // Input order; unresolved symbols are silently omitted
        Ok(symbols
            .iter()
            .filter_map(|s| resolved.remove(s))
            .collect())
    }

    async fn get_history_at(
        &self,
        symbols: &[String],
        interval: Interval,
        now: DateTime<Utc>,
    ) -> Result<Vec<SymbolHistory>, StocksError> {
        let symbols = dedupe(symbols);
        let (start, end) = self.calendar.session_window_at(now);

        let mut resolved: HashMap<String, Vec<PricePoint>> = HashMap::new();
        let mut missing = Vec::new();

        for symbol in &symbols {
            match self.history_cache.get(&history_key(symbol, interval.as_str())) {
                Some(series) => {
                    resolved.insert(symbol.clone(), series);
                }
                None => missing.push(symbol.clone()),
            }
        }

        if !missing.is_empty() {
            let rows = self
                .repository
                .history_in_window(missing.clone(), interval.as_str().to_string(), start, end)
                .await?;

            let mut store_series: HashMap<String, Vec<PricePoint>> = HashMap::new();
            for row in rows {
                store_series
                    .entry(row.symbol.clone())
                    .or_default()
                    .push(row.into());
            }

            let mut to_fetch = Vec::new();
            for symbol in &missing {
                match store_series.get(symbol) {
                    Some(series)
                        if series
                            .last()
                            .is_some_and(|p| self.series_is_fresh(p.time, interval, now, start, end)) =>
                    {
                        self.history_cache
                            .insert(history_key(symbol, interval.as_str()), series.clone());
                        resolved.insert(symbol.clone(), series.clone());
                    }
                    _ => to_fetch.push(symbol.clone()),
                }
            }

            if !to_fetch.is_empty() {
                if self.quota.can_proceed_at(now, to_fetch.len()) {
                    let bars = bars_for_window(interval, start, end);
                    let fetched = self.provider.fetch_history(&to_fetch, interval, bars).await?;
                    self.quota.record_usage_at(now, to_fetch.len());

                    // Only the window is considered; everything else
                    // is discarded before the replace
                    let mut windowed: Vec<(String, Vec<PricePoint>)> = Vec::new();
                    let mut batches = Vec::new();
                    for (symbol, points) in fetched {
                        let points: Vec<PricePoint> = points
                            .into_iter()
                            .filter(|p| p.time >= start && p.time < end)
                            .collect();

                        batches.push((
                            symbol.clone(),
                            points
                                .iter()
                                .map(|p| NewStockPriceEntry {
                                    symbol: symbol.clone(),
                                    interval: interval.as_str().to_string(),
                                    entry_time: p.time,
                                    price: p.price,
                                })
                                .collect(),
                        ));
                        windowed.push((symbol, points));
                    }

                    // Delete-then-insert in one transaction; the cache
                    // is only touched once the store write committed
                    self.repository
                        .replace_history(interval.as_str().to_string(), start, end, batches)
                        .await?;

                    for (symbol, points) in windowed {
                        self.history_cache
                            .insert(history_key(&symbol, interval.as_str()), points.clone());
                        resolved.insert(symbol, points);
                    }
                } else {
                    tracing::debug!(
                        symbols = to_fetch.len(),
                        "Quota denied history fetch, serving stale store data"
                    );
                    for symbol in &to_fetch {
                        if let Some(series) = store_series.get(symbol) {
                            if !series.is_empty() {
                                resolved.insert(symbol.clone(), series.clone());
                            }
                        }
                    }
                }
            }
        }

        Ok(symbols
            .iter()
            .filter_map(|symbol| {
                resolved.remove(symbol).map(|history| SymbolHistory {
                    symbol: symbol.clone(),
                    history,
                })
            })
            .collect())
    }

    /// Closed session: fresh from 15 min before the close onward
    /// (inclusive). Open session: fresh under the quote lifespan.
    fn quote_is_fresh(&self, quoted_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.calendar.last_close_at(now) {
            None => now - quoted_at < self.policy.quote_lifespan,
            Some(close) => quoted_at >= close - self.policy.pre_close_buffer,
        }
    }

    /// Open session: fresh while the last sample is within the
    /// interval's data lifespan. Closed: fresh when at most
    /// `post_close_gap` of the window tail is unaccounted for. A
    /// session that has not started keeps whatever exists.
    fn series_is_fresh(
        &self,
        last_sample: DateTime<Utc>,
        interval: Interval,
        now: DateTime<Utc>,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> bool {
        match self.calendar.last_close_at(now) {
            None => now - last_sample <= interval.data_lifespan(),
            Some(_) => {
                // A window that has not opened yet has no new samples to
                // fetch; whatever is stored stands.
                if now < window_start {
                    return true;
                }
                last_sample >= window_end - self.policy.post_close_gap
            }
        }
    }
}

fn dedupe(symbols: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    symbols
        .iter()
        .filter(|s| seen.insert(s.as_str()))
        .cloned()
        .collect()
}

fn bars_for_window(interval: Interval, start: DateTime<Utc>, end: DateTime<Utc>) -> usize {
    let bar_seconds = interval.bar_width().num_seconds().max(1);
    ((end - start).num_seconds() / bar_seconds).max(1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{NewStockQuote, NewWatchlistSymbol, StockPriceEntry, WatchlistSymbol};
    use crate::stocks::quota::QuotaConfig;
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // --- mocks -----------------------------------------------------

    #[derive(Default)]
    struct MockRepository {
        quotes: Mutex<HashMap<String, StockQuote>>,
        history: Mutex<Vec<StockPriceEntry>>,
        upserted_quotes: AtomicUsize,
        quote_queries: AtomicUsize,
        fail_replace: bool,
    }

    #[async_trait::async_trait]
    impl StockRepository for MockRepository {
        async fn upsert_quotes(&self, quotes: Vec<NewStockQuote>) -> Result<usize, DatabaseError> {
            let count = quotes.len();
            self.upserted_quotes.fetch_add(count, Ordering::SeqCst);
            let mut store = self.quotes.lock();
            for quote in quotes {
                store.insert(quote.symbol.clone(), quote.into());
            }
            Ok(count)
        }

        async fn quotes_by_symbols(
            &self,
            symbols: Vec<String>,
        ) -> Result<Vec<StockQuote>, DatabaseError> {
            self.quote_queries.fetch_add(1, Ordering::SeqCst);
            let store = self.quotes.lock();
            Ok(symbols.iter().filter_map(|s| store.get(s).cloned()).collect())
        }

        async fn history_in_window(
            &self,
            symbols: Vec<String>,
            interval: String,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> Result<Vec<StockPriceEntry>, DatabaseError> {
            let rows = self.history.lock();
            Ok(rows
                .iter()
                .filter(|r| {
                    symbols.contains(&r.symbol)
                        && r.interval == interval
                        && r.entry_time >= from
                        && r.entry_time < to
                })
                .cloned()
                .collect())
        }

        async fn replace_history(
            &self,
            interval: String,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
            batches: Vec<(String, Vec<NewStockPriceEntry>)>,
        ) -> Result<usize, DatabaseError> {
            if self.fail_replace {
                // Whole-batch rollback: nothing is written
                return Err(DatabaseError::DieselError(
                    diesel::result::Error::RollbackTransaction,
                ));
            }
            let mut rows = self.history.lock();
            let mut inserted = 0;
            for (symbol, entries) in batches {
                rows.retain(|r| {
                    !(r.symbol == symbol
                        && r.interval == interval
                        && r.entry_time >= from
                        && r.entry_time < to)
                });
                for (i, entry) in entries.into_iter().enumerate() {
                    rows.push(StockPriceEntry {
                        id: i as i64,
                        symbol: entry.symbol,
                        interval: entry.interval,
                        entry_time: entry.entry_time,
                        price: entry.price,
                    });
                    inserted += 1;
                }
            }
            Ok(inserted)
        }

        async fn delete_history_before(
            &self,
            cutoff: DateTime<Utc>,
        ) -> Result<usize, DatabaseError> {
            let mut rows = self.history.lock();
            let before = rows.len();
            rows.retain(|r| r.entry_time >= cutoff);
            Ok(before - rows.len())
        }

        async fn watchlist(&self) -> Result<Vec<WatchlistSymbol>, DatabaseError> {
            Ok(Vec::new())
        }

        async fn add_watchlist_symbol(
            &self,
            entry: NewWatchlistSymbol,
        ) -> Result<WatchlistSymbol, DatabaseError> {
            Ok(WatchlistSymbol {
                symbol: entry.symbol,
                name: entry.name,
                created_at: Utc::now(),
            })
        }

        async fn remove_watchlist_symbol(&self, _symbol: String) -> Result<bool, DatabaseError> {
            Ok(true)
        }
    }

    struct MockProvider {
        calls: AtomicUsize,
        quotes: Vec<NewStockQuote>,
        history: Vec<(String, Vec<PricePoint>)>,
    }

    impl MockProvider {
        fn with_quotes(quotes: Vec<NewStockQuote>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                quotes,
                history: Vec::new(),
            }
        }

        fn with_history(history: Vec<(String, Vec<PricePoint>)>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                quotes: Vec::new(),
                history,
            }
        }
    }

    #[async_trait::async_trait]
    impl MarketDataProvider for MockProvider {
        async fn fetch_quotes(
            &self,
            symbols: &[String],
        ) -> Result<Vec<NewStockQuote>, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .quotes
                .iter()
                .filter(|q| symbols.contains(&q.symbol))
                .cloned()
                .collect())
        }

        async fn fetch_history(
            &self,
            symbols: &[String],
            _interval: Interval,
            _bars: usize,
        ) -> Result<Vec<(String, Vec<PricePoint>)>, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .history
                .iter()
                .filter(|(s, _)| symbols.contains(s))
                .cloned()
                .collect())
        }
    }

    // --- helpers ---------------------------------------------------

    fn et(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        chrono_tz::America::New_York
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn quote(symbol: &str, quoted_at: DateTime<Utc>) -> NewStockQuote {
        NewStockQuote {
            symbol: symbol.to_string(),
            name: format!("{symbol} Inc"),
            close: 100.0,
            change: 1.0,
            percent_change: 1.0,
            high: 101.0,
            low: 99.0,
            volume: 1000,
            quoted_at,
        }
    }

    fn service(
        repository: Arc<MockRepository>,
        provider: Arc<MockProvider>,
        quota: QuotaConfig,
    ) -> StocksService {
        StocksService::new(
            repository,
            provider,
            Arc::new(QuotaGuard::new(quota)),
            MarketCalendar::default(),
            StalenessPolicy::default(),
        )
    }

    fn denied_quota() -> QuotaConfig {
        QuotaConfig {
            daily_credit_limit: 0,
            ..QuotaConfig::default()
        }
    }

    fn syms(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    // Saturday noon ET: session closed, target session is Friday
    fn saturday() -> DateTime<Utc> {
        et(2024, 6, 8, 12, 0)
    }

    // --- quote tests -----------------------------------------------

    #[tokio::test]
    async fn end_to_end_fetch_populates_store_cache_and_result_order() {
        let now = saturday();
        let repo = Arc::new(MockRepository::default());
        let provider = Arc::new(MockProvider::with_quotes(vec![
            quote("MSFT", now),
            quote("AAPL", now),
        ]));
        let service = service(repo.clone(), provider.clone(), QuotaConfig::default());

        let result = service
            .get_quotes_at(&syms(&["AAPL", "MSFT"]), now)
            .await
            .unwrap();

        // One upstream call for both symbols, two upserts, two cache
        // entries, input order preserved
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(repo.upserted_quotes.load(Ordering::SeqCst), 2);
        assert_eq!(service.quote_cache.len(), 2);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].symbol, "AAPL");
        assert_eq!(result[1].symbol, "MSFT");
    }

    #[tokio::test]
    async fn quota_denial_falls_back_to_stale_store_rows_without_fetching() {
        let now = saturday();
        let repo = Arc::new(MockRepository::default());
        // Stale row: Wednesday, far before the Friday close buffer
        repo.upsert_quotes(vec![quote("AAPL", et(2024, 6, 5, 12, 0))])
            .await
            .unwrap();

        let provider = Arc::new(MockProvider::with_quotes(vec![quote("AAPL", now)]));
        let service = service(repo, provider.clone(), denied_quota());

        let result = service.get_quotes_at(&syms(&["AAPL"]), now).await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].quoted_at, et(2024, 6, 5, 12, 0));
    }

    #[tokio::test]
    async fn unresolvable_symbol_is_omitted_without_error() {
        let now = saturday();
        let repo = Arc::new(MockRepository::default());
        let provider = Arc::new(MockProvider::with_quotes(vec![quote("AAPL", now)]));
        let service = service(repo, provider, QuotaConfig::default());

        let result = service
            .get_quotes_at(&syms(&["AAPL", "NOPE"]), now)
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].symbol, "AAPL");
    }

    #[tokio::test]
    async fn quote_at_pre_close_buffer_boundary_is_fresh() {
        let now = saturday();
        let repo = Arc::new(MockRepository::default());
        // Exactly close - 15min on the session day: fresh (inclusive)
        repo.upsert_quotes(vec![quote("AAPL", et(2024, 6, 7, 15, 45))])
            .await
            .unwrap();

        let provider = Arc::new(MockProvider::with_quotes(vec![]));
        let service = service(repo, provider.clone(), QuotaConfig::default());

        let result = service.get_quotes_at(&syms(&["AAPL"]), now).await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result[0].quoted_at, et(2024, 6, 7, 15, 45));
    }

    #[tokio::test]
    async fn quote_one_minute_before_the_buffer_is_stale() {
        let now = saturday();
        let repo = Arc::new(MockRepository::default());
        repo.upsert_quotes(vec![quote("AAPL", et(2024, 6, 7, 15, 44))])
            .await
            .unwrap();

        let provider = Arc::new(MockProvider::with_quotes(vec![quote(
            "AAPL",
            et(2024, 6, 7, 16, 0),
        )]));
        let service = service(repo, provider.clone(), QuotaConfig::default());

        let result = service.get_quotes_at(&syms(&["AAPL"]), now).await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result[0].quoted_at, et(2024, 6, 7, 16, 0));
    }

    #[tokio::test]
    async fn open_session_quote_is_fresh_under_sixty_seconds_only() {
        // Tuesday 11:00 ET, session open
        let now = et(2024, 6, 11, 11, 0);
        let repo = Arc::new(MockRepository::default());
        repo.upsert_quotes(vec![quote("AAPL", now - Duration::seconds(30))])
            .await
            .unwrap();

        let provider = Arc::new(MockProvider::with_quotes(vec![]));
        let service = service(repo.clone(), provider.clone(), QuotaConfig::default());

        let result = service.get_quotes_at(&syms(&["AAPL"]), now).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.len(), 1);

        // Two minutes old during the session: stale, triggers a fetch
        repo.upsert_quotes(vec![quote("MSFT", now - Duration::seconds(120))])
            .await
            .unwrap();
        let _ = service.get_quotes_at(&syms(&["MSFT"]), now).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn memory_cache_hit_skips_store_and_provider() {
        let now = saturday();
        let repo = Arc::new(MockRepository::default());
        let provider = Arc::new(MockProvider::with_quotes(vec![quote("AAPL", now)]));
        let service = service(repo.clone(), provider.clone(), QuotaConfig::default());

        let _ = service.get_quotes_at(&syms(&["AAPL"]), now).await.unwrap();
        let queries_after_first = repo.quote_queries.load(Ordering::SeqCst);

        let result = service.get_quotes_at(&syms(&["AAPL"]), now).await.unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(repo.quote_queries.load(Ordering::SeqCst), queries_after_first);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    // --- history tests ---------------------------------------------

    fn friday_series(last_minute_before_close: i64) -> Vec<PricePoint> {
        // Friday 2024-06-07 session, one point per listed minute
        let end = et(2024, 6, 7, 16, 0);
        (0..3)
            .rev()
            .map(|i| PricePoint {
                time: end - Duration::minutes(last_minute_before_close + i),
                price: 100.0 + i as f64,
            })
            .collect()
    }

    async fn seed_history(repo: &MockRepository, symbol: &str, series: &[PricePoint]) {
        let mut rows = repo.history.lock();
        for (i, point) in series.iter().enumerate() {
            rows.push(StockPriceEntry {
                id: i as i64,
                symbol: symbol.to_string(),
                interval: "1min".to_string(),
                entry_time: point.time,
                price: point.price,
            });
        }
    }

    #[tokio::test]
    async fn complete_series_after_close_is_served_from_store() {
        let now = saturday();
        let repo = Arc::new(MockRepository::default());
        // Last sample 5 minutes before close: inside the 10min gap
        seed_history(&repo, "AAPL", &friday_series(5)).await;

        let provider = Arc::new(MockProvider::with_history(vec![]));
        let service = service(repo, provider.clone(), QuotaConfig::default());

        let result = service
            .get_history_at(&syms(&["AAPL"]), Interval::OneMinute, now)
            .await
            .unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].history.len(), 3);
    }

    #[tokio::test]
    async fn gappy_series_after_close_is_refetched_and_replaced() {
        let now = saturday();
        let repo = Arc::new(MockRepository::default());
        // Last sample 30 minutes before close: tail is unaccounted for
        seed_history(&repo, "AAPL", &friday_series(30)).await;

        let fresh = friday_series(1);
        let provider = Arc::new(MockProvider::with_history(vec![(
            "AAPL".to_string(),
            fresh.clone(),
        )]));
        let service = service(repo.clone(), provider.clone(), QuotaConfig::default());

        let result = service
            .get_history_at(&syms(&["AAPL"]), Interval::OneMinute, now)
            .await
            .unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result[0].history, fresh);
        // Store was replaced, not merged
        assert_eq!(repo.history.lock().len(), 3);
    }

    #[test]
    fn window_that_has_not_opened_keeps_stored_series() {
        let now = saturday();
        let repo = Arc::new(MockRepository::default());
        let provider = Arc::new(MockProvider::with_history(vec![]));
        let service = service(repo, provider, QuotaConfig::default());

        // A day-old last sample fails the closed-session tail rule for
        // any past window, but a window lying ahead of now stands as-is
        let last_sample = now - chrono::Duration::days(1);
        let ahead_start = now + chrono::Duration::hours(2);
        assert!(service.series_is_fresh(
            last_sample,
            Interval::OneMinute,
            now,
            ahead_start,
            ahead_start + chrono::Duration::hours(6),
        ));
        assert!(!service.series_is_fresh(
            last_sample,
            Interval::OneMinute,
            now,
            now - chrono::Duration::hours(8),
            now - chrono::Duration::hours(1),
        ));
    }

    #[tokio::test]
    async fn history_quota_denial_serves_stale_store_series() {
        let now = saturday();
        let repo = Arc::new(MockRepository::default());
        seed_history(&repo, "AAPL", &friday_series(30)).await;

        let provider = Arc::new(MockProvider::with_history(vec![]));
        let service = service(repo, provider.clone(), denied_quota());

        let result = service
            .get_history_at(&syms(&["AAPL"]), Interval::OneMinute, now)
            .await
            .unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].history.len(), 3);
    }

    #[tokio::test]
    async fn failed_replace_propagates_and_leaves_cache_untouched() {
        let now = saturday();
        let repo = Arc::new(MockRepository {
            fail_replace: true,
            ..MockRepository::default()
        });

        let provider = Arc::new(MockProvider::with_history(vec![(
            "AAPL".to_string(),
            friday_series(1),
        )]));
        let service = service(repo, provider, QuotaConfig::default());

        let result = service
            .get_history_at(&syms(&["AAPL"]), Interval::OneMinute, now)
            .await;

        assert!(matches!(result, Err(StocksError::Database(_))));
        assert_eq!(service.history_cache.len(), 0);
    }

    #[tokio::test]
    async fn out_of_window_samples_are_discarded_before_storage() {
        let now = saturday();
        let repo = Arc::new(MockRepository::default());

        let mut points = friday_series(1);
        // Thursday sample, outside the Friday window
        points.insert(
            0,
            PricePoint {
                time: et(2024, 6, 6, 15, 0),
                price: 1.0,
            },
        );
        let provider = Arc::new(MockProvider::with_history(vec![("AAPL".to_string(), points)]));
        let service = service(repo.clone(), provider, QuotaConfig::default());

        let result = service
            .get_history_at(&syms(&["AAPL"]), Interval::OneMinute, now)
            .await
            .unwrap();

        assert_eq!(result[0].history.len(), 3);
        assert_eq!(repo.history.lock().len(), 3);
    }

    #[tokio::test]
    async fn prune_removes_rows_past_retention() {
        let repo = Arc::new(MockRepository::default());
        let old = Utc::now() - Duration::hours(100);
        let recent = Utc::now() - Duration::hours(1);
        seed_history(
            &repo,
            "AAPL",
            &[
                PricePoint { time: old, price: 1.0 },
                PricePoint { time: recent, price: 2.0 },
            ],
        )
        .await;

        let provider = Arc::new(MockProvider::with_history(vec![]));
        let service = service(repo.clone(), provider, QuotaConfig::default());

        let deleted = service.prune_history().await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(repo.history.lock().len(), 1);
    }
}
