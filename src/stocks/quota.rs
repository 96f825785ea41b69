use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Budget configuration for the upstream market-data provider
///
/// One "token" is one requested symbol; a single request may consume
/// many tokens. These are provider-plan constants, fixed at startup.
#[derive(Debug, Clone, Copy)]
pub struct QuotaConfig {
    /// Daily credit ceiling
    pub daily_credit_limit: u32,
    /// Max HTTP requests per sliding minute
    pub max_requests_per_minute: usize,
    /// Max tokens (symbols) per sliding minute
    pub max_tokens_per_minute: usize,
    /// Sliding window length
    pub window: Duration,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_credit_limit: 800,
            max_requests_per_minute: 8,
            max_tokens_per_minute: 8,
            window: Duration::seconds(60),
        }
    }
}

#[derive(Debug)]
struct QuotaState {
    credits_used_today: u32,
    last_reset_date: NaiveDate,
    request_timestamps: VecDeque<DateTime<Utc>>,
    token_timestamps: VecDeque<DateTime<Utc>>,
}

/// Admission gate for upstream fetches
///
/// `can_proceed` is a pure check (no counters change); `record_usage`
/// must be called exactly once per successful upstream call, after the
/// call - failed calls are not charged.
pub struct QuotaGuard {
    config: QuotaConfig,
    state: Mutex<QuotaState>,
}

impl QuotaGuard {
    pub fn new(config: QuotaConfig) -> Self {
        Self {
            config,
            state: Mutex::new(QuotaState {
                credits_used_today: 0,
                last_reset_date: Utc::now().date_naive(),
                request_timestamps: VecDeque::new(),
                token_timestamps: VecDeque::new(),
            }),
        }
    }

    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    /// Whether a batch fetch of `symbol_count` symbols may proceed
    pub fn can_proceed(&self, symbol_count: usize) -> bool {
        self.can_proceed_at(Utc::now(), symbol_count)
    }

    /// Charge a completed batch fetch of `symbol_count` symbols
    pub fn record_usage(&self, symbol_count: usize) {
        self.record_usage_at(Utc::now(), symbol_count);
    }

    /// Credits consumed so far today (after a lazy date rollover)
    pub fn credits_used_today(&self) -> u32 {
        let mut state = self.state.lock();
        Self::reset_if_new_day(&mut state, Utc::now());
        state.credits_used_today
    }

    pub(crate) fn can_proceed_at(&self, now: DateTime<Utc>, symbol_count: usize) -> bool {
        let mut state = self.state.lock();

        Self::reset_if_new_day(&mut state, now);

        // Daily credit gate
        if state.credits_used_today + symbol_count as u32 > self.config.daily_credit_limit {
            return false;
        }

        let horizon = now - self.config.window;
        Self::prune_window(&mut state.request_timestamps, horizon);
        Self::prune_window(&mut state.token_timestamps, horizon);

        // Per-minute request gate
        if state.request_timestamps.len() + 1 > self.config.max_requests_per_minute {
            return false;
        }

        // Per-minute token gate - no partial admission for a batch
        if state.token_timestamps.len() + symbol_count > self.config.max_tokens_per_minute {
            return false;
        }

        true
    }

    pub(crate) fn record_usage_at(&self, now: DateTime<Utc>, symbol_count: usize) {
        let mut state = self.state.lock();

        Self::reset_if_new_day(&mut state, now);

        state.request_timestamps.push_back(now);
        for _ in 0..symbol_count {
            state.token_timestamps.push_back(now);
        }
        state.credits_used_today += symbol_count as u32;
    }

    fn reset_if_new_day(state: &mut QuotaState, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today > state.last_reset_date {
            state.credits_used_today = 0;
            state.last_reset_date = today;
        }
    }

    fn prune_window(window: &mut VecDeque<DateTime<Utc>>, horizon: DateTime<Utc>) {
        while window.front().is_some_and(|t| *t <= horizon) {
            window.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn guard() -> QuotaGuard {
        QuotaGuard::new(QuotaConfig::default())
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, h, m, s).unwrap()
    }

    #[test]
    fn can_proceed_is_pure() {
        let guard = guard();
        let now = at(12, 0, 0);

        for _ in 0..10 {
            assert!(guard.can_proceed_at(now, 2));
        }
        assert_eq!(guard.state.lock().credits_used_today, 0);
        assert!(guard.state.lock().request_timestamps.is_empty());
    }

    #[test]
    fn request_window_denies_ninth_and_readmits_after_sixty_seconds() {
        let guard = guard();
        let start = at(12, 0, 0);

        for i in 0..8 {
            let now = start + Duration::seconds(i);
            assert!(guard.can_proceed_at(now, 1));
            guard.record_usage_at(now, 1);
        }

        // 8 requests inside the window: a 9th is denied
        let now = start + Duration::seconds(30);
        assert!(!guard.can_proceed_at(now, 1));

        // Past 60s from the oldest entries the same check admits again
        let later = start + Duration::seconds(61);
        assert!(guard.can_proceed_at(later, 1));
    }

    #[test]
    fn token_window_denies_oversized_batch_without_partial_admission() {
        let guard = guard();
        let now = at(12, 0, 0);

        guard.record_usage_at(now, 6);

        // 6 tokens used, 8/min ceiling: a 3-symbol batch is denied whole
        assert!(!guard.can_proceed_at(now + Duration::seconds(1), 3));
        assert!(guard.can_proceed_at(now + Duration::seconds(1), 2));
    }

    #[test]
    fn daily_ceiling_fails_closed() {
        let guard = QuotaGuard::new(QuotaConfig {
            daily_credit_limit: 10,
            max_requests_per_minute: 100,
            max_tokens_per_minute: 100,
            ..QuotaConfig::default()
        });
        let mut now = at(9, 0, 0);

        for _ in 0..5 {
            assert!(guard.can_proceed_at(now, 2));
            guard.record_usage_at(now, 2);
            now += Duration::minutes(2);
        }

        assert!(!guard.can_proceed_at(now, 1));
    }

    #[test]
    fn daily_counter_resets_exactly_once_on_date_advance() {
        let guard = guard();
        let monday = at(23, 0, 0);

        guard.record_usage_at(monday, 5);
        assert_eq!(guard.state.lock().credits_used_today, 5);

        let tuesday = monday + Duration::hours(2);
        assert!(guard.can_proceed_at(tuesday, 1));
        assert_eq!(guard.state.lock().credits_used_today, 0);

        // Further checks on the same day do not reset again
        guard.record_usage_at(tuesday, 3);
        assert!(guard.can_proceed_at(tuesday + Duration::hours(1), 1));
        assert_eq!(guard.state.lock().credits_used_today, 3);
    }
}
