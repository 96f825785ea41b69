use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

/// Market session boundaries in the exchange's local time zone
///
/// Pure functions of an injected wall-clock instant; no I/O, no
/// mutation. Defaults to NYSE hours: 09:30-16:00 ET, Mon-Fri.
#[derive(Debug, Clone, Copy)]
pub struct MarketCalendar {
    tz: Tz,
    open: NaiveTime,
    close: NaiveTime,
}

impl Default for MarketCalendar {
    fn default() -> Self {
        Self {
            tz: chrono_tz::America::New_York,
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default(),
            close: NaiveTime::from_hms_opt(16, 0, 0).unwrap_or_default(),
        }
    }
}

impl MarketCalendar {
    pub fn new(tz: Tz, open: NaiveTime, close: NaiveTime) -> Self {
        Self { tz, open, close }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Whether the session is open right now
    pub fn is_open(&self) -> bool {
        self.is_open_at(Utc::now())
    }

    /// Timestamp of the most recent session close; None means the
    /// session is open right now
    pub fn last_close(&self) -> Option<DateTime<Utc>> {
        self.last_close_at(Utc::now())
    }

    /// The [open, close) window of the target session
    pub fn session_window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        self.session_window_at(Utc::now())
    }

    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.tz);
        is_weekday(local.weekday()) && local.time() >= self.open && local.time() < self.close
    }

    pub fn last_close_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = now.with_timezone(&self.tz);
        let today = local.date_naive();

        let close_on = |date: NaiveDate| self.at_local(date, self.close);

        if !is_weekday(local.weekday()) {
            // Weekend: step back to Friday's close
            let days_back = i64::from(local.weekday().num_days_from_monday()) - 4;
            return Some(close_on(today - Duration::days(days_back)));
        }

        if local.time() < self.open {
            // Before today's open: previous trading day's close,
            // crossing the weekend on Mondays
            let days_back = if local.weekday() == Weekday::Mon { 3 } else { 1 };
            return Some(close_on(today - Duration::days(days_back)));
        }

        if local.time() >= self.close {
            return Some(close_on(today));
        }

        None // Session is open right now
    }

    /// Target session window: the date comes from `last_close_at` when
    /// the session is closed, today otherwise
    pub fn session_window_at(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let date = match self.last_close_at(now) {
            Some(close) => close.with_timezone(&self.tz).date_naive(),
            None => now.with_timezone(&self.tz).date_naive(),
        };

        (self.at_local(date, self.open), self.at_local(date, self.close))
    }

    fn at_local(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        // Market open/close never lands inside a DST transition, so
        // earliest() only ever misses for degenerate configurations
        self.tz
            .from_local_datetime(&date.and_time(time))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&date.and_time(time)))
    }
}

fn is_weekday(day: Weekday) -> bool {
    day.number_from_monday() <= 5
}

#[cfg(test)]
mod tests {
    use super::*;

    fn et(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        chrono_tz::America::New_York
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn friday_evening_returns_same_friday_close() {
        let calendar = MarketCalendar::default();
        // Friday 2024-06-07 17:00 ET
        let now = et(2024, 6, 7, 17, 0);
        assert_eq!(calendar.last_close_at(now), Some(et(2024, 6, 7, 16, 0)));
    }

    #[test]
    fn saturday_returns_friday_close() {
        let calendar = MarketCalendar::default();
        let now = et(2024, 6, 8, 12, 0);
        assert_eq!(calendar.last_close_at(now), Some(et(2024, 6, 7, 16, 0)));
    }

    #[test]
    fn sunday_returns_friday_close() {
        let calendar = MarketCalendar::default();
        let now = et(2024, 6, 9, 12, 0);
        assert_eq!(calendar.last_close_at(now), Some(et(2024, 6, 7, 16, 0)));
    }

    #[test]
    fn monday_morning_returns_prior_friday_close() {
        let calendar = MarketCalendar::default();
        // Monday 2024-06-10 08:00 ET, before the open
        let now = et(2024, 6, 10, 8, 0);
        assert_eq!(calendar.last_close_at(now), Some(et(2024, 6, 7, 16, 0)));
    }

    #[test]
    fn open_session_returns_none() {
        let calendar = MarketCalendar::default();
        // Tuesday 2024-06-11 11:00 ET
        let now = et(2024, 6, 11, 11, 0);
        assert_eq!(calendar.last_close_at(now), None);
        assert!(calendar.is_open_at(now));
    }

    #[test]
    fn tuesday_before_open_returns_monday_close() {
        let calendar = MarketCalendar::default();
        let now = et(2024, 6, 11, 8, 0);
        assert_eq!(calendar.last_close_at(now), Some(et(2024, 6, 10, 16, 0)));
    }

    #[test]
    fn window_targets_last_session_when_closed() {
        let calendar = MarketCalendar::default();
        // Saturday: the window is Friday's session
        let now = et(2024, 6, 8, 12, 0);
        let (start, end) = calendar.session_window_at(now);
        assert_eq!(start, et(2024, 6, 7, 9, 30));
        assert_eq!(end, et(2024, 6, 7, 16, 0));
    }

    #[test]
    fn window_targets_today_when_open() {
        let calendar = MarketCalendar::default();
        let now = et(2024, 6, 11, 11, 0);
        let (start, end) = calendar.session_window_at(now);
        assert_eq!(start, et(2024, 6, 11, 9, 30));
        assert_eq!(end, et(2024, 6, 11, 16, 0));
    }
}
