use crate::database::models::{ElectricityPrice, NewElectricityPrice};
use crate::database::repositories::ElectricityRepository;
use crate::database::DatabaseError;
use crate::upstream::{self, UpstreamError};
use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

const SERVICE: &str = "Porssisahko";
const BASE_URL: &str = "https://api.porssisahko.net/v1";

/// Local market time zone; day boundaries for spot prices follow it
const MARKET_TZ: Tz = chrono_tz::Europe::Helsinki;

#[derive(Debug, Error)]
pub enum ElectricityError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Spot electricity prices from the Finnish day-ahead market
///
/// The upstream publishes the next day's hourly prices every afternoon;
/// the store keeps one row per hour, keyed by the hour's start.
pub struct ElectricityService {
    repository: Arc<dyn ElectricityRepository>,
    client: reqwest::Client,
    base_url: String,
}

impl ElectricityService {
    pub fn new(repository: Arc<dyn ElectricityRepository>, client: reqwest::Client) -> Self {
        Self {
            repository,
            client,
            base_url: BASE_URL.to_string(),
        }
    }

    /// Fetch the published price sheet and upsert every hour of it
    pub async fn fetch_and_store(&self) -> Result<usize, ElectricityError> {
        let url = format!("{}/latest-prices.json", self.base_url);
        let payload = upstream::get_json(&self.client, SERVICE, &url).await?;

        let prices = parse_prices(&payload)?;
        let stored = self.repository.upsert_prices(prices).await?;
        info!(rows = stored, "Stored electricity prices");
        Ok(stored)
    }

    /// Whether a fetch is still needed: true until the stored sheet
    /// covers the whole of tomorrow
    pub async fn is_fetch_needed(&self) -> Result<bool, ElectricityError> {
        self.is_fetch_needed_at(Utc::now()).await
    }

    /// Hourly prices overlapping the given span, oldest first
    pub async fn prices_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ElectricityPrice>, ElectricityError> {
        Ok(self.repository.prices_between(from, to).await?)
    }

    /// Prices for today and tomorrow in the market's local time
    pub async fn upcoming_prices(&self) -> Result<Vec<ElectricityPrice>, ElectricityError> {
        let now = Utc::now();
        let from = start_of_local_day(now, 0);
        let to = start_of_local_day(now, 2);
        self.prices_between(from, to).await
    }

    async fn is_fetch_needed_at(&self, now: DateTime<Utc>) -> Result<bool, ElectricityError> {
        match self.repository.latest_end_time().await? {
            Some(latest_end) => Ok(!covers_through_tomorrow(latest_end, now)),
            None => Ok(true),
        }
    }
}

/// Fresh once the latest stored hour reaches the end of tomorrow in
/// the market's local time
pub(crate) fn covers_through_tomorrow(latest_end: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    latest_end >= start_of_local_day(now, 2)
}

fn start_of_local_day(now: DateTime<Utc>, days_ahead: i64) -> DateTime<Utc> {
    let date = now.with_timezone(&MARKET_TZ).date_naive() + Duration::days(days_ahead);
    // Finnish DST transitions happen at 03:00/04:00, never at midnight
    MARKET_TZ
        .from_local_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default()))
}

pub(crate) fn parse_prices(payload: &Value) -> Result<Vec<NewElectricityPrice>, UpstreamError> {
    let entries = payload
        .get("prices")
        .and_then(Value::as_array)
        .ok_or_else(|| UpstreamError::shape(SERVICE, "missing prices array"))?;

    let mut prices = Vec::with_capacity(entries.len());
    for entry in entries {
        prices.push(NewElectricityPrice {
            start_time: parse_instant(entry, "startDate")?,
            end_time: parse_instant(entry, "endDate")?,
            price: upstream::field_f64(SERVICE, entry, "price")?,
        });
    }
    Ok(prices)
}

fn parse_instant(entry: &Value, key: &str) -> Result<DateTime<Utc>, UpstreamError> {
    let raw = upstream::field_str(SERVICE, entry, key)?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| UpstreamError::shape(SERVICE, format!("bad {key} '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_the_published_price_sheet() {
        let payload = json!({
            "prices": [
                {
                    "price": 2.45,
                    "startDate": "2024-06-07T21:00:00.000Z",
                    "endDate": "2024-06-07T22:00:00.000Z"
                },
                {
                    "price": -0.31,
                    "startDate": "2024-06-07T22:00:00.000Z",
                    "endDate": "2024-06-07T23:00:00.000Z"
                }
            ]
        });

        let prices = parse_prices(&payload).unwrap();
        assert_eq!(prices.len(), 2);
        assert_eq!(prices[0].price, 2.45);
        assert_eq!(
            prices[0].start_time,
            Utc.with_ymd_and_hms(2024, 6, 7, 21, 0, 0).unwrap()
        );
        // Negative spot prices are valid and preserved
        assert_eq!(prices[1].price, -0.31);
    }

    #[test]
    fn malformed_timestamp_is_a_shape_error() {
        let payload = json!({
            "prices": [
                {"price": 1.0, "startDate": "yesterday", "endDate": "2024-06-07T22:00:00.000Z"}
            ]
        });
        assert!(matches!(
            parse_prices(&payload),
            Err(UpstreamError::Shape { .. })
        ));
    }

    #[test]
    fn fresh_once_the_sheet_reaches_the_end_of_tomorrow() {
        // 2024-06-07 15:00 Helsinki (12:00 UTC, EEST)
        let now = Utc.with_ymd_and_hms(2024, 6, 7, 12, 0, 0).unwrap();

        // End of tomorrow = 2024-06-09 00:00 Helsinki = 06-08 21:00 UTC
        let end_of_tomorrow = Utc.with_ymd_and_hms(2024, 6, 8, 21, 0, 0).unwrap();

        assert!(covers_through_tomorrow(end_of_tomorrow, now));
        assert!(!covers_through_tomorrow(
            end_of_tomorrow - Duration::hours(1),
            now
        ));
    }
}
