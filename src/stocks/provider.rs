use crate::database::models::{NewStockQuote, PricePoint};
use crate::stocks::Interval;
use crate::upstream::{self, field_f64, field_str, UpstreamError};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::Value;

const SERVICE: &str = "Twelve Data";

/// Upstream quote/history provider contract
///
/// A single call covers N symbols; implementations normalize the
/// provider's single-symbol and multi-symbol response shapes into one
/// uniform list before anything else sees the payload.
#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Fetch point-in-time quotes for a symbol batch
    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<NewStockQuote>, UpstreamError>;

    /// Fetch intraday series for a symbol batch, oldest sample first
    async fn fetch_history(
        &self,
        symbols: &[String],
        interval: Interval,
        bars: usize,
    ) -> Result<Vec<(String, Vec<PricePoint>)>, UpstreamError>;
}

/// Twelve Data REST client
pub struct TwelveDataProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl TwelveDataProvider {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self {
            client,
            api_key,
            base_url: "https://api.twelvedata.com".to_string(),
        }
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for TwelveDataProvider {
    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<NewStockQuote>, UpstreamError> {
        let url = format!(
            "{}/quote?symbol={}&apikey={}",
            self.base_url,
            symbols.join(","),
            self.api_key
        );

        let payload = upstream::get_json(&self.client, SERVICE, &url).await?;
        parse_quote_payload(&payload, Utc::now())
    }

    async fn fetch_history(
        &self,
        symbols: &[String],
        interval: Interval,
        bars: usize,
    ) -> Result<Vec<(String, Vec<PricePoint>)>, UpstreamError> {
        let url = format!(
            "{}/time_series?symbol={}&interval={}&outputsize={}&apikey={}",
            self.base_url,
            symbols.join(","),
            interval.as_str(),
            bars,
            self.api_key
        );

        let payload = upstream::get_json(&self.client, SERVICE, &url).await?;
        parse_history_payload(&payload)
    }
}

/// Reject payloads where the provider tunnels an error through HTTP 200
fn check_embedded_error(payload: &Value) -> Result<(), UpstreamError> {
    if let Some(code) = payload.get("code").and_then(Value::as_i64) {
        if code != 200 {
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("no message")
                .to_string();
            return Err(UpstreamError::Status {
                service: SERVICE,
                status: code as u16,
                detail: message,
            });
        }
    }
    Ok(())
}

/// Normalize the quote payload into one list
///
/// A single requested symbol comes back as a bare object with "name"
/// at the root; multiple symbols come back keyed by symbol. This is an
/// upstream quirk to preserve, not redesign.
pub(crate) fn parse_quote_payload(
    payload: &Value,
    quoted_at: DateTime<Utc>,
) -> Result<Vec<NewStockQuote>, UpstreamError> {
    check_embedded_error(payload)?;

    if payload.get("name").is_some() {
        return Ok(vec![parse_one_quote(
            field_str(SERVICE, payload, "symbol")?,
            payload,
            quoted_at,
        )?]);
    }

    let map = payload.as_object().ok_or_else(|| {
        UpstreamError::shape(SERVICE, "quote payload is neither an object nor a quote")
    })?;

    let mut quotes = Vec::with_capacity(map.len());
    for (symbol, details) in map {
        quotes.push(parse_one_quote(symbol, details, quoted_at)?);
    }
    Ok(quotes)
}

fn parse_one_quote(
    symbol: &str,
    details: &Value,
    quoted_at: DateTime<Utc>,
) -> Result<NewStockQuote, UpstreamError> {
    check_embedded_error(details)?;

    // Volume is absent for some instruments; the source contract
    // defaults it to zero. Price-shaping fields are never defaulted.
    let volume = match details.get("volume") {
        None | Some(Value::Null) => 0,
        Some(_) => field_f64(SERVICE, details, "volume")? as i64,
    };

    Ok(NewStockQuote {
        symbol: symbol.to_string(),
        name: field_str(SERVICE, details, "name")?.to_string(),
        close: round2(field_f64(SERVICE, details, "close")?),
        change: round2(field_f64(SERVICE, details, "change")?),
        percent_change: round2(field_f64(SERVICE, details, "percent_change")?),
        high: round2(field_f64(SERVICE, details, "high")?),
        low: round2(field_f64(SERVICE, details, "low")?),
        volume,
        quoted_at,
    })
}

/// Normalize the time-series payload into one list per symbol
pub(crate) fn parse_history_payload(
    payload: &Value,
) -> Result<Vec<(String, Vec<PricePoint>)>, UpstreamError> {
    check_embedded_error(payload)?;

    if payload.get("values").is_some() {
        let meta = payload
            .get("meta")
            .ok_or_else(|| UpstreamError::shape(SERVICE, "missing meta"))?;
        return Ok(vec![parse_one_series(meta, payload)?]);
    }

    let map = payload.as_object().ok_or_else(|| {
        UpstreamError::shape(SERVICE, "history payload is neither an object nor a series")
    })?;

    let mut series = Vec::with_capacity(map.len());
    for details in map.values() {
        let meta = details
            .get("meta")
            .ok_or_else(|| UpstreamError::shape(SERVICE, "missing meta"))?;
        series.push(parse_one_series(meta, details)?);
    }
    Ok(series)
}

fn parse_one_series(
    meta: &Value,
    details: &Value,
) -> Result<(String, Vec<PricePoint>), UpstreamError> {
    check_embedded_error(details)?;

    let symbol = field_str(SERVICE, meta, "symbol")?.to_string();
    let tz: Tz = field_str(SERVICE, meta, "exchange_timezone")?
        .parse()
        .map_err(|_| UpstreamError::shape(SERVICE, "unknown exchange_timezone"))?;

    let values = details
        .get("values")
        .and_then(Value::as_array)
        .ok_or_else(|| UpstreamError::shape(SERVICE, "missing values array"))?;

    // Provider serves newest-first; reverse to oldest-first
    let mut points = Vec::with_capacity(values.len());
    for item in values.iter().rev() {
        let raw = field_str(SERVICE, item, "datetime")?;
        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .map_err(|_| UpstreamError::shape(SERVICE, format!("bad datetime '{raw}'")))?;
        let time = tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| UpstreamError::shape(SERVICE, format!("ambiguous datetime '{raw}'")))?;

        points.push(PricePoint {
            time,
            price: field_f64(SERVICE, item, "close")?,
        });
    }

    Ok((symbol, points))
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_symbol_quote_shape_normalizes_to_one_entry() {
        let payload = json!({
            "symbol": "AAPL",
            "name": "Apple Inc",
            "close": "195.123",
            "change": "-1.005",
            "percent_change": "-0.51",
            "high": "197.20",
            "low": "194.08",
            "volume": "51234567"
        });

        let quotes = parse_quote_payload(&payload, Utc::now()).unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].symbol, "AAPL");
        assert_eq!(quotes[0].close, 195.12);
        assert_eq!(quotes[0].change, -1.0);
        assert_eq!(quotes[0].volume, 51234567);
    }

    #[test]
    fn multi_symbol_quote_shape_normalizes_per_symbol() {
        let payload = json!({
            "AAPL": {
                "name": "Apple Inc",
                "close": "195.12", "change": "1.0", "percent_change": "0.5",
                "high": "196.0", "low": "194.0", "volume": "100"
            },
            "MSFT": {
                "name": "Microsoft Corp",
                "close": "420.00", "change": "2.0", "percent_change": "0.4",
                "high": "421.0", "low": "418.0", "volume": "200"
            }
        });

        let mut quotes = parse_quote_payload(&payload, Utc::now()).unwrap();
        quotes.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].symbol, "AAPL");
        assert_eq!(quotes[1].symbol, "MSFT");
        assert_eq!(quotes[1].name, "Microsoft Corp");
    }

    #[test]
    fn embedded_error_code_maps_to_status_error() {
        let payload = json!({"code": 429, "message": "API credits exhausted"});
        let err = parse_quote_payload(&payload, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            UpstreamError::Status { status: 429, .. }
        ));
    }

    #[test]
    fn missing_price_field_is_a_shape_error_not_a_default() {
        let payload = json!({
            "symbol": "AAPL",
            "name": "Apple Inc",
            "change": "1.0", "percent_change": "0.5",
            "high": "196.0", "low": "194.0", "volume": "100"
        });
        assert!(matches!(
            parse_quote_payload(&payload, Utc::now()),
            Err(UpstreamError::Shape { .. })
        ));
    }

    #[test]
    fn missing_volume_defaults_to_zero_per_source_contract() {
        let payload = json!({
            "symbol": "BRK.A",
            "name": "Berkshire Hathaway",
            "close": "600000.0", "change": "1.0", "percent_change": "0.0",
            "high": "600100.0", "low": "599000.0"
        });
        let quotes = parse_quote_payload(&payload, Utc::now()).unwrap();
        assert_eq!(quotes[0].volume, 0);
    }

    #[test]
    fn history_series_is_reversed_to_oldest_first_in_utc() {
        let payload = json!({
            "meta": {"symbol": "AAPL", "exchange_timezone": "America/New_York"},
            "values": [
                {"datetime": "2024-06-07 09:32:00", "close": "195.30"},
                {"datetime": "2024-06-07 09:31:00", "close": "195.20"},
                {"datetime": "2024-06-07 09:30:00", "close": "195.10"}
            ]
        });

        let series = parse_history_payload(&payload).unwrap();
        assert_eq!(series.len(), 1);
        let (symbol, points) = &series[0];
        assert_eq!(symbol, "AAPL");
        assert_eq!(points.len(), 3);
        assert!(points[0].time < points[1].time && points[1].time < points[2].time);
        assert_eq!(points[0].price, 195.10);
        // 09:30 ET is 13:30 UTC in June (EDT)
        assert_eq!(
            points[0].time,
            Utc.with_ymd_and_hms(2024, 6, 7, 13, 30, 0).unwrap()
        );
    }

    #[test]
    fn multi_symbol_history_shape_normalizes_per_symbol() {
        let payload = json!({
            "AAPL": {
                "meta": {"symbol": "AAPL", "exchange_timezone": "America/New_York"},
                "values": [{"datetime": "2024-06-07 09:30:00", "close": "195.10"}]
            },
            "MSFT": {
                "meta": {"symbol": "MSFT", "exchange_timezone": "America/New_York"},
                "values": [{"datetime": "2024-06-07 09:30:00", "close": "420.00"}]
            }
        });

        let mut series = parse_history_payload(&payload).unwrap();
        series.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].0, "AAPL");
        assert_eq!(series[1].0, "MSFT");
    }
}
