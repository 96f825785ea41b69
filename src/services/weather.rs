use crate::upstream::{self, UpstreamError};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};
use utoipa::ToSchema;

const SERVICE: &str = "Open-Meteo";
const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
const GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("Settings store error: {0}")]
    Settings(#[from] std::io::Error),
}

/// The dashboard's configured weather location
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            name: "Helsinki".to_string(),
            latitude: 60.1699,
            longitude: 24.9384,
        }
    }
}

/// Current conditions at the configured location
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CurrentWeather {
    pub temperature_c: f64,
    pub humidity_percent: f64,
    /// WMO weather interpretation code
    pub weather_code: i32,
    pub wind_speed_ms: f64,
    pub fetched_at: DateTime<Utc>,
}

/// Weather proxy with a file-persisted location setting
///
/// The location survives restarts via a small JSON settings file; the
/// weather itself is always fetched live, the upstream is uncapped and
/// fast enough that caching buys nothing here.
pub struct WeatherService {
    client: reqwest::Client,
    settings_path: PathBuf,
    location: RwLock<Location>,
}

impl WeatherService {
    pub fn new(client: reqwest::Client, settings_path: PathBuf) -> Self {
        let location = match std::fs::read_to_string(&settings_path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(location) => location,
                Err(error) => {
                    debug!(%error, "Unreadable location settings, using default");
                    Location::default()
                }
            },
            Err(_) => Location::default(),
        };

        Self {
            client,
            settings_path,
            location: RwLock::new(location),
        }
    }

    pub fn location(&self) -> Location {
        self.location.read().clone()
    }

    /// Change the location and persist it for the next start
    pub async fn set_location(&self, location: Location) -> Result<(), WeatherError> {
        let raw = serde_json::to_string_pretty(&location).unwrap_or_default();

        // Write-then-rename so a crash mid-write cannot truncate the
        // settings file
        let tmp = self.settings_path.with_extension("tmp");
        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, &self.settings_path).await?;

        info!(name = %location.name, "Weather location updated");
        *self.location.write() = location;
        Ok(())
    }

    /// Geocode a free-text place name into candidate locations
    pub async fn search_locations(&self, query: &str) -> Result<Vec<Location>, WeatherError> {
        let url = format!("{GEOCODING_URL}?name={}&count=5", urlencode(query));
        let payload = upstream::get_json(&self.client, SERVICE, &url).await?;
        Ok(parse_geocoding(&payload)?)
    }

    /// Current conditions at the configured location
    pub async fn current_weather(&self) -> Result<CurrentWeather, WeatherError> {
        let location = self.location();
        let url = format!(
            "{FORECAST_URL}?latitude={}&longitude={}\
             &current=temperature_2m,relative_humidity_2m,weather_code,wind_speed_10m\
             &wind_speed_unit=ms",
            location.latitude, location.longitude
        );

        let payload = upstream::get_json(&self.client, SERVICE, &url).await?;
        Ok(parse_current_weather(&payload, Utc::now())?)
    }
}

fn urlencode(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~') {
                c.to_string()
            } else {
                c.to_string()
                    .bytes()
                    .map(|b| format!("%{b:02X}"))
                    .collect()
            }
        })
        .collect()
}

fn parse_geocoding(payload: &Value) -> Result<Vec<Location>, UpstreamError> {
    // No matches comes back with the results key absent entirely
    let Some(results) = payload.get("results") else {
        return Ok(Vec::new());
    };

    let results = results
        .as_array()
        .ok_or_else(|| UpstreamError::shape(SERVICE, "results is not an array"))?;

    let mut locations = Vec::with_capacity(results.len());
    for result in results {
        let name = upstream::field_str(SERVICE, result, "name")?;
        let name = match result.get("country").and_then(Value::as_str) {
            Some(country) => format!("{name}, {country}"),
            None => name.to_string(),
        };

        locations.push(Location {
            name,
            latitude: upstream::field_f64(SERVICE, result, "latitude")?,
            longitude: upstream::field_f64(SERVICE, result, "longitude")?,
        });
    }
    Ok(locations)
}

fn parse_current_weather(
    payload: &Value,
    fetched_at: DateTime<Utc>,
) -> Result<CurrentWeather, UpstreamError> {
    let current = payload
        .get("current")
        .ok_or_else(|| UpstreamError::shape(SERVICE, "missing current block"))?;

    Ok(CurrentWeather {
        temperature_c: upstream::field_f64(SERVICE, current, "temperature_2m")?,
        humidity_percent: upstream::field_f64(SERVICE, current, "relative_humidity_2m")?,
        weather_code: upstream::field_f64(SERVICE, current, "weather_code")? as i32,
        wind_speed_ms: upstream::field_f64(SERVICE, current, "wind_speed_10m")?,
        fetched_at,
    })
}
