use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    MissingVar(&'static str),
}

/// Process configuration, read once at startup
///
/// Everything except DATABASE_URL has a sensible default; upstream
/// credentials default to empty, which degrades the matching feature
/// instead of refusing to start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub pool_size: u32,
    pub bind_address: String,

    pub twelvedata_api_key: String,
    pub todoist_token: String,
    /// Only Todoist tasks with this label are mirrored; empty = all
    pub todoist_label: String,
    pub digitransit_api_key: String,
    /// GTFS stop ids for the transit board, comma-separated in env
    pub transit_stop_ids: Vec<String>,

    pub weather_settings_path: PathBuf,
    pub network_ping_target: String,
    pub network_interface: String,

    pub todoist_poll_interval: Duration,
    pub network_poll_interval: Duration,
    pub sensor_poll_interval: Duration,
    pub shutdown_grace: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL"))?;

        Ok(Self {
            database_url,
            pool_size: parsed_or("DB_POOL_MAX_SIZE", 5),
            bind_address: var_or("BIND_ADDRESS", "0.0.0.0:8000"),

            twelvedata_api_key: credential("TWELVEDATA_API_KEY"),
            todoist_token: credential("TODOIST_TOKEN"),
            todoist_label: var_or("TODOIST_LABEL", "Dashboard"),
            digitransit_api_key: credential("DIGITRANSIT_API_KEY"),
            transit_stop_ids: var_or("TRANSIT_STOP_IDS", "")
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),

            weather_settings_path: PathBuf::from(var_or(
                "WEATHER_SETTINGS_PATH",
                "weather_location.json",
            )),
            network_ping_target: var_or("NETWORK_PING_TARGET", "1.1.1.1"),
            network_interface: var_or("NETWORK_INTERFACE", "wlan0"),

            todoist_poll_interval: Duration::from_secs(parsed_or("TODOIST_POLL_SECS", 10)),
            network_poll_interval: Duration::from_secs(parsed_or("NETWORK_POLL_SECS", 30)),
            sensor_poll_interval: Duration::from_secs(parsed_or("SENSOR_POLL_SECS", 10)),
            shutdown_grace: Duration::from_secs(parsed_or("SHUTDOWN_GRACE_SECS", 5)),
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn credential(key: &str) -> String {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => {
            warn!(key, "Credential not configured, feature will be degraded");
            String::new()
        }
    }
}
