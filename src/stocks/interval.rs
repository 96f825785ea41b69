use chrono::Duration;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Supported intraday history resolutions
///
/// Serialized in the upstream provider's interval notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Interval {
    #[serde(rename = "1min")]
    OneMinute,
    #[serde(rename = "5min")]
    FiveMinutes,
    #[serde(rename = "15min")]
    FifteenMinutes,
    #[serde(rename = "30min")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
}

impl Interval {
    /// Provider notation, also used as the stored interval key
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1min",
            Interval::FiveMinutes => "5min",
            Interval::FifteenMinutes => "15min",
            Interval::ThirtyMinutes => "30min",
            Interval::OneHour => "1h",
        }
    }

    pub fn from_str(s: &str) -> Option<Interval> {
        match s {
            "1min" => Some(Interval::OneMinute),
            "5min" => Some(Interval::FiveMinutes),
            "15min" => Some(Interval::FifteenMinutes),
            "30min" => Some(Interval::ThirtyMinutes),
            "1h" => Some(Interval::OneHour),
            _ => None,
        }
    }

    /// Width of one bar
    pub fn bar_width(&self) -> Duration {
        match self {
            Interval::OneMinute => Duration::minutes(1),
            Interval::FiveMinutes => Duration::minutes(5),
            Interval::FifteenMinutes => Duration::minutes(15),
            Interval::ThirtyMinutes => Duration::minutes(30),
            Interval::OneHour => Duration::hours(1),
        }
    }

    /// How long a cached series stays usable while the session is open
    pub fn data_lifespan(&self) -> Duration {
        match self {
            Interval::OneMinute => Duration::seconds(60),
            _ => Duration::seconds(300),
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
