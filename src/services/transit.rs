use crate::upstream::{self, UpstreamError};
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;
use utoipa::ToSchema;

const SERVICE: &str = "Digitransit";
const BASE_URL: &str = "https://api.digitransit.fi/routing/v2/hsl/gtfs/v1";

/// One upcoming departure from a stop
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Departure {
    /// Route short name, e.g. "550"
    pub route: String,
    pub headsign: String,
    pub scheduled_at: DateTime<Utc>,
    /// Realtime estimate; equals the schedule when no estimate exists
    pub estimated_at: DateTime<Utc>,
    pub realtime: bool,
}

/// Departure board for one configured stop
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StopDepartures {
    pub stop_id: String,
    pub stop_name: String,
    pub departures: Vec<Departure>,
}

/// Departure boards for the configured transit stops
///
/// The routing API only answers per stop, so the boards are fetched
/// with one request per stop, all in flight at once. A failing stop is
/// dropped from the response instead of failing the whole board.
pub struct TransitService {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    stop_ids: Vec<String>,
    departures_per_stop: usize,
}

impl TransitService {
    pub fn new(client: reqwest::Client, api_key: String, stop_ids: Vec<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: BASE_URL.to_string(),
            stop_ids,
            departures_per_stop: 5,
        }
    }

    pub async fn departures(&self) -> Result<Vec<StopDepartures>, UpstreamError> {
        let requests = self.stop_ids.iter().map(|stop_id| self.stop_board(stop_id));
        let results = futures::future::join_all(requests).await;

        let mut boards = Vec::with_capacity(self.stop_ids.len());
        for (stop_id, result) in self.stop_ids.iter().zip(results) {
            match result {
                Ok(board) => boards.push(board),
                Err(error) => warn!(stop_id, %error, "Stop board unavailable"),
            }
        }
        Ok(boards)
    }

    async fn stop_board(&self, stop_id: &str) -> Result<StopDepartures, UpstreamError> {
        let query = json!({
            "query": "query Board($id: String!, $departures: Int!) { \
                stop(id: $id) { \
                    name \
                    stoptimesWithoutPatterns(numberOfDepartures: $departures) { \
                        scheduledDeparture realtimeDeparture serviceDay realtime headsign \
                        trip { route { shortName } } \
                    } \
                } \
            }",
            "variables": {"id": stop_id, "departures": self.departures_per_stop}
        });

        let payload = upstream::send_json(
            SERVICE,
            self.client
                .post(&self.base_url)
                .header("digitransit-subscription-key", &self.api_key)
                .json(&query),
        )
        .await?;

        parse_stop_board(stop_id, &payload)
    }
}

fn parse_stop_board(stop_id: &str, payload: &Value) -> Result<StopDepartures, UpstreamError> {
    let stop = payload
        .get("data")
        .and_then(|data| data.get("stop"))
        .filter(|stop| !stop.is_null())
        .ok_or_else(|| UpstreamError::shape(SERVICE, format!("unknown stop '{stop_id}'")))?;

    let stoptimes = stop
        .get("stoptimesWithoutPatterns")
        .and_then(Value::as_array)
        .ok_or_else(|| UpstreamError::shape(SERVICE, "missing stoptimes"))?;

    let mut departures = Vec::with_capacity(stoptimes.len());
    for stoptime in stoptimes {
        departures.push(parse_departure(stoptime)?);
    }

    Ok(StopDepartures {
        stop_id: stop_id.to_string(),
        stop_name: upstream::field_str(SERVICE, stop, "name")?.to_string(),
        departures,
    })
}

fn parse_departure(stoptime: &Value) -> Result<Departure, UpstreamError> {
    // Departure instants come as seconds-past-midnight on top of the
    // service day epoch; past-27h values on late-night trips are fine
    let service_day = upstream::field_f64(SERVICE, stoptime, "serviceDay")? as i64;
    let scheduled = service_day + upstream::field_f64(SERVICE, stoptime, "scheduledDeparture")? as i64;
    let estimated = service_day + upstream::field_f64(SERVICE, stoptime, "realtimeDeparture")? as i64;

    let route = stoptime
        .get("trip")
        .and_then(|trip| trip.get("route"))
        .and_then(|route| route.get("shortName"))
        .and_then(Value::as_str)
        .ok_or_else(|| UpstreamError::shape(SERVICE, "missing route short name"))?;

    Ok(Departure {
        route: route.to_string(),
        headsign: stoptime
            .get("headsign")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        scheduled_at: epoch(scheduled)?,
        estimated_at: epoch(estimated)?,
        realtime: stoptime
            .get("realtime")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

fn epoch(seconds: i64) -> Result<DateTime<Utc>, UpstreamError> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| UpstreamError::shape(SERVICE, format!("bad departure epoch {seconds}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> Value {
        json!({
            "data": {
                "stop": {
                    "name": "Kamppi",
                    "stoptimesWithoutPatterns": [
                        {
                            "scheduledDeparture": 36000,
                            "realtimeDeparture": 36090,
                            "serviceDay": 1717736400,
                            "realtime": true,
                            "headsign": "Westendinasema",
                            "trip": {"route": {"shortName": "550"}}
                        },
                        {
                            "scheduledDeparture": 36300,
                            "realtimeDeparture": 36300,
                            "serviceDay": 1717736400,
                            "realtime": false,
                            "headsign": null,
                            "trip": {"route": {"shortName": "231"}}
                        }
                    ]
                }
            }
        })
    }

    #[test]
    fn parses_a_stop_board() {
        let board = parse_stop_board("HSL:1040279", &sample_payload()).unwrap();
        assert_eq!(board.stop_name, "Kamppi");
        assert_eq!(board.departures.len(), 2);

        let first = &board.departures[0];
        assert_eq!(first.route, "550");
        assert!(first.realtime);
        // 90 seconds of realtime delay on top of the schedule
        assert_eq!(
            (first.estimated_at - first.scheduled_at).num_seconds(),
            90
        );

        // Missing headsign degrades to empty, not to an error
        assert_eq!(board.departures[1].headsign, "");
        assert!(!board.departures[1].realtime);
    }

    #[test]
    fn unknown_stop_is_a_shape_error() {
        let payload = json!({"data": {"stop": null}});
        assert!(matches!(
            parse_stop_board("HSL:nope", &payload),
            Err(UpstreamError::Shape { .. })
        ));
    }
}
