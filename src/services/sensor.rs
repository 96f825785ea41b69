use crate::jobs::supervisor::PollerTask;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;
use utoipa::ToSchema;

/// One environment sensor sample
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SensorReading {
    pub temperature_c: f64,
    pub humidity_percent: f64,
    pub pressure_hpa: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Single-slot holder for the latest sensor reading
///
/// A watch channel rather than a plain cell so future consumers (push
/// updates, alerting) can await changes instead of polling.
pub struct TelemetryCell {
    tx: watch::Sender<Option<SensorReading>>,
}

impl TelemetryCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn publish(&self, reading: SensorReading) {
        // send_replace never fails even with zero receivers
        self.tx.send_replace(Some(reading));
    }

    pub fn latest(&self) -> Option<SensorReading> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SensorReading>> {
        self.tx.subscribe()
    }
}

impl Default for TelemetryCell {
    fn default() -> Self {
        Self::new()
    }
}

/// A source of sensor samples; None means the sensor was unreachable
/// this round
#[async_trait::async_trait]
pub trait SensorSource: Send + Sync {
    async fn read(&self) -> Option<SensorReading>;
}

/// Polls a sensor source and publishes into the cell
pub struct SensorPoller {
    source: Arc<dyn SensorSource>,
    cell: Arc<TelemetryCell>,
    poll_interval: Duration,
}

impl SensorPoller {
    pub fn new(
        source: Arc<dyn SensorSource>,
        cell: Arc<TelemetryCell>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            cell,
            poll_interval,
        }
    }
}

#[async_trait::async_trait]
impl PollerTask for SensorPoller {
    fn name(&self) -> &'static str {
        "sensor_poll"
    }

    fn interval(&self) -> Duration {
        self.poll_interval
    }

    async fn tick(&self) {
        match self.source.read().await {
            Some(reading) => self.cell.publish(reading),
            None => debug!("Sensor unreachable, keeping previous reading"),
        }
    }
}

/// Random-walk stand-in for deployments without real sensor hardware
pub struct MockSensorSource {
    state: Mutex<SensorReading>,
}

impl MockSensorSource {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SensorReading {
                temperature_c: 21.5,
                humidity_percent: 40.0,
                pressure_hpa: 1013.0,
                recorded_at: Utc::now(),
            }),
        }
    }
}

impl Default for MockSensorSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SensorSource for MockSensorSource {
    async fn read(&self) -> Option<SensorReading> {
        let mut rng = rand::rng();
        let mut state = self.state.lock();

        state.temperature_c =
            (state.temperature_c + rng.random_range(-0.2..0.2)).clamp(15.0, 30.0);
        state.humidity_percent =
            (state.humidity_percent + rng.random_range(-1.0..1.0)).clamp(20.0, 70.0);
        state.pressure_hpa =
            (state.pressure_hpa + rng.random_range(-0.5..0.5)).clamp(950.0, 1050.0);
        state.recorded_at = Utc::now();

        Some(state.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(temperature_c: f64) -> SensorReading {
        SensorReading {
            temperature_c,
            humidity_percent: 45.0,
            pressure_hpa: 1010.0,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn cell_holds_the_latest_reading_only() {
        let cell = TelemetryCell::new();
        assert!(cell.latest().is_none());

        cell.publish(reading(20.0));
        cell.publish(reading(21.0));
        assert_eq!(cell.latest().map(|r| r.temperature_c), Some(21.0));
    }

    #[tokio::test]
    async fn subscribers_observe_new_readings() {
        let cell = TelemetryCell::new();
        let mut rx = cell.subscribe();

        cell.publish(reading(22.5));
        rx.changed().await.unwrap();
        assert_eq!(
            rx.borrow().as_ref().map(|r| r.temperature_c),
            Some(22.5)
        );
    }

    #[tokio::test]
    async fn mock_source_walks_within_plausible_bounds() {
        let source = MockSensorSource::new();
        for _ in 0..200 {
            let reading = source.read().await.unwrap();
            assert!((15.0..=30.0).contains(&reading.temperature_c));
            assert!((20.0..=70.0).contains(&reading.humidity_percent));
            assert!((950.0..=1050.0).contains(&reading.pressure_hpa));
        }
    }

    #[tokio::test]
    async fn poller_publishes_into_the_cell() {
        let cell = Arc::new(TelemetryCell::new());
        let poller = SensorPoller::new(
            Arc::new(MockSensorSource::new()),
            cell.clone(),
            Duration::from_secs(10),
        );

        poller.tick().await;
        assert!(cell.latest().is_some());
    }
}
