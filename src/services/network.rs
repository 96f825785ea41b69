use crate::jobs::supervisor::PollerTask;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use utoipa::ToSchema;

/// One snapshot of local network conditions
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NetworkHealth {
    /// Whether the ping target answered
    pub internet_reachable: bool,
    /// Round-trip time to the ping target
    pub latency_ms: Option<f64>,
    /// Wi-Fi signal level of the monitored interface
    pub wifi_signal_dbm: Option<i32>,
    /// Receive throughput since the previous sample
    pub rx_bytes_per_sec: Option<f64>,
    /// Transmit throughput since the previous sample
    pub tx_bytes_per_sec: Option<f64>,
    pub sampled_at: DateTime<Utc>,
}

/// Local network prober
///
/// Holds only the latest snapshot; history is not this service's
/// concern. The ping and signal probes run concurrently, throughput
/// comes from interface counter deltas between consecutive samples.
pub struct NetworkMonitor {
    ping_target: String,
    interface: String,
    poll_interval: Duration,
    latest: RwLock<Option<NetworkHealth>>,
    previous_counters: Mutex<Option<(Instant, u64, u64)>>,
}

impl NetworkMonitor {
    pub fn new(ping_target: String, interface: String, poll_interval: Duration) -> Self {
        Self {
            ping_target,
            interface,
            poll_interval,
            latest: RwLock::new(None),
            previous_counters: Mutex::new(None),
        }
    }

    /// The most recent snapshot, if a sample has completed
    pub fn latest(&self) -> Option<NetworkHealth> {
        self.latest.read().clone()
    }

    /// Take one snapshot and make it the latest
    pub async fn sample(&self) -> NetworkHealth {
        let (latency_ms, wifi_signal_dbm) =
            tokio::join!(self.probe_latency(), self.probe_signal());

        let (rx_bytes_per_sec, tx_bytes_per_sec) = self.probe_throughput().await;

        let health = NetworkHealth {
            internet_reachable: latency_ms.is_some(),
            latency_ms,
            wifi_signal_dbm,
            rx_bytes_per_sec,
            tx_bytes_per_sec,
            sampled_at: Utc::now(),
        };

        *self.latest.write() = Some(health.clone());
        health
    }

    async fn probe_latency(&self) -> Option<f64> {
        let output = tokio::process::Command::new("ping")
            .args(["-c", "1", "-W", "2", &self.ping_target])
            .output()
            .await
            .ok()?;

        if !output.status.success() {
            return None;
        }
        parse_ping_latency(&String::from_utf8_lossy(&output.stdout))
    }

    async fn probe_signal(&self) -> Option<i32> {
        let contents = tokio::fs::read_to_string("/proc/net/wireless").await.ok()?;
        parse_wireless_signal(&contents, &self.interface)
    }

    async fn probe_throughput(&self) -> (Option<f64>, Option<f64>) {
        let contents = match tokio::fs::read_to_string("/proc/net/dev").await {
            Ok(contents) => contents,
            Err(error) => {
                debug!(%error, "Interface counters unavailable");
                return (None, None);
            }
        };

        let Some((rx, tx)) = parse_interface_counters(&contents, &self.interface) else {
            return (None, None);
        };

        let now = Instant::now();
        let previous = self.previous_counters.lock().replace((now, rx, tx));

        match previous {
            Some((then, prev_rx, prev_tx)) => {
                let elapsed = now.duration_since(then).as_secs_f64();
                (counter_rate(prev_rx, rx, elapsed), counter_rate(prev_tx, tx, elapsed))
            }
            None => (None, None),
        }
    }
}

#[async_trait::async_trait]
impl PollerTask for NetworkMonitor {
    fn name(&self) -> &'static str {
        "network_poll"
    }

    fn interval(&self) -> Duration {
        self.poll_interval
    }

    async fn tick(&self) {
        self.sample().await;
    }
}

/// Pull the `time=12.3 ms` figure out of ping output
fn parse_ping_latency(output: &str) -> Option<f64> {
    let index = output.find("time=")?;
    let tail = &output[index + 5..];
    let end = tail.find(' ')?;
    tail[..end].parse().ok()
}

/// Signal level from a /proc/net/wireless row, truncated to whole dBm
fn parse_wireless_signal(contents: &str, interface: &str) -> Option<i32> {
    let prefix = format!("{interface}:");
    let row = contents
        .lines()
        .map(str::trim_start)
        .find(|line| line.starts_with(&prefix))?;

    // iface: status link level noise ... - level is the third value
    let level = row.split_whitespace().nth(3)?;
    level.trim_end_matches('.').parse::<f64>().ok().map(|v| v as i32)
}

/// Cumulative (rx_bytes, tx_bytes) from a /proc/net/dev row
fn parse_interface_counters(contents: &str, interface: &str) -> Option<(u64, u64)> {
    let prefix = format!("{interface}:");
    let row = contents
        .lines()
        .map(str::trim_start)
        .find(|line| line.starts_with(&prefix))?;

    let fields: Vec<&str> = row.trim_start_matches(&prefix).split_whitespace().collect();
    // rx_bytes is field 0, tx_bytes is field 8
    let rx = fields.first()?.parse().ok()?;
    let tx = fields.get(8)?.parse().ok()?;
    Some((rx, tx))
}

fn counter_rate(previous: u64, current: u64, elapsed_secs: f64) -> Option<f64> {
    if elapsed_secs <= 0.0 || current < previous {
        // Counter reset (interface bounce) invalidates this delta
        return None;
    }
    Some((current - previous) as f64 / elapsed_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_latency_from_ping_output() {
        let output = "PING 1.1.1.1 (1.1.1.1) 56(84) bytes of data.\n\
                      64 bytes from 1.1.1.1: icmp_seq=1 ttl=57 time=12.4 ms\n\
                      \n\
                      --- 1.1.1.1 ping statistics ---\n\
                      1 packets transmitted, 1 received, 0% packet loss, time 0ms\n";
        assert_eq!(parse_ping_latency(output), Some(12.4));
    }

    #[test]
    fn missing_rtt_yields_none() {
        let output = "1 packets transmitted, 0 received, 100% packet loss, time 0ms\n";
        assert_eq!(parse_ping_latency(output), None);
    }

    #[test]
    fn reads_the_signal_level_for_the_right_interface() {
        let contents = "Inter-| sta-|   Quality        |   Discarded packets\n\
                        face | tus | link level noise |  nwid  crypt   frag\n\
                        wlan0: 0000   54.  -56.  -256        0      0      0\n\
                        wlan1: 0000   70.  -40.  -256        0      0      0\n";
        assert_eq!(parse_wireless_signal(contents, "wlan0"), Some(-56));
        assert_eq!(parse_wireless_signal(contents, "wlan1"), Some(-40));
        assert_eq!(parse_wireless_signal(contents, "eth0"), None);
    }

    #[test]
    fn reads_interface_counters_from_proc_net_dev() {
        let contents = "Inter-|   Receive                |  Transmit\n\
                        face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n\
                        lo: 1234567     890    0    0    0     0          0         0  1234567     890    0    0    0     0       0          0\n\
                        wlan0: 987654321 65432    0    0    0     0          0         0 123456789 43210    0    0    0     0       0          0\n";
        assert_eq!(
            parse_interface_counters(contents, "wlan0"),
            Some((987654321, 123456789))
        );
        assert_eq!(parse_interface_counters(contents, "eth0"), None);
    }

    #[test]
    fn counter_reset_invalidates_the_rate() {
        assert_eq!(counter_rate(1000, 3000, 2.0), Some(1000.0));
        assert_eq!(counter_rate(3000, 1000, 2.0), None);
        assert_eq!(counter_rate(1000, 2000, 0.0), None);
    }

    #[tokio::test]
    async fn latest_is_empty_before_the_first_sample() {
        let monitor = NetworkMonitor::new(
            "192.0.2.1".to_string(),
            "wlan0".to_string(),
            Duration::from_secs(30),
        );
        assert!(monitor.latest().is_none());
    }
}
