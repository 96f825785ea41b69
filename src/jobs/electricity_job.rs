use crate::jobs::retry::{run_until_fresh, RetryPolicy};
use crate::jobs::supervisor::ScheduledTask;
use crate::services::electricity::ElectricityService;
use std::sync::Arc;
use tracing::info;

/// Daily electricity price fetch
///
/// The upstream publishes tomorrow's sheet "around" early afternoon
/// with no hard deadline, so one cron trigger is not enough: the job
/// keeps retrying until the stored sheet actually covers tomorrow. The
/// same task also runs once at startup to recover from downtime across
/// the publication window.
pub struct ElectricityFetchJob {
    service: Arc<ElectricityService>,
    policy: RetryPolicy,
}

impl ElectricityFetchJob {
    pub fn new(service: Arc<ElectricityService>, policy: RetryPolicy) -> Self {
        Self { service, policy }
    }
}

#[async_trait::async_trait]
impl ScheduledTask for ElectricityFetchJob {
    fn name(&self) -> &'static str {
        "electricity_daily_fetch"
    }

    async fn run(&self) {
        let fetcher = self.service.clone();
        let checker = self.service.clone();

        let fresh = run_until_fresh(
            self.name(),
            self.policy,
            move || {
                let service = fetcher.clone();
                async move { service.fetch_and_store().await.map(|_| ()) }
            },
            move || {
                let service = checker.clone();
                // A failed freshness probe counts as stale and keeps
                // the retry loop going
                async move { matches!(service.is_fetch_needed().await, Ok(false)) }
            },
        )
        .await;

        if fresh {
            info!(job = self.name(), "Electricity prices are up to date");
        }
    }
}
