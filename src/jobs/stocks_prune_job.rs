use crate::jobs::supervisor::ScheduledTask;
use crate::stocks::StocksService;
use std::sync::Arc;
use tracing::{error, info};

/// Hourly retention sweep over stored intraday history
pub struct StocksPruneJob {
    service: Arc<StocksService>,
}

impl StocksPruneJob {
    pub fn new(service: Arc<StocksService>) -> Self {
        Self { service }
    }
}

#[async_trait::async_trait]
impl ScheduledTask for StocksPruneJob {
    fn name(&self) -> &'static str {
        "stocks_history_prune"
    }

    async fn run(&self) {
        match self.service.prune_history().await {
            Ok(0) => {}
            Ok(deleted) => info!(job = self.name(), deleted, "Pruned stock history"),
            Err(error) => error!(job = self.name(), %error, "History prune failed"),
        }
    }
}
