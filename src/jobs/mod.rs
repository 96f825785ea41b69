pub mod electricity_job;
pub mod retry;
pub mod stocks_prune_job;
pub mod supervisor;

pub use electricity_job::ElectricityFetchJob;
pub use retry::{run_until_fresh, RetryPolicy};
pub use stocks_prune_job::StocksPruneJob;
pub use supervisor::{JobError, JobSupervisor, PollerTask, ScheduledTask};
