use chrono_tz::Tz;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] JobSchedulerError),
}

/// A task driven on a fixed interval for as long as the process runs
#[async_trait::async_trait]
pub trait PollerTask: Send + Sync {
    fn name(&self) -> &'static str;
    fn interval(&self) -> Duration;

    /// One poll cycle. Failures are the task's own concern; the
    /// supervisor keeps driving the loop regardless.
    async fn tick(&self);
}

/// A task fired by the cron scheduler or once at startup
#[async_trait::async_trait]
pub trait ScheduledTask: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self);
}

/// Owns every background task in the process
///
/// Pollers run in dedicated tokio tasks under a shared cancellation
/// token; cron and one-shot work goes through the scheduler. Shutdown
/// is cooperative with a bounded grace period, after which stragglers
/// are aborted.
pub struct JobSupervisor {
    cancel: CancellationToken,
    started: AtomicBool,
    pollers: Mutex<Vec<Arc<dyn PollerTask>>>,
    handles: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
    scheduler: JobScheduler,
    scheduled_ids: Mutex<HashMap<String, Uuid>>,
    grace: Duration,
}

impl JobSupervisor {
    pub async fn new(grace: Duration) -> Result<Self, JobError> {
        Ok(Self {
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            pollers: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
            scheduler: JobScheduler::new().await?,
            scheduled_ids: Mutex::new(HashMap::new()),
            grace,
        })
    }

    /// Register a poller. Takes effect at `start_all`.
    pub fn register_poller(&self, task: Arc<dyn PollerTask>) {
        self.pollers.lock().push(task);
    }

    /// Register a cron job under a stable id, in the given time zone.
    /// Re-registering the same id replaces the previous schedule.
    pub async fn schedule_cron(
        &self,
        id: &str,
        schedule: &str,
        timezone: Tz,
        task: Arc<dyn ScheduledTask>,
    ) -> Result<(), JobError> {
        let job = Job::new_async_tz(schedule, timezone, move |_uuid, _scheduler| {
            let task = task.clone();
            Box::pin(async move {
                debug!(job = task.name(), "Cron trigger fired");
                task.run().await;
            })
        })?;

        self.replace_job(id, job).await
    }

    /// Register a job that fires once, shortly after the scheduler
    /// starts
    pub async fn schedule_startup(
        &self,
        id: &str,
        task: Arc<dyn ScheduledTask>,
    ) -> Result<(), JobError> {
        let job = Job::new_one_shot_async(Duration::from_secs(1), move |_uuid, _scheduler| {
            let task = task.clone();
            Box::pin(async move {
                debug!(job = task.name(), "Startup trigger fired");
                task.run().await;
            })
        })?;

        self.replace_job(id, job).await
    }

    async fn replace_job(&self, id: &str, job: Job) -> Result<(), JobError> {
        let previous = self.scheduled_ids.lock().get(id).copied();
        if let Some(uuid) = previous {
            self.scheduler.remove(&uuid).await?;
        }

        let uuid = self.scheduler.add(job).await?;
        self.scheduled_ids.lock().insert(id.to_string(), uuid);
        Ok(())
    }

    /// Start every registered poller and the scheduler. Calling this
    /// again is a no-op; nothing is started twice.
    pub async fn start_all(&self) -> Result<(), JobError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let pollers = std::mem::take(&mut *self.pollers.lock());
        for task in pollers {
            let name = task.name();
            let cancel = self.cancel.child_token();

            let handle = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(task.interval());
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            debug!(task = task.name(), "Poller stopped");
                            break;
                        }
                        _ = ticker.tick() => task.tick().await,
                    }
                }
            });

            info!(task = name, "Poller started");
            self.handles.lock().push((name, handle));
        }

        self.scheduler.start().await?;
        Ok(())
    }

    /// Cancel all pollers and shut the scheduler down, waiting up to
    /// the grace period before aborting what remains
    pub async fn stop_all(&self) {
        self.cancel.cancel();

        let mut scheduler = self.scheduler.clone();
        if let Err(error) = scheduler.shutdown().await {
            error!(%error, "Scheduler shutdown failed");
        }

        let handles = std::mem::take(&mut *self.handles.lock());
        for (name, handle) in handles {
            let abort = handle.abort_handle();
            match tokio::time::timeout(self.grace, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => warn!(task = name, %error, "Poller panicked"),
                Err(_) => {
                    warn!(task = name, "Poller missed the grace period, aborting");
                    abort.abort();
                }
            }
        }

        info!("Background jobs stopped");
    }

    #[cfg(test)]
    fn running_pollers(&self) -> usize {
        self.handles.lock().len()
    }

    #[cfg(test)]
    fn scheduled_uuid(&self, id: &str) -> Option<Uuid> {
        self.scheduled_ids.lock().get(id).copied()
    }
}
