//! Job scheduling.
//!
//! Two clock sources coexist: interval jobs tick on their own repeated
//! timer, cron jobs are fired by the shared scheduler. On-demand jobs
//! (interval zero, no cron) are not attached at all; the scrape path
//! triggers them synchronously.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job as ScheduledJob, JobScheduler};

use crate::job::{Job, ScheduleKind};

/// Default timeout for graceful scheduler shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Scheduler errors.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler error: {0}")]
    Scheduler(String),
}

/// Metadata about an attached job.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub id: uuid::Uuid,
    pub name: String,
    pub schedule: String,
}

/// Dispatches every scheduled job at the right moments.
pub struct JobDispatcher {
    scheduler: JobScheduler,
    entries: Arc<RwLock<HashMap<uuid::Uuid, ScheduleEntry>>>,
}

impl std::fmt::Debug for JobDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDispatcher")
            .field(
                "job_count",
                &self.entries.try_read().map(|e| e.len()).unwrap_or(0),
            )
            .finish_non_exhaustive()
    }
}

impl JobDispatcher {
    pub async fn new() -> Result<Self, SchedulerError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| SchedulerError::Scheduler(e.to_string()))?;
        Ok(Self {
            scheduler,
            entries: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Attach a job according to its schedule.
    ///
    /// Returns `None` for on-demand jobs, which never run autonomously.
    pub async fn attach(&self, job: Arc<Job>) -> Result<Option<uuid::Uuid>, SchedulerError> {
        let name = job.name().to_string();
        let schedule = job.schedule().clone();

        let make_callback = {
            let job = Arc::clone(&job);
            move || {
                let job = Arc::clone(&job);
                move |_: uuid::Uuid, _: JobScheduler| {
                    let job = Arc::clone(&job);
                    Box::pin(async move { job.run().await })
                        as std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
                }
            }
        };

        let scheduled = match &schedule {
            ScheduleKind::Interval(interval) => {
                ScheduledJob::new_repeated_async(*interval, make_callback())
            }
            ScheduleKind::Cron(expr) => ScheduledJob::new_cron_job_async(expr.as_str(), make_callback()),
            ScheduleKind::OnDemand => return Ok(None),
        }
        .map_err(|e| SchedulerError::Scheduler(e.to_string()))?;

        let job_id = self
            .scheduler
            .add(scheduled)
            .await
            .map_err(|e| SchedulerError::Scheduler(e.to_string()))?;

        let schedule_desc = match &schedule {
            ScheduleKind::Interval(interval) => format!("every {interval:?}"),
            ScheduleKind::Cron(expr) => format!("cron: {expr}"),
            ScheduleKind::OnDemand => unreachable!(),
        };
        self.entries.write().await.insert(
            job_id,
            ScheduleEntry {
                id: job_id,
                name: name.clone(),
                schedule: schedule_desc.clone(),
            },
        );

        tracing::info!(job = %name, job_id = %job_id, schedule = %schedule_desc,
            "Job scheduled");
        Ok(Some(job_id))
    }

    /// Start dispatching.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        self.scheduler
            .start()
            .await
            .map_err(|e| SchedulerError::Scheduler(e.to_string()))?;
        tracing::info!("Job scheduler started");
        Ok(())
    }

    pub async fn job_count(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn entries(&self) -> Vec<ScheduleEntry> {
        self.entries.read().await.values().cloned().collect()
    }

    /// Gracefully shut the scheduler down.
    pub async fn shutdown(mut self) -> Result<(), SchedulerError> {
        let result = tokio::time::timeout(DEFAULT_SHUTDOWN_TIMEOUT, async {
            self.scheduler
                .shutdown()
                .await
                .map_err(|e| SchedulerError::Scheduler(e.to_string()))
        })
        .await;

        match result {
            Ok(Ok(())) => {
                tracing::info!("Job scheduler shutdown complete");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                tracing::warn!("Job scheduler shutdown timed out");
                Ok(())
            }
        }
    }
}
