use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{CronSchedule, Job, JobError};
use crate::directory::Notifications;

struct RegisteredJob {
    job: Arc<dyn Job>,
    schedule: CronSchedule,
}

/// Runs each registered job on its cron schedule until shut down.
pub struct Scheduler {
    jobs: Vec<RegisteredJob>,
    notifications: Notifications,
    shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(notifications: Notifications) -> Self {
        Self {
            jobs: Vec::new(),
            notifications,
            shutdown: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Stop the scheduler when `parent` is cancelled.
    pub fn with_shutdown(mut self, parent: &CancellationToken) -> Self {
        self.shutdown = parent.child_token();
        self
    }

    pub fn register(&mut self, job: Arc<dyn Job>, schedule: CronSchedule) {
        self.jobs.push(RegisteredJob { job, schedule });
    }

    /// Parse `expr` and register. An invalid expression is fatal for the caller.
    pub fn register_cron(&mut self, job: Arc<dyn Job>, expr: &str) -> Result<(), JobError> {
        let schedule = CronSchedule::parse(expr)?;
        self.register(job, schedule);
        Ok(())
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|r| r.job.name()).collect()
    }

    pub async fn start(&self) {
        let mut handles = self.handles.lock().await;
        for registered in &self.jobs {
            let job = Arc::clone(&registered.job);
            let schedule = registered.schedule.clone();
            let notifications = self.notifications.clone();
            let shutdown = self.shutdown.clone();

            info!(job = job.name(), cron = schedule.expr(), "registered job");
            handles.push(tokio::spawn(async move {
                loop {
                    let Some(wait) = schedule.until_next(Utc::now()) else {
                        warn!(job = job.name(), "schedule has no further runs");
                        break;
                    };
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {
                            run_job(job.as_ref(), &notifications).await;
                        }
                        _ = shutdown.cancelled() => {
                            info!(job = job.name(), "job loop stopped");
                            break;
                        }
                    }
                }
            }));
        }
        info!(job_count = handles.len(), "scheduler started");
    }

    /// Stop every loop. A run already in progress finishes first.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        info!("scheduler shut down");
    }
}

/// One announced run. Failures are logged and reported, never propagated.
pub async fn run_job(job: &dyn Job, notifications: &Notifications) {
    let name = job.name();
    info!(job = name, "starting job");
    notifications.send(format!(":alarm_clock: Starting {name}"));
    match job.run().await {
        Ok(summary) => {
            info!(job = name, %summary, "finished job");
            notifications.send(format!(":white_check_mark: Finished {name}: {summary}"));
        }
        Err(e) => {
            error!(job = name, error = %e, "job failed");
            notifications.send(format!(":x: {name} failed: {e}"));
        }
    }
}
