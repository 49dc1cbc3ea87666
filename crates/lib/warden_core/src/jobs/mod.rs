//! Cron-driven background passes.
//!
//! Each registered [`Job`] runs on its own task, woken by its own cron
//! schedule. Passes are idempotent, so overlap between jobs is harmless and
//! no locking is done.

mod schedule;
mod scheduler;
mod tasks;

use async_trait::async_trait;
use thiserror::Error;

use crate::bridge::BridgeError;
use crate::directory::DirectoryError;
use crate::store::StoreError;
use crate::users::UserError;

pub use schedule::CronSchedule;
pub use scheduler::Scheduler;
pub use tasks::{BridgeSyncJob, IncompleteProfilesJob, PurgeExpiredJob, ReconcileJob};

/// Hourly, on the hour.
pub const DEFAULT_CRON: &str = "0 * * * *";

/// Daily at 03:00 UTC.
pub const PURGE_CRON: &str = "0 3 * * *";

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Invalid cron expression '{expr}': {reason}")]
    InvalidSchedule { expr: String, reason: String },

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    User(#[from] UserError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A unit of scheduled work.
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    /// Run once; the returned line is posted to the audit channel.
    async fn run(&self) -> Result<String, JobError>;
}

/// Cron expressions for each pass. `None` leaves the pass unscheduled.
#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    pub drive: Option<String>,
    pub leads_drive: Option<String>,
    pub github: Option<String>,
    pub wiki: Option<String>,
    pub chat: Option<String>,
    pub bridge_sync: Option<String>,
    pub incomplete_profiles: Option<String>,
    pub token_purge: Option<String>,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        let hourly = Some(DEFAULT_CRON.to_string());
        Self {
            drive: hourly.clone(),
            leads_drive: hourly.clone(),
            github: hourly.clone(),
            wiki: hourly.clone(),
            chat: hourly.clone(),
            bridge_sync: hourly,
            incomplete_profiles: None,
            token_purge: Some(PURGE_CRON.to_string()),
        }
    }
}
