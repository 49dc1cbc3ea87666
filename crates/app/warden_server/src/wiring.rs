//! Optional directory integrations and their schedules.
//!
//! Each external directory is wired only when its credentials are present.
//! The adapters that also back API routes are shared with the router.

use std::sync::Arc;

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use warden_api::Integrations;
use warden_core::bridge::{ChatPlatform, RoleBridge};
use warden_core::clients::{DiscordClient, DriveClient, GitHubClient, WikiClient};
use warden_core::directory::chat::ChatAdapter;
use warden_core::directory::drive::DriveAdapter;
use warden_core::directory::github::GitHubAdapter;
use warden_core::directory::wiki::WikiAdapter;
use warden_core::directory::{
    ChatNotifier, DirectoryAdapter, DirectorySettings, Notifications, Reconciler,
};
use warden_core::jobs::{
    BridgeSyncJob, IncompleteProfilesJob, Job, JobError, PurgeExpiredJob, ReconcileJob,
    ScheduleSettings, Scheduler,
};
use warden_core::store::IdentityStore;

#[derive(Args, Debug)]
pub(crate) struct DirectoryArgs {
    /// Chat-platform bot token.
    #[arg(long, env = "DISCORD_TOKEN")]
    discord_token: Option<String>,

    #[arg(long, env = "DISCORD_GUILD_ID")]
    discord_guild_id: Option<String>,

    /// Channel that receives audit notifications.
    #[arg(long, env = "DISCORD_LOG_CHANNEL")]
    discord_log_channel: Option<String>,

    /// Subteam group names, comma-separated.
    #[arg(long, env = "SUBTEAMS", value_delimiter = ',')]
    subteams: Vec<String>,

    #[arg(long, env = "GITHUB_TOKEN")]
    github_token: Option<String>,

    #[arg(long, env = "GITHUB_ORG")]
    github_org: Option<String>,

    #[arg(long, env = "WIKI_URL")]
    wiki_url: Option<String>,

    #[arg(long, env = "WIKI_TOKEN_ID")]
    wiki_token_id: Option<String>,

    #[arg(long, env = "WIKI_TOKEN_SECRET")]
    wiki_token_secret: Option<String>,

    /// OAuth access token for the shared-drive API.
    #[arg(long, env = "DRIVE_TOKEN")]
    drive_token: Option<String>,

    #[arg(long, env = "DRIVE_ID")]
    drive_id: Option<String>,

    /// Drive shared with the inner circle only. Uses `DRIVE_TOKEN`.
    #[arg(long, env = "LEADS_DRIVE_ID")]
    leads_drive_id: Option<String>,

    /// Identities no pass may touch, comma-separated.
    #[arg(long, env = "KEEP_LIST", value_delimiter = ',')]
    keep_list: Vec<String>,

    #[arg(long, env = "RECONCILE_CONCURRENCY", default_value_t = 8)]
    reconcile_concurrency: usize,

    #[arg(long, env = "DRIVE_CRON")]
    drive_cron: Option<String>,

    #[arg(long, env = "LEADS_DRIVE_CRON")]
    leads_drive_cron: Option<String>,

    #[arg(long, env = "GITHUB_CRON")]
    github_cron: Option<String>,

    #[arg(long, env = "WIKI_CRON")]
    wiki_cron: Option<String>,

    #[arg(long, env = "DISCORD_CRON")]
    discord_cron: Option<String>,

    #[arg(long, env = "ROLE_SYNC_CRON")]
    role_sync_cron: Option<String>,

    #[arg(long, env = "PROFILE_CHECK_CRON")]
    profile_check_cron: Option<String>,

    /// Expired code and refresh token cleanup. Daily by default.
    #[arg(long, env = "PURGE_CRON")]
    purge_cron: Option<String>,
}

impl DirectoryArgs {
    fn settings(&self) -> DirectorySettings {
        DirectorySettings {
            keep_list: self.keep_list.clone(),
            concurrency: self.reconcile_concurrency,
        }
    }

    /// Explicit expressions override the defaults.
    fn schedules(&self) -> ScheduleSettings {
        let defaults = ScheduleSettings::default();
        ScheduleSettings {
            drive: self.drive_cron.clone().or(defaults.drive),
            leads_drive: self.leads_drive_cron.clone().or(defaults.leads_drive),
            github: self.github_cron.clone().or(defaults.github),
            wiki: self.wiki_cron.clone().or(defaults.wiki),
            chat: self.discord_cron.clone().or(defaults.chat),
            bridge_sync: self.role_sync_cron.clone().or(defaults.bridge_sync),
            incomplete_profiles: self
                .profile_check_cron
                .clone()
                .or(defaults.incomplete_profiles),
            token_purge: self.purge_cron.clone().or(defaults.token_purge),
        }
    }
}

/// What the directories contribute to the running server.
pub(crate) struct Directories {
    pub(crate) scheduler: Scheduler,
    pub(crate) integrations: Integrations,
}

fn reconcile_job<A: DirectoryAdapter + 'static>(
    adapter: Arc<A>,
    settings: &DirectorySettings,
    notifications: &Notifications,
) -> Arc<dyn Job> {
    Arc::new(ReconcileJob::new(Reconciler::from_settings(
        adapter,
        settings,
        notifications.clone(),
    )))
}

/// Unscheduled passes are skipped; a bad expression aborts startup.
fn register(
    scheduler: &mut Scheduler,
    job: Arc<dyn Job>,
    cron: Option<&str>,
) -> Result<(), JobError> {
    match cron {
        Some(expr) => scheduler.register_cron(job, expr),
        None => {
            info!(job = job.name(), "no schedule configured, skipping");
            Ok(())
        }
    }
}

/// Connect every configured directory: a scheduled job for each, plus the
/// adapters the API routes call into.
pub(crate) async fn connect_directories(
    args: &DirectoryArgs,
    store: Arc<dyn IdentityStore>,
    shutdown: &CancellationToken,
) -> Result<Directories, Box<dyn std::error::Error>> {
    let settings = args.settings();
    let schedules = args.schedules();

    let platform: Option<Arc<dyn ChatPlatform>> =
        match (&args.discord_token, &args.discord_guild_id) {
            (Some(token), Some(guild)) => {
                Some(Arc::new(DiscordClient::new(token, guild)) as Arc<dyn ChatPlatform>)
            }
            _ => None,
        };

    let notifications = match (&platform, &args.discord_log_channel) {
        (Some(platform), Some(channel)) => {
            Notifications::new(Arc::new(ChatNotifier::new(platform.clone(), channel)))
        }
        _ => Notifications::disabled(),
    };

    let mut scheduler = Scheduler::new(notifications.clone()).with_shutdown(shutdown);
    let mut integrations = Integrations::default();

    if let Some(platform) = platform {
        let bridge = Arc::new(
            RoleBridge::connect(
                platform,
                store.clone(),
                args.subteams.clone(),
                notifications.clone(),
            )
            .await?,
        );
        info!(subteams = args.subteams.len(), "chat platform connected");
        register(
            &mut scheduler,
            Arc::new(BridgeSyncJob::new(bridge.clone())),
            schedules.bridge_sync.as_deref(),
        )?;
        register(
            &mut scheduler,
            reconcile_job(
                Arc::new(ChatAdapter::new(bridge.clone(), store.clone())),
                &settings,
                &notifications,
            ),
            schedules.chat.as_deref(),
        )?;
        integrations.bridge = Some(bridge);
    }

    if let (Some(token), Some(org)) = (&args.github_token, &args.github_org) {
        let adapter = Arc::new(GitHubAdapter::new(
            Arc::new(GitHubClient::new(token, org)),
            store.clone(),
        ));
        register(
            &mut scheduler,
            reconcile_job(adapter.clone(), &settings, &notifications),
            schedules.github.as_deref(),
        )?;
        integrations.github = Some(adapter);
    }

    if let (Some(url), Some(id), Some(secret)) =
        (&args.wiki_url, &args.wiki_token_id, &args.wiki_token_secret)
    {
        let adapter = Arc::new(WikiAdapter::new(
            Arc::new(WikiClient::new(url, id, secret)),
            store.clone(),
        ));
        register(
            &mut scheduler,
            reconcile_job(adapter.clone(), &settings, &notifications),
            schedules.wiki.as_deref(),
        )?;
        integrations.wiki = Some(adapter);
    }

    if let (Some(token), Some(drive)) = (&args.drive_token, &args.drive_id) {
        let api = Arc::new(DriveClient::new(token, drive));
        register(
            &mut scheduler,
            reconcile_job(
                Arc::new(DriveAdapter::new(api, store.clone())),
                &settings,
                &notifications,
            ),
            schedules.drive.as_deref(),
        )?;
    }

    if let (Some(token), Some(drive)) = (&args.drive_token, &args.leads_drive_id) {
        let api = Arc::new(DriveClient::new(token, drive));
        register(
            &mut scheduler,
            reconcile_job(
                Arc::new(DriveAdapter::leads(api, store.clone())),
                &settings,
                &notifications,
            ),
            schedules.leads_drive.as_deref(),
        )?;
    }

    register(
        &mut scheduler,
        Arc::new(IncompleteProfilesJob::new(store.clone())),
        schedules.incomplete_profiles.as_deref(),
    )?;
    register(
        &mut scheduler,
        Arc::new(PurgeExpiredJob::new(store)),
        schedules.token_purge.as_deref(),
    )?;

    info!(jobs = ?scheduler.job_names(), "scheduler configured");
    Ok(Directories {
        scheduler,
        integrations,
    })
}
