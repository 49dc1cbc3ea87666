//! The scheduled passes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use super::{Job, JobError};
use crate::bridge::RoleBridge;
use crate::directory::{DirectoryAdapter, Reconciler};
use crate::store::{AuthCodeRepository, IdentityStore, RefreshTokenRepository};
use crate::users;

/// Names listed in the incomplete-profile summary before it is cut off.
const PROFILE_LIST_LIMIT: usize = 20;

/// One reconciliation pass over an external directory.
pub struct ReconcileJob<A: DirectoryAdapter> {
    name: String,
    reconciler: Reconciler<A>,
}

impl<A: DirectoryAdapter> ReconcileJob<A> {
    pub fn new(reconciler: Reconciler<A>) -> Self {
        Self {
            name: format!("{} reconciliation", reconciler.adapter().name()),
            reconciler,
        }
    }
}

#[async_trait]
impl<A: DirectoryAdapter + 'static> Job for ReconcileJob<A> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<String, JobError> {
        let r = self.reconciler.run().await?;
        Ok(format!(
            "examined {}, replaced {}, revoked {}, added {}, conflicts {}, skipped {}, errors {}",
            r.examined, r.replaced, r.revoked, r.added, r.conflicts, r.skipped, r.errors
        ))
    }
}

/// Refresh the subteam registry, then sync every chat member's roles.
pub struct BridgeSyncJob {
    bridge: Arc<RoleBridge>,
}

impl BridgeSyncJob {
    pub fn new(bridge: Arc<RoleBridge>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl Job for BridgeSyncJob {
    fn name(&self) -> &str {
        "role sync"
    }

    async fn run(&self) -> Result<String, JobError> {
        self.bridge.refresh_subteams().await?;
        let s = self.bridge.sync_all().await?;
        Ok(format!(
            "synced {}, changed {}, demoted {}, failed {}",
            s.synced, s.changed, s.demoted, s.failed
        ))
    }
}

/// Reports users whose profile is missing required fields.
pub struct IncompleteProfilesJob {
    store: Arc<dyn IdentityStore>,
}

impl IncompleteProfilesJob {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Job for IncompleteProfilesJob {
    fn name(&self) -> &str {
        "profile check"
    }

    async fn run(&self) -> Result<String, JobError> {
        let users = users::incomplete_profiles(self.store.as_ref()).await?;
        debug!(count = users.len(), "incomplete profiles");
        if users.is_empty() {
            return Ok("all profiles complete".into());
        }
        let mut names: Vec<String> = users
            .iter()
            .take(PROFILE_LIST_LIMIT)
            .map(|u| u.display_name())
            .collect();
        if users.len() > PROFILE_LIST_LIMIT {
            names.push(format!("and {} more", users.len() - PROFILE_LIST_LIMIT));
        }
        Ok(format!(
            "{} incomplete profiles: {}",
            users.len(),
            names.join(", ")
        ))
    }
}

/// Deletes spent authorization codes and dead refresh tokens.
pub struct PurgeExpiredJob {
    store: Arc<dyn IdentityStore>,
}

impl PurgeExpiredJob {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Job for PurgeExpiredJob {
    fn name(&self) -> &str {
        "token cleanup"
    }

    async fn run(&self) -> Result<String, JobError> {
        let now = Utc::now();
        let codes = self.store.purge_expired_codes(now).await?;
        let tokens = self.store.purge_expired_refresh_tokens(now).await?;
        info!(codes, tokens, "expired grants purged");
        Ok(format!(
            "purged {codes} authorization codes, {tokens} refresh tokens"
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::bridge::group_fixtures::{GROUPS, subteam_names};
    use crate::bridge::testing::FakePlatform;
    use crate::clients::ClientError;
    use crate::directory::github::{GitHubAdapter, OrgMember, OrgMemberships, OrgRole};
    use crate::directory::{KeepList, Notifications};
    use crate::models::{AuthorizationCode, RefreshTokenRecord, User};
    use crate::store::{MemoryStore, RoleRepository, UserRepository};

    #[derive(Default)]
    struct Org(Mutex<HashMap<String, OrgRole>>);

    #[async_trait]
    impl OrgMemberships for Org {
        async fn list_members(&self) -> Result<Vec<OrgMember>, ClientError> {
            Ok(self
                .0
                .lock()
                .unwrap()
                .iter()
                .map(|(login, role)| OrgMember {
                    login: login.clone(),
                    role: *role,
                })
                .collect())
        }

        async fn set_membership(&self, login: &str, role: OrgRole) -> Result<(), ClientError> {
            self.0.lock().unwrap().insert(login.to_string(), role);
            Ok(())
        }

        async fn remove_membership(&self, login: &str) -> Result<(), ClientError> {
            self.0.lock().unwrap().remove(login);
            Ok(())
        }
    }

    #[tokio::test]
    async fn reconcile_job_summarises_the_pass() {
        let store = Arc::new(MemoryStore::new());
        let org = Arc::new(Org::default());
        org.0
            .lock()
            .unwrap()
            .insert("ghost".to_string(), OrgRole::Member);
        let adapter = Arc::new(GitHubAdapter::new(org.clone(), store));
        let job = ReconcileJob::new(Reconciler::new(
            adapter,
            KeepList::default(),
            Notifications::disabled(),
        ));

        assert_eq!(job.name(), "github reconciliation");
        let summary = job.run().await.unwrap();
        assert!(summary.contains("revoked 1"), "{summary}");
        assert!(org.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn bridge_job_syncs_members() {
        let platform = Arc::new(FakePlatform::with_groups(&GROUPS));
        platform.add_member("u1", &["g-member", "g-aero"]);
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_user(&User::new("u1", "u1", "u1@org.example"))
            .await
            .unwrap();
        let bridge = RoleBridge::connect(
            platform,
            store.clone(),
            subteam_names(),
            Notifications::disabled(),
        )
        .await
        .unwrap();

        let summary = BridgeSyncJob::new(Arc::new(bridge)).run().await.unwrap();
        assert!(summary.starts_with("synced 1"), "{summary}");
        assert!(
            store
                .list_role_tags("u1")
                .await
                .unwrap()
                .contains(&"current_member".to_string())
        );
    }

    #[tokio::test]
    async fn profile_job_lists_incomplete_users() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_user(&User::new("u1", "gaucho", "g@org.example"))
            .await
            .unwrap();
        let summary = IncompleteProfilesJob::new(store).run().await.unwrap();
        assert!(summary.starts_with("1 incomplete profiles"), "{summary}");
    }

    #[tokio::test]
    async fn profile_job_on_empty_store() {
        let store = Arc::new(MemoryStore::new());
        let summary = IncompleteProfilesJob::new(store).run().await.unwrap();
        assert_eq!(summary, "all profiles complete");
    }

    #[tokio::test]
    async fn purge_job_reports_what_it_removed() {
        let store = Arc::new(MemoryStore::new());
        let past = Utc::now() - chrono::Duration::hours(1);
        store
            .insert_code(&AuthorizationCode {
                code_hash: "old".into(),
                client_id: "acme".into(),
                user_id: "u1".into(),
                scope: "user:read".into(),
                redirect_uri: "https://acme.example/cb".into(),
                expires_at: past,
                created_at: past,
            })
            .await
            .unwrap();
        store
            .insert_refresh_token(&RefreshTokenRecord {
                id: uuid::Uuid::now_v7(),
                token_hash: "old".into(),
                user_id: "u1".into(),
                client_id: "acme".into(),
                scope: "user:read".into(),
                expires_at: past,
                revoked_at: None,
                created_at: past,
            })
            .await
            .unwrap();

        let job = PurgeExpiredJob::new(store.clone());
        assert_eq!(job.name(), "token cleanup");
        assert_eq!(
            job.run().await.unwrap(),
            "purged 1 authorization codes, 1 refresh tokens"
        );
        assert_eq!(
            job.run().await.unwrap(),
            "purged 0 authorization codes, 0 refresh tokens"
        );
    }
}
