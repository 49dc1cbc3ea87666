//! Writing derived roles to the role store.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use futures::StreamExt;
use futures::stream;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::derive::derive;
use super::groups::GroupTable;
use super::{BridgeError, ChatMember, ChatPlatform};
use crate::directory::Notifications;
use crate::models::User;
use crate::roles::{HierarchyTag, RoleSet, RoleStore, SetDiff};
use crate::store::{IdentityStore, UserRepository};
use crate::users::{self, Verification};

/// Members synced concurrently during a full pass.
const SYNC_CONCURRENCY: usize = 8;

/// What happened to one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced {
        roles: SetDiff,
        subteams: SetDiff,
        stripped_groups: Vec<String>,
    },
    SkippedBot,
    SkippedUnknownUser,
    NotInGuild,
}

/// Totals for a full pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub synced: usize,
    pub changed: usize,
    pub demoted: usize,
    pub failed: usize,
}

pub struct RoleBridge {
    platform: Arc<dyn ChatPlatform>,
    store: Arc<dyn IdentityStore>,
    roles: RoleStore,
    subteam_names: Vec<String>,
    table: RwLock<Arc<GroupTable>>,
    notifications: Notifications,
}

impl RoleBridge {
    /// Build the bridge and load the platform's group table.
    pub async fn connect(
        platform: Arc<dyn ChatPlatform>,
        store: Arc<dyn IdentityStore>,
        subteam_names: Vec<String>,
        notifications: Notifications,
    ) -> Result<Self, BridgeError> {
        let bridge = Self {
            platform,
            roles: RoleStore::new(store.clone()),
            store,
            subteam_names,
            table: RwLock::new(Arc::new(GroupTable::default())),
            notifications,
        };
        bridge.refresh_subteams().await?;
        Ok(bridge)
    }

    pub fn platform(&self) -> &Arc<dyn ChatPlatform> {
        &self.platform
    }

    pub fn roles(&self) -> &RoleStore {
        &self.roles
    }

    pub async fn table(&self) -> Arc<GroupTable> {
        self.table.read().await.clone()
    }

    /// Re-read the platform's groups and replace the subteam registry.
    pub async fn refresh_subteams(&self) -> Result<(), BridgeError> {
        let groups = self.platform.list_groups().await?;
        let table = GroupTable::from_groups(&groups, &self.subteam_names);
        self.roles.replace_subteams(table.subteams()).await?;
        *self.table.write().await = Arc::new(table);
        Ok(())
    }

    /// Sync one user from their current platform groups.
    pub async fn sync_member(&self, user_id: &str) -> Result<SyncOutcome, BridgeError> {
        match self.platform.get_member(user_id).await? {
            Some(member) => self.sync_chat_member(&member).await,
            None => Ok(SyncOutcome::NotInGuild),
        }
    }

    async fn sync_chat_member(&self, member: &ChatMember) -> Result<SyncOutcome, BridgeError> {
        if member.bot {
            return Ok(SyncOutcome::SkippedBot);
        }
        let Some(user) = self.store.get_user(&member.user_id).await? else {
            return Ok(SyncOutcome::SkippedUnknownUser);
        };

        let table = self.table().await;
        let derived = derive(&table, &member.group_ids);

        for group_id in &derived.strip_groups {
            self.platform.remove_group(&user.id, group_id).await?;
        }
        if !derived.strip_groups.is_empty() {
            info!(user_id = %user.id, groups = ?derived.strip_groups, "alumni groups corrected");
            self.notifications.send(format!(
                "Removed active-member groups from alumnus {} ({})",
                user.display_name(),
                user.id
            ));
        }

        let roles = self
            .roles
            .set_hierarchy(&user.id, derived.hierarchy.iter().copied())
            .await?;
        let subteams = self.roles.set_subteams(&user.id, &derived.subteams).await?;

        if !roles.is_empty() || !subteams.is_empty() {
            let now = self.roles.get_roles(&user.id).await?;
            self.notifications.send(format!(
                "Synced roles for {} ({}): {:?}",
                user.display_name(),
                user.id,
                now.hierarchy_names()
            ));
        } else {
            debug!(user_id = %user.id, "roles already in sync");
        }

        Ok(SyncOutcome::Synced {
            roles,
            subteams,
            stripped_groups: derived.strip_groups,
        })
    }

    /// Sync every guild member with an account, then demote users who have
    /// left the guild.
    pub async fn sync_all(&self) -> Result<SyncSummary, BridgeError> {
        let members = self.platform.list_members().await?;
        let present: HashSet<String> = members.iter().map(|m| m.user_id.clone()).collect();

        let outcomes: Vec<(String, Result<SyncOutcome, BridgeError>)> = stream::iter(members)
            .map(|member| async move {
                let result = self.sync_chat_member(&member).await;
                (member.user_id, result)
            })
            .buffer_unordered(SYNC_CONCURRENCY)
            .collect()
            .await;

        let mut summary = SyncSummary::default();
        for (user_id, outcome) in outcomes {
            match outcome {
                Ok(SyncOutcome::Synced {
                    roles,
                    subteams,
                    stripped_groups,
                }) => {
                    summary.synced += 1;
                    if !roles.is_empty() || !subteams.is_empty() || !stripped_groups.is_empty() {
                        summary.changed += 1;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(user_id, error = %e, "member sync failed");
                    summary.failed += 1;
                }
            }
        }

        for user in self.store.list_users().await? {
            if present.contains(&user.id) {
                continue;
            }
            match self.demote_departed(&user).await {
                Ok(true) => summary.demoted += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(user_id = %user.id, error = %e, "demoting departed user failed");
                    summary.failed += 1;
                }
            }
        }

        info!(
            synced = summary.synced,
            changed = summary.changed,
            demoted = summary.demoted,
            failed = summary.failed,
            "chat role sync finished"
        );
        Ok(summary)
    }

    /// A user no longer in the guild keeps only alumni standing, if they had
    /// it. Link tags stay; downstream adapters clean up external access.
    async fn demote_departed(&self, user: &User) -> Result<bool, BridgeError> {
        let current = self.roles.get_roles(&user.id).await?;
        let keep: Vec<HierarchyTag> = if current.is_alumni() {
            vec![HierarchyTag::Alumni]
        } else {
            Vec::new()
        };
        let roles = self.roles.set_hierarchy(&user.id, keep).await?;
        let subteams = self.roles.set_subteams(&user.id, &BTreeSet::new()).await?;
        let changed = !roles.is_empty() || !subteams.is_empty();
        if changed {
            info!(user_id = %user.id, "user left the guild, roles reduced");
            self.notifications.send(format!(
                "{} ({}) is no longer in the server; roles reduced",
                user.display_name(),
                user.id
            ));
        }
        Ok(changed)
    }

    /// Verify a guild member: create or replace their account, then sync
    /// their roles.
    pub async fn verify(&self, input: Verification) -> Result<User, BridgeError> {
        let member = self
            .platform
            .get_member(&input.id)
            .await?
            .ok_or_else(|| BridgeError::NotAMember(input.id.clone()))?;
        let table = self.table().await;
        let platform_roles: RoleSet = derive(&table, &member.group_ids)
            .hierarchy
            .into_iter()
            .collect();

        let user = users::verify_user(self.store.as_ref(), input, &platform_roles).await?;
        self.sync_chat_member(&member).await?;
        self.notifications
            .send(format!("Verified {} ({})", user.display_name(), user.id));
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::groups::testing::{GROUPS, subteam_names};
    use crate::bridge::testing::FakePlatform;
    use crate::roles::LinkTag;
    use crate::store::MemoryStore;

    async fn bridge(platform: Arc<FakePlatform>) -> (Arc<MemoryStore>, RoleBridge) {
        let store = Arc::new(MemoryStore::new());
        let bridge = RoleBridge::connect(
            platform,
            store.clone(),
            subteam_names(),
            Notifications::disabled(),
        )
        .await
        .unwrap();
        (store, bridge)
    }

    async fn add_user(store: &MemoryStore, id: &str) {
        store
            .upsert_user(&User::new(id, id, format!("{id}@org.example")))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn connect_loads_subteams() {
        let platform = Arc::new(FakePlatform::with_groups(&GROUPS));
        let (_, bridge) = bridge(platform).await;
        let subteams = bridge.roles().list_subteams().await.unwrap();
        let names: Vec<_> = subteams.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"Aero"));
        assert!(names.contains(&"Chassis"));
    }

    #[tokio::test]
    async fn alumni_with_subteam_is_corrected_on_both_sides() {
        let platform = Arc::new(FakePlatform::with_groups(&GROUPS));
        platform.add_member("u1", &["g-alumni", "g-aero"]);
        let (store, bridge) = bridge(platform.clone()).await;
        add_user(&store, "u1").await;
        bridge
            .roles()
            .set_subteams("u1", &["g-aero".to_string()].into())
            .await
            .unwrap();

        let outcome = bridge.sync_member("u1").await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Synced { ref stripped_groups, .. } if stripped_groups == &vec!["g-aero".to_string()]));

        let roles = bridge.roles().get_roles("u1").await.unwrap();
        assert_eq!(roles.hierarchy_names(), vec!["alumni".to_string()]);
        assert!(bridge.roles().get_subteams("u1").await.unwrap().is_empty());
        assert_eq!(platform.groups_of("u1"), vec!["g-alumni".to_string()]);
    }

    #[tokio::test]
    async fn sync_keeps_link_tags_and_is_idempotent() {
        let platform = Arc::new(FakePlatform::with_groups(&GROUPS));
        platform.add_member("u1", &["g-member", "g-lead", "g-chassis"]);
        let (store, bridge) = bridge(platform).await;
        add_user(&store, "u1").await;
        bridge.roles().link("u1", LinkTag::github("octocat")).await.unwrap();

        bridge.sync_member("u1").await.unwrap();
        let roles = bridge.roles().get_roles("u1").await.unwrap();
        assert!(roles.is_lead() && roles.is_current_member());
        assert!(roles.links().any(|l| l == &LinkTag::github("octocat")));

        match bridge.sync_member("u1").await.unwrap() {
            SyncOutcome::Synced { roles, subteams, .. } => {
                assert!(roles.is_empty());
                assert!(subteams.is_empty());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn skips_bots_and_unknown_users() {
        let platform = Arc::new(FakePlatform::with_groups(&GROUPS));
        platform.add_member("stranger", &["g-member"]);
        platform.members.lock().unwrap().push(ChatMember {
            user_id: "bot".into(),
            username: "bot".into(),
            nick: None,
            bot: true,
            group_ids: vec!["g-bot".into()],
        });
        let (store, bridge) = bridge(platform).await;
        add_user(&store, "bot").await;

        assert_eq!(
            bridge.sync_member("stranger").await.unwrap(),
            SyncOutcome::SkippedUnknownUser
        );
        assert_eq!(bridge.sync_member("bot").await.unwrap(), SyncOutcome::SkippedBot);
        assert_eq!(bridge.sync_member("gone").await.unwrap(), SyncOutcome::NotInGuild);
    }

    #[tokio::test]
    async fn sync_all_demotes_departed_users() {
        let platform = Arc::new(FakePlatform::with_groups(&GROUPS));
        platform.add_member("here", &["g-member"]);
        let (store, bridge) = bridge(platform).await;
        for id in ["here", "left-alumnus", "left-member"] {
            add_user(&store, id).await;
        }
        bridge
            .roles()
            .set_roles("left-alumnus", &RoleSet::from_strings(["alumni", "admin", "wiki:3"]))
            .await
            .unwrap();
        bridge
            .roles()
            .set_roles("left-member", &RoleSet::from_strings(["current_member", "lead"]))
            .await
            .unwrap();

        let summary = bridge.sync_all().await.unwrap();
        assert_eq!(summary.synced, 1);
        assert_eq!(summary.demoted, 2);
        assert_eq!(summary.failed, 0);

        let alumnus = bridge.roles().get_roles("left-alumnus").await.unwrap();
        assert_eq!(alumnus, RoleSet::from_strings(["alumni", "wiki:3"]));
        assert!(bridge.roles().get_roles("left-member").await.unwrap().is_empty());
        assert!(bridge.roles().get_roles("here").await.unwrap().is_current_member());

        let again = bridge.sync_all().await.unwrap();
        assert_eq!(again.demoted, 0);
        assert_eq!(again.changed, 0);
    }

    #[tokio::test]
    async fn verify_requires_guild_standing() {
        let platform = Arc::new(FakePlatform::with_groups(&GROUPS));
        platform.add_member("u1", &["g-member", "g-aero"]);
        platform.add_member("u2", &["g-aero"]);
        let (_, bridge) = bridge(platform).await;

        let input = |id: &str| Verification {
            id: id.into(),
            username: id.into(),
            first_name: "Gaucho".into(),
            last_name: "Racer".into(),
            email: format!("{id}@org.example"),
            avatar_url: String::new(),
        };

        let user = bridge.verify(input("u1")).await.unwrap();
        assert!(user.verified);
        assert!(bridge.roles().get_roles("u1").await.unwrap().is_current_member());
        assert_eq!(
            bridge.roles().get_subteams("u1").await.unwrap(),
            ["g-aero".to_string()].into()
        );

        assert!(matches!(
            bridge.verify(input("u2")).await,
            Err(BridgeError::User(users::UserError::NoStanding(_)))
        ));
        assert!(matches!(
            bridge.verify(input("u3")).await,
            Err(BridgeError::NotAMember(_))
        ));
    }
}
