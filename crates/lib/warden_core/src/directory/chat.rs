//! Chat-platform group adapter.
//!
//! Unlike the other directories the chat platform is also the source of
//! roles, so the two can disagree in both directions. A member the role
//! store gives no standing who nonetheless holds an elevated group, or one
//! whose elevated group differs from the store, is a conflict: the bridge
//! re-derives their roles from the platform instead of the pass stripping
//! them.

use std::sync::Arc;

use async_trait::async_trait;

use super::{DirectoryAdapter, DirectoryEntry, DirectoryError};
use crate::bridge::{GroupTable, RoleBridge};
use crate::models::User;
use crate::roles::HierarchyTag;
use crate::store::{IdentityStore, UserRepository};

/// A member's standing as the platform sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatStanding {
    /// Holds the member group.
    Member,
    Alumni,
    /// Holds managed groups but neither of the above. Elevated groups alone
    /// (admin, officer, lead) confer no standing.
    Unaffiliated,
}

fn standing_of(table: &GroupTable, group_ids: &[String]) -> ChatStanding {
    let tags: Vec<HierarchyTag> = group_ids.iter().filter_map(|g| table.hierarchy_of(g)).collect();
    if tags.contains(&HierarchyTag::Alumni) {
        ChatStanding::Alumni
    } else if tags.contains(&HierarchyTag::CurrentMember) {
        ChatStanding::Member
    } else {
        ChatStanding::Unaffiliated
    }
}

pub struct ChatAdapter {
    bridge: Arc<RoleBridge>,
    store: Arc<dyn IdentityStore>,
}

impl ChatAdapter {
    pub fn new(bridge: Arc<RoleBridge>, store: Arc<dyn IdentityStore>) -> Self {
        Self { bridge, store }
    }
}

#[async_trait]
impl DirectoryAdapter for ChatAdapter {
    type Role = ChatStanding;

    fn name(&self) -> &'static str {
        "chat"
    }

    /// Non-bot members holding at least one managed group.
    async fn list_current_members(&self) -> Result<Vec<DirectoryEntry<ChatStanding>>, DirectoryError> {
        let table = self.bridge.table().await;
        let members = self.bridge.platform().list_members().await?;
        Ok(members
            .into_iter()
            .filter(|m| !m.bot)
            .filter(|m| m.group_ids.iter().any(|g| table.is_managed(g)))
            .map(|m| DirectoryEntry {
                current: standing_of(&table, &m.group_ids),
                external_id: m.user_id.clone(),
                identity: m.user_id,
            })
            .collect())
    }

    async fn resolve_internal_user(
        &self,
        entry: &DirectoryEntry<ChatStanding>,
    ) -> Result<Option<User>, DirectoryError> {
        Ok(self.store.get_user(&entry.external_id).await?)
    }

    async fn desired_role_for(&self, user: &User) -> Result<Option<ChatStanding>, DirectoryError> {
        let roles = self.bridge.roles().get_roles(&user.id).await?;
        Ok(if roles.is_current_member() {
            Some(ChatStanding::Member)
        } else if roles.is_alumni() {
            Some(ChatStanding::Alumni)
        } else {
            None
        })
    }

    async fn grant(
        &self,
        _user: &User,
        entry: &DirectoryEntry<ChatStanding>,
        role: &ChatStanding,
    ) -> Result<(), DirectoryError> {
        let tag = match role {
            ChatStanding::Member => HierarchyTag::CurrentMember,
            ChatStanding::Alumni => HierarchyTag::Alumni,
            ChatStanding::Unaffiliated => return Ok(()),
        };
        let table = self.bridge.table().await;
        if let Some(group_id) = table.group_for(tag) {
            self.bridge
                .platform()
                .add_group(&entry.external_id, group_id)
                .await?;
        }
        Ok(())
    }

    /// Strip every managed group. Bot and unmanaged groups stay.
    async fn revoke(&self, entry: &DirectoryEntry<ChatStanding>) -> Result<(), DirectoryError> {
        let platform = self.bridge.platform();
        let Some(member) = platform.get_member(&entry.external_id).await? else {
            return Ok(());
        };
        let table = self.bridge.table().await;
        for group_id in member.group_ids.iter().filter(|g| table.is_managed(g)) {
            platform.remove_group(&member.user_id, group_id).await?;
        }
        Ok(())
    }

    /// Only reached from [`ChatStanding::Unaffiliated`]; the missing group is
    /// added without touching subteam groups.
    async fn replace(
        &self,
        user: &User,
        entry: &DirectoryEntry<ChatStanding>,
        role: &ChatStanding,
    ) -> Result<(), DirectoryError> {
        self.grant(user, entry, role).await
    }

    fn is_conflict(
        &self,
        _user: &User,
        entry: &DirectoryEntry<ChatStanding>,
        desired: Option<&ChatStanding>,
    ) -> bool {
        if entry.current == ChatStanding::Unaffiliated {
            return false;
        }
        desired != Some(&entry.current)
    }

    async fn rederive(&self, user: &User) -> Result<(), DirectoryError> {
        self.bridge.sync_member(&user.id).await?;
        Ok(())
    }
}
