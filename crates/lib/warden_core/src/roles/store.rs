//! Replacement-semantics access to role and subteam sets.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use super::{HierarchyTag, LinkSystem, LinkTag, RoleSet, RoleTag};
use crate::models::{Subteam, User};
use crate::store::{
    IdentityStore, RoleRepository, StoreError, SubteamRepository, UserRepository,
};

/// Entries added and removed by a replacement write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl SetDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    fn between(current: &BTreeSet<String>, desired: &BTreeSet<String>) -> Self {
        Self {
            added: desired.difference(current).cloned().collect(),
            removed: current.difference(desired).cloned().collect(),
        }
    }
}

/// Authoritative user → roles and user → subteams mapping.
///
/// Callers hand over the full desired set; only the difference against what
/// is stored gets written, so repeating a call is a no-op.
#[derive(Clone)]
pub struct RoleStore {
    store: Arc<dyn IdentityStore>,
}

impl RoleStore {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    pub async fn get_roles(&self, user_id: &str) -> Result<RoleSet, StoreError> {
        let raw = self.store.list_role_tags(user_id).await?;
        Ok(RoleSet::from_strings(raw))
    }

    pub async fn set_roles(&self, user_id: &str, desired: &RoleSet) -> Result<SetDiff, StoreError> {
        let current: BTreeSet<String> = self
            .store
            .list_role_tags(user_id)
            .await?
            .into_iter()
            .collect();
        let diff = SetDiff::between(&current, &desired.encode());
        for tag in &diff.added {
            self.store.add_role_tag(user_id, tag).await?;
        }
        for tag in &diff.removed {
            self.store.remove_role_tag(user_id, tag).await?;
        }
        if !diff.is_empty() {
            debug!(user_id, added = ?diff.added, removed = ?diff.removed, "roles updated");
        }
        Ok(diff)
    }

    /// Replace only the hierarchy tags, keeping links and unknown entries.
    pub async fn set_hierarchy<I>(&self, user_id: &str, hierarchy: I) -> Result<SetDiff, StoreError>
    where
        I: IntoIterator<Item = HierarchyTag>,
    {
        let current = self.get_roles(user_id).await?;
        self.set_roles(user_id, &current.with_hierarchy(hierarchy))
            .await
    }

    /// Record a foreign identity, replacing any earlier link to the same system.
    pub async fn link(&self, user_id: &str, link: LinkTag) -> Result<SetDiff, StoreError> {
        let mut roles = self.get_roles(user_id).await?;
        if let Some(existing) = roles.link_for(link.system).cloned() {
            roles.remove(&RoleTag::Link(existing));
        }
        roles.insert(link);
        self.set_roles(user_id, &roles).await
    }

    pub async fn unlink(&self, user_id: &str, system: LinkSystem) -> Result<SetDiff, StoreError> {
        let mut roles = self.get_roles(user_id).await?;
        if let Some(existing) = roles.link_for(system).cloned() {
            roles.remove(&RoleTag::Link(existing));
        }
        self.set_roles(user_id, &roles).await
    }

    pub async fn find_user_by_link(&self, link: &LinkTag) -> Result<Option<User>, StoreError> {
        let ids = self.store.find_users_with_tag(&link.to_string()).await?;
        match ids.first() {
            Some(id) => self.store.get_user(id).await,
            None => Ok(None),
        }
    }

    pub async fn get_subteams(&self, user_id: &str) -> Result<BTreeSet<String>, StoreError> {
        Ok(self
            .store
            .list_user_subteams(user_id)
            .await?
            .into_iter()
            .collect())
    }

    pub async fn set_subteams(
        &self,
        user_id: &str,
        desired: &BTreeSet<String>,
    ) -> Result<SetDiff, StoreError> {
        let current = self.get_subteams(user_id).await?;
        let diff = SetDiff::between(&current, desired);
        for id in &diff.added {
            self.store.add_user_subteam(user_id, id).await?;
        }
        for id in &diff.removed {
            self.store.remove_user_subteam(user_id, id).await?;
        }
        if !diff.is_empty() {
            debug!(user_id, added = ?diff.added, removed = ?diff.removed, "subteams updated");
        }
        Ok(diff)
    }

    pub async fn list_subteams(&self) -> Result<Vec<Subteam>, StoreError> {
        self.store.list_subteams().await
    }

    pub async fn replace_subteams(&self, subteams: &[Subteam]) -> Result<(), StoreError> {
        self.store.replace_subteams(subteams).await
    }
}
