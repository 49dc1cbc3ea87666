//! Source-hosting organization adapter, keyed by the `github:<login>` link.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use tracing::info;

use super::{DirectoryAdapter, DirectoryEntry, DirectoryError, MissingEntry};
use crate::clients::ClientError;
use crate::models::User;
use crate::roles::{LinkSystem, LinkTag, RoleSet, RoleStore};
use crate::store::{IdentityStore, UserRepository};

/// Longest login the platform accepts.
const MAX_LOGIN_LEN: usize = 39;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgRole {
    Admin,
    Member,
}

impl OrgRole {
    pub fn as_str(self) -> &'static str {
        match self {
            OrgRole::Admin => "admin",
            OrgRole::Member => "member",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgMember {
    pub login: String,
    pub role: OrgRole,
}

/// Organization membership API.
#[async_trait]
pub trait OrgMemberships: Send + Sync {
    async fn list_members(&self) -> Result<Vec<OrgMember>, ClientError>;

    /// Add or update a membership. Also used to change role in place.
    async fn set_membership(&self, login: &str, role: OrgRole) -> Result<(), ClientError>;

    async fn remove_membership(&self, login: &str) -> Result<(), ClientError>;
}

pub struct GitHubAdapter {
    api: Arc<dyn OrgMemberships>,
    store: Arc<dyn IdentityStore>,
    roles: RoleStore,
}

impl GitHubAdapter {
    pub fn new(api: Arc<dyn OrgMemberships>, store: Arc<dyn IdentityStore>) -> Self {
        Self {
            api,
            roles: RoleStore::new(store.clone()),
            store,
        }
    }

    /// Invite `login` to the organization on behalf of `user` and record the
    /// `github:<login>` link. Linking a new login replaces the old link; the
    /// next pass removes the old membership as an orphan.
    pub async fn link_account(&self, user: &User, login: &str) -> Result<OrgRole, DirectoryError> {
        let login = login.trim();
        if !valid_login(login) {
            return Err(DirectoryError::InvalidEntry(format!("github username: {login:?}")));
        }

        let link = LinkTag::github(login);
        if let Some(holder) = self.roles.find_user_by_link(&link).await?
            && holder.id != user.id
        {
            return Err(DirectoryError::AlreadyLinked(link.to_string()));
        }

        let roles = self.roles.get_roles(&user.id).await?;
        let Some(role) = org_role(&roles) else {
            return Err(DirectoryError::NotEntitled(format!(
                "{} holds no standing",
                user.id
            )));
        };

        self.api.set_membership(login, role).await?;
        self.roles.link(&user.id, link).await?;
        info!(user_id = %user.id, login, role = role.as_str(), "github account linked");
        Ok(role)
    }
}

fn valid_login(login: &str) -> bool {
    !login.is_empty()
        && login.len() <= MAX_LOGIN_LEN
        && !login.starts_with('-')
        && !login.ends_with('-')
        && login.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn org_role(roles: &RoleSet) -> Option<OrgRole> {
    if roles.is_inner_circle() {
        Some(OrgRole::Admin)
    } else if roles.is_current_member() || roles.is_alumni() {
        Some(OrgRole::Member)
    } else {
        None
    }
}

#[async_trait]
impl DirectoryAdapter for GitHubAdapter {
    type Role = OrgRole;

    fn name(&self) -> &'static str {
        "github"
    }

    async fn list_current_members(&self) -> Result<Vec<DirectoryEntry<OrgRole>>, DirectoryError> {
        Ok(self
            .api
            .list_members()
            .await?
            .into_iter()
            .map(|m| DirectoryEntry {
                external_id: m.login.clone(),
                identity: m.login,
                current: m.role,
            })
            .collect())
    }

    async fn resolve_internal_user(
        &self,
        entry: &DirectoryEntry<OrgRole>,
    ) -> Result<Option<User>, DirectoryError> {
        Ok(self
            .roles
            .find_user_by_link(&LinkTag::github(&entry.identity))
            .await?)
    }

    async fn desired_role_for(&self, user: &User) -> Result<Option<OrgRole>, DirectoryError> {
        Ok(org_role(&self.roles.get_roles(&user.id).await?))
    }

    async fn grant(
        &self,
        _user: &User,
        entry: &DirectoryEntry<OrgRole>,
        role: &OrgRole,
    ) -> Result<(), DirectoryError> {
        Ok(self.api.set_membership(&entry.external_id, *role).await?)
    }

    async fn revoke(&self, entry: &DirectoryEntry<OrgRole>) -> Result<(), DirectoryError> {
        Ok(self.api.remove_membership(&entry.external_id).await?)
    }

    /// Linked, entitled users whose login is not in the organization.
    async fn list_missing(
        &self,
        present: &[DirectoryEntry<OrgRole>],
    ) -> Result<Vec<MissingEntry<OrgRole>>, DirectoryError> {
        let present: HashSet<String> = present.iter().map(|e| e.identity.to_lowercase()).collect();
        let mut missing = Vec::new();
        for user in self.store.list_users().await? {
            let roles = self.roles.get_roles(&user.id).await?;
            let Some(link) = roles.link_for(LinkSystem::GitHub) else {
                continue;
            };
            if present.contains(&link.identifier.to_lowercase()) {
                continue;
            }
            if let Some(role) = org_role(&roles) {
                missing.push(MissingEntry {
                    identity: link.identifier.clone(),
                    user,
                    role,
                });
            }
        }
        Ok(missing)
    }

    async fn add(&self, missing: &MissingEntry<OrgRole>) -> Result<(), DirectoryError> {
        Ok(self.api.set_membership(&missing.identity, missing.role).await?)
    }

    /// Membership role changes are applied in place.
    async fn replace(
        &self,
        user: &User,
        entry: &DirectoryEntry<OrgRole>,
        role: &OrgRole,
    ) -> Result<(), DirectoryError> {
        self.grant(user, entry, role).await
    }
}
