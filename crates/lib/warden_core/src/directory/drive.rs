//! Shared-storage adapter: drive permissions keyed by email.
//!
//! The same adapter drives the member drive and the leads drive; only the
//! access policy differs.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{DirectoryAdapter, DirectoryEntry, DirectoryError, MissingEntry};
use crate::clients::ClientError;
use crate::models::User;
use crate::roles::RoleStore;
use crate::store::{IdentityStore, UserRepository};

/// Access level on the shared drive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DriveRole {
    Organizer,
    Writer,
    /// Any level this service does not grant (reader, commenter, ...).
    Other(String),
}

impl DriveRole {
    pub fn parse(s: &str) -> Self {
        match s {
            "organizer" => DriveRole::Organizer,
            "writer" => DriveRole::Writer,
            other => DriveRole::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DriveRole::Organizer => "organizer",
            DriveRole::Writer => "writer",
            DriveRole::Other(s) => s,
        }
    }
}

impl fmt::Display for DriveRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DriveRole {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DriveRole {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Ok(DriveRole::parse(&raw))
    }
}

/// One permission on the drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrivePermission {
    pub id: String,
    pub email: String,
    pub role: DriveRole,
}

/// Drive permission API.
#[async_trait]
pub trait DrivePermissions: Send + Sync {
    async fn list_permissions(&self) -> Result<Vec<DrivePermission>, ClientError>;

    async fn create_permission(&self, email: &str, role: &DriveRole) -> Result<(), ClientError>;

    async fn delete_permission(&self, permission_id: &str) -> Result<(), ClientError>;
}

/// Who a drive is shared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveAccess {
    /// Inner circle organizes, current members write.
    Shared,
    /// Inner circle organizes, nobody else has access.
    LeadsOnly,
}

pub struct DriveAdapter {
    api: Arc<dyn DrivePermissions>,
    store: Arc<dyn IdentityStore>,
    roles: RoleStore,
    access: DriveAccess,
}

impl DriveAdapter {
    /// The member drive.
    pub fn new(api: Arc<dyn DrivePermissions>, store: Arc<dyn IdentityStore>) -> Self {
        Self::with_access(api, store, DriveAccess::Shared)
    }

    /// The leads drive.
    pub fn leads(api: Arc<dyn DrivePermissions>, store: Arc<dyn IdentityStore>) -> Self {
        Self::with_access(api, store, DriveAccess::LeadsOnly)
    }

    pub fn with_access(
        api: Arc<dyn DrivePermissions>,
        store: Arc<dyn IdentityStore>,
        access: DriveAccess,
    ) -> Self {
        Self {
            api,
            roles: RoleStore::new(store.clone()),
            store,
            access,
        }
    }

    pub fn access(&self) -> DriveAccess {
        self.access
    }
}

#[async_trait]
impl DirectoryAdapter for DriveAdapter {
    type Role = DriveRole;

    fn name(&self) -> &'static str {
        match self.access {
            DriveAccess::Shared => "drive",
            DriveAccess::LeadsOnly => "leads drive",
        }
    }

    async fn list_current_members(&self) -> Result<Vec<DirectoryEntry<DriveRole>>, DirectoryError> {
        Ok(self
            .api
            .list_permissions()
            .await?
            .into_iter()
            .filter(|p| !p.email.is_empty())
            .map(|p| DirectoryEntry {
                identity: p.email,
                external_id: p.id,
                current: p.role,
            })
            .collect())
    }

    async fn resolve_internal_user(
        &self,
        entry: &DirectoryEntry<DriveRole>,
    ) -> Result<Option<User>, DirectoryError> {
        Ok(self.store.find_user_by_email(&entry.identity).await?)
    }

    async fn desired_role_for(&self, user: &User) -> Result<Option<DriveRole>, DirectoryError> {
        let roles = self.roles.get_roles(&user.id).await?;
        Ok(if roles.is_inner_circle() {
            Some(DriveRole::Organizer)
        } else if self.access == DriveAccess::Shared && roles.is_current_member() {
            Some(DriveRole::Writer)
        } else {
            None
        })
    }

    async fn grant(
        &self,
        _user: &User,
        entry: &DirectoryEntry<DriveRole>,
        role: &DriveRole,
    ) -> Result<(), DirectoryError> {
        Ok(self.api.create_permission(&entry.identity, role).await?)
    }

    async fn revoke(&self, entry: &DirectoryEntry<DriveRole>) -> Result<(), DirectoryError> {
        Ok(self.api.delete_permission(&entry.external_id).await?)
    }

    /// Entitled users whose email holds no permission.
    async fn list_missing(
        &self,
        present: &[DirectoryEntry<DriveRole>],
    ) -> Result<Vec<MissingEntry<DriveRole>>, DirectoryError> {
        let present: HashSet<String> = present.iter().map(|e| e.identity.to_lowercase()).collect();
        let mut missing = Vec::new();
        for user in self.store.list_users().await? {
            if user.email.is_empty() || present.contains(&user.email.to_lowercase()) {
                continue;
            }
            if let Some(role) = self.desired_role_for(&user).await? {
                missing.push(MissingEntry {
                    identity: user.email.clone(),
                    user,
                    role,
                });
            }
        }
        Ok(missing)
    }

    async fn add(&self, missing: &MissingEntry<DriveRole>) -> Result<(), DirectoryError> {
        Ok(self
            .api
            .create_permission(&missing.identity, &missing.role)
            .await?)
    }
}
