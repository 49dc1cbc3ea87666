//! Directory reconciliation.
//!
//! Every external directory (shared storage, source-hosting organization,
//! wiki, chat-platform groups) is driven through a [`DirectoryAdapter`]. The
//! [`Reconciler`] walks the directory's current membership and converges each
//! entry on what the role store says it should be, then adds the entitled
//! users the directory does not list.

pub mod chat;
pub mod drive;
pub mod github;
pub mod notify;
mod reconciler;
pub mod wiki;

use std::collections::HashSet;
use std::fmt::Debug;

use async_trait::async_trait;
use thiserror::Error;

use crate::bridge::BridgeError;
use crate::clients::ClientError;
use crate::models::User;
use crate::store::StoreError;

pub use notify::{AuditNotifier, ChatNotifier, Notifications};
pub use reconciler::{ReconcileReport, Reconciler};

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Directory API error: {0}")]
    Client(#[from] ClientError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    #[error("Not entitled to access: {0}")]
    NotEntitled(String),

    #[error("Already linked: {0}")]
    AlreadyLinked(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// One membership record in an external directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry<R> {
    /// The identity the directory knows the member by: an email, a login, a
    /// numeric account id, a chat user id.
    pub identity: String,
    /// Directory-side handle needed to act on the entry (permission id,
    /// account id). Equal to `identity` when the directory has no separate
    /// handle.
    pub external_id: String,
    pub current: R,
}

/// An entitled user the directory does not list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingEntry<R> {
    pub user: User,
    /// The identity the new entry will be listed under.
    pub identity: String,
    pub role: R,
}

/// Per-deployment reconciliation knobs.
#[derive(Debug, Clone)]
pub struct DirectorySettings {
    /// Identities every pass leaves alone (service accounts, owners).
    pub keep_list: Vec<String>,
    pub concurrency: usize,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            keep_list: Vec::new(),
            concurrency: reconciler::DEFAULT_CONCURRENCY,
        }
    }
}

/// Identities never touched by a pass. Matching is case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct KeepList {
    entries: HashSet<String>,
}

impl KeepList {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|e| e.as_ref().trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.entries.contains(&identity.to_lowercase())
    }
}

/// Contract between the reconciler and one external directory.
#[async_trait]
pub trait DirectoryAdapter: Send + Sync {
    /// The directory's access level for one entry.
    type Role: Clone + PartialEq + Debug + Send + Sync;

    /// Short name used in logs and audit messages.
    fn name(&self) -> &'static str;

    async fn list_current_members(
        &self,
    ) -> Result<Vec<DirectoryEntry<Self::Role>>, DirectoryError>;

    /// Map an entry to an internal user. `None` marks an orphan.
    async fn resolve_internal_user(
        &self,
        entry: &DirectoryEntry<Self::Role>,
    ) -> Result<Option<User>, DirectoryError>;

    /// What the user should hold, from their role set. `None` means no access.
    async fn desired_role_for(&self, user: &User) -> Result<Option<Self::Role>, DirectoryError>;

    async fn grant(
        &self,
        user: &User,
        entry: &DirectoryEntry<Self::Role>,
        role: &Self::Role,
    ) -> Result<(), DirectoryError>;

    async fn revoke(&self, entry: &DirectoryEntry<Self::Role>) -> Result<(), DirectoryError>;

    /// Move an entry from its current role to `role`.
    async fn replace(
        &self,
        user: &User,
        entry: &DirectoryEntry<Self::Role>,
        role: &Self::Role,
    ) -> Result<(), DirectoryError> {
        self.revoke(entry).await?;
        self.grant(user, entry, role).await
    }

    /// The directory and the role store disagree in a way that should not be
    /// repaired by overwriting the directory.
    fn is_conflict(
        &self,
        _user: &User,
        _entry: &DirectoryEntry<Self::Role>,
        _desired: Option<&Self::Role>,
    ) -> bool {
        false
    }

    /// Re-derive the user's internal roles after a conflict.
    async fn rederive(&self, _user: &User) -> Result<(), DirectoryError> {
        Ok(())
    }

    /// Entitled users with no entry among `present`. Directories that cannot
    /// add members on their own report none.
    async fn list_missing(
        &self,
        _present: &[DirectoryEntry<Self::Role>],
    ) -> Result<Vec<MissingEntry<Self::Role>>, DirectoryError> {
        Ok(Vec::new())
    }

    /// Create the entry for a missing member.
    async fn add(&self, _missing: &MissingEntry<Self::Role>) -> Result<(), DirectoryError> {
        Err(DirectoryError::Unsupported(format!(
            "{} cannot add members",
            self.name()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_list_is_case_insensitive() {
        let keep = KeepList::new(["Team@Org.example", " ", "octocat"]);
        assert!(keep.contains("team@org.example"));
        assert!(keep.contains("OCTOCAT"));
        assert!(!keep.contains(""));
        assert!(!keep.contains("someone"));
    }
}
