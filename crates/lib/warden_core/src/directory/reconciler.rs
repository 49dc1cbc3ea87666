use std::sync::Arc;

use futures::StreamExt;
use futures::stream;
use tracing::{debug, error, info, warn};

use super::{
    DirectoryAdapter, DirectoryEntry, DirectoryError, DirectorySettings, KeepList, MissingEntry,
    Notifications,
};

/// Entries processed concurrently within one pass.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// What a pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub examined: usize,
    pub skipped: usize,
    pub replaced: usize,
    pub revoked: usize,
    pub added: usize,
    pub conflicts: usize,
    pub errors: usize,
}

impl ReconcileReport {
    /// No corrective action was taken and nothing failed.
    pub fn is_clean(&self) -> bool {
        self.replaced == 0
            && self.revoked == 0
            && self.added == 0
            && self.conflicts == 0
            && self.errors == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Skipped,
    Unchanged,
    Replaced,
    Revoked,
    Conflict,
}

/// Drives one adapter to convergence.
pub struct Reconciler<A: DirectoryAdapter> {
    adapter: Arc<A>,
    keep: KeepList,
    notifications: Notifications,
    concurrency: usize,
}

impl<A: DirectoryAdapter> Reconciler<A> {
    pub fn new(adapter: Arc<A>, keep: KeepList, notifications: Notifications) -> Self {
        Self {
            adapter,
            keep,
            notifications,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn from_settings(
        adapter: Arc<A>,
        settings: &DirectorySettings,
        notifications: Notifications,
    ) -> Self {
        Self::new(adapter, KeepList::new(&settings.keep_list), notifications)
            .with_concurrency(settings.concurrency)
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Run one pass.
    ///
    /// Only a failure to enumerate the directory fails the pass; errors on
    /// individual entries are logged, counted and skipped. Entitled users
    /// without an entry are added after the listed entries are settled, so an
    /// entry lost between a revoke and a grant comes back on the next pass.
    pub async fn run(&self) -> Result<ReconcileReport, DirectoryError> {
        let name = self.adapter.name();
        let entries = self.adapter.list_current_members().await?;
        info!(directory = name, entries = entries.len(), "reconciliation pass started");

        let results: Vec<Result<Action, DirectoryError>> = stream::iter(entries.iter())
            .map(|entry| async move {
                let result = self.reconcile_entry(entry).await;
                if let Err(e) = &result {
                    error!(directory = name, identity = %entry.identity, error = %e, "entry reconciliation failed");
                }
                result
            })
            .buffer_unordered(self.concurrency)
            .boxed()
            .collect()
            .await;

        let mut report = ReconcileReport {
            examined: entries.len(),
            ..Default::default()
        };
        for result in results {
            match result {
                Ok(Action::Skipped) => report.skipped += 1,
                Ok(Action::Unchanged) => {}
                Ok(Action::Replaced) => report.replaced += 1,
                Ok(Action::Revoked) => report.revoked += 1,
                Ok(Action::Conflict) => report.conflicts += 1,
                Err(_) => report.errors += 1,
            }
        }

        match self.adapter.list_missing(&entries).await {
            Ok(missing) => {
                let added: Vec<Result<bool, DirectoryError>> = stream::iter(missing.iter())
                    .map(|missing| async move {
                        let result = self.add_missing(missing).await;
                        if let Err(e) = &result {
                            error!(directory = name, identity = %missing.identity, error = %e, "adding member failed");
                        }
                        result
                    })
                    .buffer_unordered(self.concurrency)
                    .boxed()
                    .collect()
                    .await;
                for result in added {
                    match result {
                        Ok(true) => report.added += 1,
                        Ok(false) => report.skipped += 1,
                        Err(_) => report.errors += 1,
                    }
                }
            }
            Err(e) => {
                error!(directory = name, error = %e, "listing missing members failed");
                report.errors += 1;
            }
        }

        info!(
            directory = name,
            examined = report.examined,
            skipped = report.skipped,
            replaced = report.replaced,
            revoked = report.revoked,
            added = report.added,
            conflicts = report.conflicts,
            errors = report.errors,
            "reconciliation pass finished"
        );
        Ok(report)
    }

    /// Returns false when the identity is keep-listed.
    async fn add_missing(&self, missing: &MissingEntry<A::Role>) -> Result<bool, DirectoryError> {
        let name = self.adapter.name();
        if self.keep.contains(&missing.identity) {
            debug!(directory = name, identity = %missing.identity, "keep-listed, not adding");
            return Ok(false);
        }
        self.adapter.add(missing).await?;
        info!(
            directory = name,
            identity = %missing.identity,
            user_id = %missing.user.id,
            role = ?missing.role,
            "missing member added"
        );
        self.notifications.send(format!(
            "[{name}] added {} ({}) as {:?}",
            missing.user.display_name(),
            missing.identity,
            missing.role
        ));
        Ok(true)
    }

    async fn reconcile_entry(&self, entry: &DirectoryEntry<A::Role>) -> Result<Action, DirectoryError> {
        let name = self.adapter.name();

        if self.keep.contains(&entry.identity) {
            debug!(directory = name, identity = %entry.identity, "keep-listed, skipping");
            return Ok(Action::Skipped);
        }

        let Some(user) = self.adapter.resolve_internal_user(entry).await? else {
            self.adapter.revoke(entry).await?;
            info!(directory = name, identity = %entry.identity, "orphan entry revoked");
            self.notifications.send(format!(
                "[{name}] removed {}: no matching user",
                entry.identity
            ));
            return Ok(Action::Revoked);
        };

        let desired = self.adapter.desired_role_for(&user).await?;

        if self.adapter.is_conflict(&user, entry, desired.as_ref()) {
            error!(
                directory = name,
                identity = %entry.identity,
                user_id = %user.id,
                current = ?entry.current,
                desired = ?desired,
                "directory and role store disagree, re-deriving roles"
            );
            self.notifications.send(format!(
                "[{name}] conflict for {} ({}): directory has {:?}, roles say {:?}; re-deriving",
                user.display_name(),
                entry.identity,
                entry.current,
                desired
            ));
            self.adapter.rederive(&user).await?;
            return Ok(Action::Conflict);
        }

        match desired {
            None => {
                self.adapter.revoke(entry).await?;
                info!(directory = name, identity = %entry.identity, user_id = %user.id, "access revoked");
                self.notifications.send(format!(
                    "[{name}] removed {} ({}): no longer entitled",
                    user.display_name(),
                    entry.identity
                ));
                Ok(Action::Revoked)
            }
            Some(role) if role != entry.current => {
                self.adapter.replace(&user, entry, &role).await?;
                info!(
                    directory = name,
                    identity = %entry.identity,
                    from = ?entry.current,
                    to = ?role,
                    "access updated"
                );
                self.notifications.send(format!(
                    "[{name}] updated {} ({}): {:?} -> {:?}",
                    user.display_name(),
                    entry.identity,
                    entry.current,
                    role
                ));
                Ok(Action::Replaced)
            }
            Some(_) => Ok(Action::Unchanged),
        }
    }
}
