//! Wiki adapter, keyed by the `wiki:<id>` link. Keep-list entries are emails.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{DirectoryAdapter, DirectoryEntry, DirectoryError, MissingEntry};
use crate::clients::ClientError;
use crate::models::User;
use crate::roles::{LinkSystem, LinkTag, RoleSet, RoleStore};
use crate::store::{IdentityStore, UserRepository};

/// Wiki role, identified on the wire by a numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WikiRole {
    Admin,
    Editor,
    Viewer,
    Public,
    Lead,
    DevOps,
    Other(i64),
}

impl WikiRole {
    pub fn from_id(id: i64) -> Self {
        match id {
            1 => WikiRole::Admin,
            2 => WikiRole::Editor,
            3 => WikiRole::Viewer,
            4 => WikiRole::Public,
            5 => WikiRole::Lead,
            6 => WikiRole::DevOps,
            other => WikiRole::Other(other),
        }
    }

    pub fn id(self) -> i64 {
        match self {
            WikiRole::Admin => 1,
            WikiRole::Editor => 2,
            WikiRole::Viewer => 3,
            WikiRole::Public => 4,
            WikiRole::Lead => 5,
            WikiRole::DevOps => 6,
            WikiRole::Other(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub roles: BTreeSet<WikiRole>,
}

/// Wiki user administration API.
#[async_trait]
pub trait WikiUsers: Send + Sync {
    async fn list_users(&self) -> Result<Vec<WikiUser>, ClientError>;

    /// `None` when the account does not exist.
    async fn get_user(&self, id: i64) -> Result<Option<WikiUser>, ClientError>;

    /// Create an account and send its owner an invite.
    async fn create_user(
        &self,
        name: &str,
        email: &str,
        roles: &BTreeSet<WikiRole>,
    ) -> Result<WikiUser, ClientError>;

    async fn update_roles(&self, id: i64, roles: &BTreeSet<WikiRole>) -> Result<(), ClientError>;

    async fn delete_user(&self, id: i64) -> Result<(), ClientError>;
}

pub struct WikiAdapter {
    api: Arc<dyn WikiUsers>,
    store: Arc<dyn IdentityStore>,
    roles: RoleStore,
}

impl WikiAdapter {
    pub fn new(api: Arc<dyn WikiUsers>, store: Arc<dyn IdentityStore>) -> Self {
        Self {
            api,
            roles: RoleStore::new(store.clone()),
            store,
        }
    }

    /// Give `user` a wiki account and record the `wiki:<id>` link.
    ///
    /// An unlinked account already registered under the user's email is
    /// adopted instead of duplicated.
    pub async fn create_account(&self, user: &User) -> Result<WikiUser, DirectoryError> {
        let roles = self.roles.get_roles(&user.id).await?;
        let Some(desired) = wiki_roles(&roles) else {
            return Err(DirectoryError::NotEntitled(format!(
                "{} holds no standing",
                user.id
            )));
        };

        if let Some(link) = roles.link_for(LinkSystem::Wiki)
            && let Ok(id) = link.identifier.parse::<i64>()
            && self.api.get_user(id).await?.is_some()
        {
            return Err(DirectoryError::AlreadyLinked(link.to_string()));
        }

        let existing = self
            .api
            .list_users()
            .await?
            .into_iter()
            .find(|u| u.email.eq_ignore_ascii_case(&user.email));
        let account = match existing {
            Some(mut account) => {
                if self
                    .roles
                    .find_user_by_link(&LinkTag::wiki(account.id))
                    .await?
                    .is_some_and(|holder| holder.id != user.id)
                {
                    return Err(DirectoryError::AlreadyLinked(
                        LinkTag::wiki(account.id).to_string(),
                    ));
                }
                self.api.update_roles(account.id, &desired).await?;
                account.roles = desired;
                account
            }
            None => {
                self.api
                    .create_user(&user.display_name(), &user.email, &desired)
                    .await?
            }
        };

        self.roles.link(&user.id, LinkTag::wiki(account.id)).await?;
        info!(user_id = %user.id, account_id = account.id, "wiki account linked");
        Ok(account)
    }
}

fn wiki_roles(roles: &RoleSet) -> Option<BTreeSet<WikiRole>> {
    if roles.is_inner_circle() {
        Some([WikiRole::Editor, WikiRole::Lead].into())
    } else if roles.is_current_member() || roles.is_alumni() {
        Some([WikiRole::Editor].into())
    } else {
        None
    }
}

fn account_id(entry: &DirectoryEntry<BTreeSet<WikiRole>>) -> Result<i64, DirectoryError> {
    entry
        .external_id
        .parse()
        .map_err(|_| DirectoryError::InvalidEntry(format!("wiki account id: {}", entry.external_id)))
}

#[async_trait]
impl DirectoryAdapter for WikiAdapter {
    type Role = BTreeSet<WikiRole>;

    fn name(&self) -> &'static str {
        "wiki"
    }

    async fn list_current_members(
        &self,
    ) -> Result<Vec<DirectoryEntry<BTreeSet<WikiRole>>>, DirectoryError> {
        Ok(self
            .api
            .list_users()
            .await?
            .into_iter()
            .map(|u| DirectoryEntry {
                identity: u.email,
                external_id: u.id.to_string(),
                current: u.roles,
            })
            .collect())
    }

    async fn resolve_internal_user(
        &self,
        entry: &DirectoryEntry<BTreeSet<WikiRole>>,
    ) -> Result<Option<User>, DirectoryError> {
        let id = account_id(entry)?;
        Ok(self.roles.find_user_by_link(&LinkTag::wiki(id)).await?)
    }

    async fn desired_role_for(
        &self,
        user: &User,
    ) -> Result<Option<BTreeSet<WikiRole>>, DirectoryError> {
        Ok(wiki_roles(&self.roles.get_roles(&user.id).await?))
    }

    /// A grant only ever adjusts an existing account's roles; accounts are
    /// created by [`WikiAdapter::create_account`] or a pass adding a linked
    /// member.
    async fn grant(
        &self,
        _user: &User,
        entry: &DirectoryEntry<BTreeSet<WikiRole>>,
        role: &BTreeSet<WikiRole>,
    ) -> Result<(), DirectoryError> {
        Ok(self.api.update_roles(account_id(entry)?, role).await?)
    }

    async fn revoke(&self, entry: &DirectoryEntry<BTreeSet<WikiRole>>) -> Result<(), DirectoryError> {
        Ok(self.api.delete_user(account_id(entry)?).await?)
    }

    /// Linked, entitled users whose account no longer exists.
    async fn list_missing(
        &self,
        present: &[DirectoryEntry<BTreeSet<WikiRole>>],
    ) -> Result<Vec<MissingEntry<BTreeSet<WikiRole>>>, DirectoryError> {
        let present: HashSet<&str> = present.iter().map(|e| e.external_id.as_str()).collect();
        let mut missing = Vec::new();
        for user in self.store.list_users().await? {
            let roles = self.roles.get_roles(&user.id).await?;
            let Some(link) = roles.link_for(LinkSystem::Wiki) else {
                continue;
            };
            if present.contains(link.identifier.as_str()) {
                continue;
            }
            if let Some(role) = wiki_roles(&roles) {
                missing.push(MissingEntry {
                    identity: user.email.clone(),
                    user,
                    role,
                });
            }
        }
        Ok(missing)
    }

    /// Recreates the account and moves the link to its new id.
    async fn add(&self, missing: &MissingEntry<BTreeSet<WikiRole>>) -> Result<(), DirectoryError> {
        let account = self
            .api
            .create_user(&missing.user.display_name(), &missing.identity, &missing.role)
            .await?;
        self.roles
            .link(&missing.user.id, LinkTag::wiki(account.id))
            .await?;
        Ok(())
    }

    /// Role changes update the account in place instead of deleting it.
    async fn replace(
        &self,
        user: &User,
        entry: &DirectoryEntry<BTreeSet<WikiRole>>,
        role: &BTreeSet<WikiRole>,
    ) -> Result<(), DirectoryError> {
        self.grant(user, entry, role).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use super::*;
    use crate::directory::{KeepList, Notifications, Reconciler};
    use crate::roles::RoleSet;
    use crate::store::{MemoryStore, UserRepository};

    #[derive(Default)]
    struct FakeWiki {
        users: Mutex<BTreeMap<i64, WikiUser>>,
        created: Mutex<usize>,
    }

    impl FakeWiki {
        fn add(&self, id: i64, email: &str, roles: &[WikiRole]) {
            self.users.lock().unwrap().insert(
                id,
                WikiUser {
                    id,
                    name: email.to_string(),
                    email: email.to_string(),
                    roles: roles.iter().copied().collect(),
                },
            );
        }

        fn roles_of(&self, id: i64) -> Option<BTreeSet<WikiRole>> {
            self.users.lock().unwrap().get(&id).map(|u| u.roles.clone())
        }
    }

    #[async_trait]
    impl WikiUsers for FakeWiki {
        async fn list_users(&self) -> Result<Vec<WikiUser>, ClientError> {
            Ok(self.users.lock().unwrap().values().cloned().collect())
        }

        async fn get_user(&self, id: i64) -> Result<Option<WikiUser>, ClientError> {
            Ok(self.users.lock().unwrap().get(&id).cloned())
        }

        async fn create_user(
            &self,
            name: &str,
            email: &str,
            roles: &BTreeSet<WikiRole>,
        ) -> Result<WikiUser, ClientError> {
            *self.created.lock().unwrap() += 1;
            let mut users = self.users.lock().unwrap();
            let id = users.keys().next_back().map_or(100, |id| id + 1);
            let user = WikiUser {
                id,
                name: name.to_string(),
                email: email.to_string(),
                roles: roles.clone(),
            };
            users.insert(id, user.clone());
            Ok(user)
        }

        async fn update_roles(&self, id: i64, roles: &BTreeSet<WikiRole>) -> Result<(), ClientError> {
            if let Some(u) = self.users.lock().unwrap().get_mut(&id) {
                u.roles = roles.clone();
            }
            Ok(())
        }

        async fn delete_user(&self, id: i64) -> Result<(), ClientError> {
            self.users.lock().unwrap().remove(&id);
            Ok(())
        }
    }

    #[test]
    fn role_ids_round_trip_known_values() {
        assert_eq!(WikiRole::from_id(2), WikiRole::Editor);
        assert_eq!(WikiRole::Lead.id(), 5);
        assert_eq!(WikiRole::from_id(42), WikiRole::Other(42));
    }

    #[tokio::test]
    async fn wiki_pass_updates_in_place_and_deletes_orphans() {
        let store = Arc::new(MemoryStore::new());
        let roles = RoleStore::new(store.clone());
        for (id, tags) in [
            ("lead", vec!["lead", "current_member", "wiki:10"]),
            ("member", vec!["current_member", "wiki:11"]),
        ] {
            store
                .upsert_user(&User::new(id, id, format!("{id}@org.example")))
                .await
                .unwrap();
            roles.set_roles(id, &RoleSet::from_strings(tags)).await.unwrap();
        }

        let wiki = Arc::new(FakeWiki::default());
        wiki.add(1, "admin@org.example", &[WikiRole::Admin]);
        wiki.add(10, "lead@org.example", &[WikiRole::Editor]);
        wiki.add(11, "member@org.example", &[WikiRole::Editor]);
        wiki.add(12, "ghost@org.example", &[WikiRole::Editor]);

        let reconciler = Reconciler::new(
            Arc::new(WikiAdapter::new(wiki.clone(), store.clone())),
            KeepList::new(["admin@org.example"]),
            Notifications::disabled(),
        );
        let report = reconciler.run().await.unwrap();
        assert_eq!(report.replaced, 1);
        assert_eq!(report.revoked, 1);
        assert_eq!(report.skipped, 1);

        assert_eq!(
            wiki.roles_of(10),
            Some([WikiRole::Editor, WikiRole::Lead].into())
        );
        assert_eq!(wiki.roles_of(11), Some([WikiRole::Editor].into()));
        assert!(wiki.roles_of(12).is_none());
        assert!(wiki.roles_of(1).is_some());

        assert!(reconciler.run().await.unwrap().is_clean());
    }

    async fn seeded(users: &[(&str, Vec<&str>)]) -> (Arc<MemoryStore>, RoleStore) {
        let store = Arc::new(MemoryStore::new());
        let roles = RoleStore::new(store.clone());
        for (id, tags) in users {
            store
                .upsert_user(&User::new(*id, *id, format!("{id}@org.example")))
                .await
                .unwrap();
            roles
                .set_roles(id, &RoleSet::from_strings(tags.iter().copied()))
                .await
                .unwrap();
        }
        (store, roles)
    }

    #[tokio::test]
    async fn created_account_is_linked_and_left_alone() {
        let (store, roles) = seeded(&[("lead", vec!["lead", "current_member"])]).await;
        let wiki = Arc::new(FakeWiki::default());
        let adapter = WikiAdapter::new(wiki.clone(), store.clone());
        let lead = store.get_user("lead").await.unwrap().unwrap();

        let account = adapter.create_account(&lead).await.unwrap();
        assert_eq!(account.email, "lead@org.example");
        assert_eq!(account.roles, [WikiRole::Editor, WikiRole::Lead].into());
        assert_eq!(
            roles.get_roles("lead").await.unwrap().link_for(LinkSystem::Wiki),
            Some(&LinkTag::wiki(account.id))
        );

        assert!(matches!(
            adapter.create_account(&lead).await,
            Err(DirectoryError::AlreadyLinked(_))
        ));

        let reconciler = Reconciler::new(
            Arc::new(adapter),
            KeepList::default(),
            Notifications::disabled(),
        );
        assert!(reconciler.run().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn account_under_same_email_is_adopted() {
        let (store, roles) = seeded(&[("member", vec!["current_member"])]).await;
        let wiki = Arc::new(FakeWiki::default());
        wiki.add(40, "Member@org.example", &[WikiRole::Viewer]);
        let adapter = WikiAdapter::new(wiki.clone(), store.clone());
        let member = store.get_user("member").await.unwrap().unwrap();

        let account = adapter.create_account(&member).await.unwrap();
        assert_eq!(account.id, 40);
        assert_eq!(*wiki.created.lock().unwrap(), 0);
        assert_eq!(wiki.roles_of(40), Some([WikiRole::Editor].into()));
        assert_eq!(
            roles.get_roles("member").await.unwrap().link_for(LinkSystem::Wiki),
            Some(&LinkTag::wiki(40))
        );
    }

    #[tokio::test]
    async fn unentitled_user_gets_no_account() {
        let (store, _) = seeded(&[("nobody", vec![])]).await;
        let wiki = Arc::new(FakeWiki::default());
        let adapter = WikiAdapter::new(wiki.clone(), store.clone());
        let nobody = store.get_user("nobody").await.unwrap().unwrap();

        assert!(matches!(
            adapter.create_account(&nobody).await,
            Err(DirectoryError::NotEntitled(_))
        ));
        assert!(wiki.users.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleted_account_of_linked_member_is_recreated() {
        let (store, roles) = seeded(&[
            ("member", vec!["current_member", "wiki:11"]),
            ("former", vec!["wiki:12"]),
        ])
        .await;
        let wiki = Arc::new(FakeWiki::default());

        let reconciler = Reconciler::new(
            Arc::new(WikiAdapter::new(wiki.clone(), store.clone())),
            KeepList::default(),
            Notifications::disabled(),
        );
        let report = reconciler.run().await.unwrap();
        assert_eq!(report.added, 1);

        let link = roles
            .get_roles("member")
            .await
            .unwrap()
            .link_for(LinkSystem::Wiki)
            .cloned()
            .unwrap();
        let id: i64 = link.identifier.parse().unwrap();
        assert_eq!(wiki.roles_of(id), Some([WikiRole::Editor].into()));
        assert_eq!(wiki.users.lock().unwrap().len(), 1);

        assert!(reconciler.run().await.unwrap().is_clean());
    }
}
