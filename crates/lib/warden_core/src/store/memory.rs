//! In-process store backed by concurrent maps.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::{
    AuthCodeRepository, ClientRepository, CredentialRepository, LoginRepository,
    RefreshTokenRepository, RoleRepository, StoreError, SubteamRepository, UserRepository,
};
use crate::models::{
    AuthorizationCode, ClientApplication, PasswordCredential, RefreshTokenRecord, Subteam, User,
    UserLogin,
};

/// Non-persistent [`IdentityStore`](super::IdentityStore).
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<String, User>,
    roles: DashMap<String, BTreeSet<String>>,
    subteams: DashMap<String, Subteam>,
    user_subteams: DashMap<String, BTreeSet<String>>,
    clients: DashMap<String, ClientApplication>,
    redirect_uris: DashMap<String, BTreeSet<String>>,
    codes: DashMap<String, AuthorizationCode>,
    refresh_tokens: DashMap<String, RefreshTokenRecord>,
    logins: DashMap<String, Vec<UserLogin>>,
    credentials: DashMap<String, PasswordCredential>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_uris(&self, mut client: ClientApplication) -> ClientApplication {
        client.redirect_uris = self
            .redirect_uris
            .get(&client.id)
            .map(|uris| uris.iter().cloned().collect())
            .unwrap_or_default();
        client
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(id).map(|u| u.clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .map(|u| u.clone()))
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self.users.iter().map(|u| u.clone()).collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }

    async fn upsert_user(&self, user: &User) -> Result<(), StoreError> {
        let taken = self
            .users
            .iter()
            .any(|u| u.id != user.id && u.email.eq_ignore_ascii_case(&user.email));
        if taken {
            return Err(StoreError::Conflict(format!(
                "email {} already belongs to another user",
                user.email
            )));
        }
        self.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn delete_user(&self, id: &str) -> Result<bool, StoreError> {
        let existed = self.users.remove(id).is_some();
        self.roles.remove(id);
        self.user_subteams.remove(id);
        self.credentials.remove(id);
        self.logins.remove(id);
        self.refresh_tokens.retain(|_, r| r.user_id != id);
        Ok(existed)
    }
}

#[async_trait]
impl RoleRepository for MemoryStore {
    async fn list_role_tags(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .roles
            .get(user_id)
            .map(|tags| tags.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn add_role_tag(&self, user_id: &str, tag: &str) -> Result<(), StoreError> {
        self.roles
            .entry(user_id.to_string())
            .or_default()
            .insert(tag.to_string());
        Ok(())
    }

    async fn remove_role_tag(&self, user_id: &str, tag: &str) -> Result<(), StoreError> {
        if let Some(mut tags) = self.roles.get_mut(user_id) {
            tags.remove(tag);
        }
        Ok(())
    }

    async fn find_users_with_tag(&self, tag: &str) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self
            .roles
            .iter()
            .filter(|entry| entry.value().contains(tag))
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl SubteamRepository for MemoryStore {
    async fn list_subteams(&self) -> Result<Vec<Subteam>, StoreError> {
        let mut subteams: Vec<Subteam> = self.subteams.iter().map(|s| s.clone()).collect();
        subteams.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(subteams)
    }

    async fn replace_subteams(&self, subteams: &[Subteam]) -> Result<(), StoreError> {
        self.subteams.clear();
        for subteam in subteams {
            self.subteams.insert(subteam.id.clone(), subteam.clone());
        }
        Ok(())
    }

    async fn list_user_subteams(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .user_subteams
            .get(user_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn add_user_subteam(&self, user_id: &str, subteam_id: &str) -> Result<(), StoreError> {
        self.user_subteams
            .entry(user_id.to_string())
            .or_default()
            .insert(subteam_id.to_string());
        Ok(())
    }

    async fn remove_user_subteam(
        &self,
        user_id: &str,
        subteam_id: &str,
    ) -> Result<(), StoreError> {
        if let Some(mut ids) = self.user_subteams.get_mut(user_id) {
            ids.remove(subteam_id);
        }
        Ok(())
    }
}

#[async_trait]
impl ClientRepository for MemoryStore {
    async fn list_clients(&self) -> Result<Vec<ClientApplication>, StoreError> {
        let mut clients: Vec<ClientApplication> =
            self.clients.iter().map(|c| c.clone()).collect();
        clients.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(clients.into_iter().map(|c| self.with_uris(c)).collect())
    }

    async fn list_clients_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<ClientApplication>, StoreError> {
        let all = self.list_clients().await?;
        Ok(all.into_iter().filter(|c| c.user_id == user_id).collect())
    }

    async fn get_client(&self, id: &str) -> Result<Option<ClientApplication>, StoreError> {
        let client = self.clients.get(id).map(|c| c.clone());
        Ok(client.map(|c| self.with_uris(c)))
    }

    async fn upsert_client(&self, client: &ClientApplication) -> Result<(), StoreError> {
        let mut row = client.clone();
        row.redirect_uris.clear();
        self.clients.insert(row.id.clone(), row);
        Ok(())
    }

    async fn delete_client(&self, id: &str) -> Result<bool, StoreError> {
        self.redirect_uris.remove(id);
        Ok(self.clients.remove(id).is_some())
    }

    async fn list_redirect_uris(&self, client_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .redirect_uris
            .get(client_id)
            .map(|uris| uris.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn add_redirect_uri(&self, client_id: &str, uri: &str) -> Result<(), StoreError> {
        self.redirect_uris
            .entry(client_id.to_string())
            .or_default()
            .insert(uri.to_string());
        Ok(())
    }

    async fn remove_redirect_uri(&self, client_id: &str, uri: &str) -> Result<(), StoreError> {
        if let Some(mut uris) = self.redirect_uris.get_mut(client_id) {
            uris.remove(uri);
        }
        Ok(())
    }
}

#[async_trait]
impl AuthCodeRepository for MemoryStore {
    async fn insert_code(&self, code: &AuthorizationCode) -> Result<(), StoreError> {
        self.codes.insert(code.code_hash.clone(), code.clone());
        Ok(())
    }

    async fn take_code(&self, code_hash: &str) -> Result<Option<AuthorizationCode>, StoreError> {
        Ok(self.codes.remove(code_hash).map(|(_, code)| code))
    }

    async fn purge_expired_codes(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let before = self.codes.len();
        self.codes.retain(|_, code| code.expires_at > now);
        Ok((before - self.codes.len()) as u64)
    }
}

#[async_trait]
impl RefreshTokenRepository for MemoryStore {
    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        self.refresh_tokens
            .insert(record.token_hash.clone(), record.clone());
        Ok(())
    }

    async fn find_valid_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        Ok(self
            .refresh_tokens
            .get(token_hash)
            .filter(|r| r.is_usable(now))
            .map(|r| r.clone()))
    }

    async fn revoke_refresh_token(&self, token_hash: &str) -> Result<bool, StoreError> {
        match self.refresh_tokens.get_mut(token_hash) {
            Some(mut record) if record.revoked_at.is_none() => {
                record.revoked_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_refresh_tokens(&self, user_id: &str) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut revoked = 0;
        for mut record in self.refresh_tokens.iter_mut() {
            if record.user_id == user_id && record.revoked_at.is_none() {
                record.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn purge_expired_refresh_tokens(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let before = self.refresh_tokens.len();
        self.refresh_tokens.retain(|_, record| record.is_usable(now));
        Ok((before - self.refresh_tokens.len()) as u64)
    }
}

#[async_trait]
impl LoginRepository for MemoryStore {
    async fn record_login(&self, login: &UserLogin) -> Result<(), StoreError> {
        self.logins
            .entry(login.user_id.clone())
            .or_default()
            .push(login.clone());
        Ok(())
    }

    async fn list_logins(&self, user_id: &str, limit: i64) -> Result<Vec<UserLogin>, StoreError> {
        let mut logins = self
            .logins
            .get(user_id)
            .map(|l| l.clone())
            .unwrap_or_default();
        logins.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        logins.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(logins)
    }

    async fn last_login_for(
        &self,
        user_id: &str,
        destination: &str,
        scope: &str,
    ) -> Result<Option<UserLogin>, StoreError> {
        Ok(self.logins.get(user_id).and_then(|logins| {
            logins
                .iter()
                .filter(|l| l.destination == destination && l.scope == scope)
                .max_by_key(|l| l.created_at)
                .cloned()
        }))
    }
}

#[async_trait]
impl CredentialRepository for MemoryStore {
    async fn get_credential(&self, user_id: &str) -> Result<Option<PasswordCredential>, StoreError> {
        Ok(self.credentials.get(user_id).map(|c| c.clone()))
    }

    async fn find_credential_by_email(
        &self,
        email: &str,
    ) -> Result<Option<PasswordCredential>, StoreError> {
        Ok(self
            .credentials
            .iter()
            .find(|c| c.email.eq_ignore_ascii_case(email))
            .map(|c| c.clone()))
    }

    async fn insert_credential(&self, credential: &PasswordCredential) -> Result<(), StoreError> {
        if self.credentials.contains_key(&credential.user_id) {
            return Err(StoreError::Conflict("credential already exists".into()));
        }
        self.credentials
            .insert(credential.user_id.clone(), credential.clone());
        Ok(())
    }

    async fn delete_credential(&self, user_id: &str) -> Result<bool, StoreError> {
        Ok(self.credentials.remove(user_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn code(hash: &str) -> AuthorizationCode {
        AuthorizationCode {
            code_hash: hash.into(),
            client_id: "acme".into(),
            user_id: "u1".into(),
            scope: "user:read".into(),
            redirect_uri: "https://acme.example/cb".into(),
            expires_at: Utc::now() + Duration::minutes(5),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn take_code_removes_it() {
        let store = MemoryStore::new();
        store.insert_code(&code("h1")).await.unwrap();
        assert!(store.take_code("h1").await.unwrap().is_some());
        assert!(store.take_code("h1").await.unwrap().is_none());
    }

    fn refresh(hash: &str, expires_in: Duration) -> RefreshTokenRecord {
        let now = Utc::now();
        RefreshTokenRecord {
            id: uuid::Uuid::now_v7(),
            token_hash: hash.into(),
            user_id: "u1".into(),
            client_id: "acme".into(),
            scope: "user:read".into(),
            expires_at: now + expires_in,
            revoked_at: None,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn purge_drops_dead_codes_and_tokens_only() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut stale = code("stale");
        stale.expires_at = now - Duration::minutes(1);
        store.insert_code(&stale).await.unwrap();
        store.insert_code(&code("live")).await.unwrap();

        store
            .insert_refresh_token(&refresh("expired", Duration::days(-1)))
            .await
            .unwrap();
        store
            .insert_refresh_token(&refresh("revoked", Duration::days(30)))
            .await
            .unwrap();
        store
            .insert_refresh_token(&refresh("valid", Duration::days(30)))
            .await
            .unwrap();
        assert!(store.revoke_refresh_token("revoked").await.unwrap());

        assert_eq!(store.purge_expired_codes(now).await.unwrap(), 1);
        assert_eq!(store.purge_expired_refresh_tokens(now).await.unwrap(), 2);

        assert!(store.take_code("stale").await.unwrap().is_none());
        assert!(store.take_code("live").await.unwrap().is_some());
        assert!(
            store
                .find_valid_refresh_token("valid", now)
                .await
                .unwrap()
                .is_some()
        );
        assert_eq!(store.refresh_tokens.len(), 1);

        assert_eq!(store.purge_expired_codes(now).await.unwrap(), 0);
        assert_eq!(store.purge_expired_refresh_tokens(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_user_cascades() {
        let store = MemoryStore::new();
        store
            .upsert_user(&User::new("u1", "one", "one@org.example"))
            .await
            .unwrap();
        store.add_role_tag("u1", "admin").await.unwrap();
        store.add_user_subteam("u1", "s1").await.unwrap();

        assert!(store.delete_user("u1").await.unwrap());
        assert!(store.list_role_tags("u1").await.unwrap().is_empty());
        assert!(store.list_user_subteams("u1").await.unwrap().is_empty());
        assert!(!store.delete_user("u1").await.unwrap());
    }

    #[tokio::test]
    async fn email_is_unique_across_users() {
        let store = MemoryStore::new();
        store
            .upsert_user(&User::new("u1", "one", "same@org.example"))
            .await
            .unwrap();
        let err = store
            .upsert_user(&User::new("u2", "two", "SAME@org.example"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }
}
