//! Persistence.
//!
//! Each record family has its own repository trait. [`IdentityStore`] is the
//! union the rest of the crate passes around as `Arc<dyn IdentityStore>`;
//! [`PgStore`] backs it with PostgreSQL and [`MemoryStore`] with in-process
//! maps for tests and local runs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    AuthorizationCode, ClientApplication, PasswordCredential, RefreshTokenRecord, Subteam, User,
    UserLogin,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    /// Insert or fully replace a user record.
    async fn upsert_user(&self, user: &User) -> Result<(), StoreError>;

    /// Delete a user together with their roles, subteams, credential,
    /// refresh tokens and login history. Returns false when no user existed.
    async fn delete_user(&self, id: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn list_role_tags(&self, user_id: &str) -> Result<Vec<String>, StoreError>;

    async fn add_role_tag(&self, user_id: &str, tag: &str) -> Result<(), StoreError>;

    async fn remove_role_tag(&self, user_id: &str, tag: &str) -> Result<(), StoreError>;

    /// Ids of users holding exactly this tag.
    async fn find_users_with_tag(&self, tag: &str) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
pub trait SubteamRepository: Send + Sync {
    async fn list_subteams(&self) -> Result<Vec<Subteam>, StoreError>;

    /// Replace the subteam registry wholesale.
    async fn replace_subteams(&self, subteams: &[Subteam]) -> Result<(), StoreError>;

    async fn list_user_subteams(&self, user_id: &str) -> Result<Vec<String>, StoreError>;

    async fn add_user_subteam(&self, user_id: &str, subteam_id: &str) -> Result<(), StoreError>;

    async fn remove_user_subteam(&self, user_id: &str, subteam_id: &str)
    -> Result<(), StoreError>;
}

#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn list_clients(&self) -> Result<Vec<ClientApplication>, StoreError>;

    async fn list_clients_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<ClientApplication>, StoreError>;

    async fn get_client(&self, id: &str) -> Result<Option<ClientApplication>, StoreError>;

    /// Insert or update the client row. Redirect URIs are managed separately.
    async fn upsert_client(&self, client: &ClientApplication) -> Result<(), StoreError>;

    /// Delete the client and its redirect URIs.
    async fn delete_client(&self, id: &str) -> Result<bool, StoreError>;

    async fn list_redirect_uris(&self, client_id: &str) -> Result<Vec<String>, StoreError>;

    async fn add_redirect_uri(&self, client_id: &str, uri: &str) -> Result<(), StoreError>;

    async fn remove_redirect_uri(&self, client_id: &str, uri: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AuthCodeRepository: Send + Sync {
    async fn insert_code(&self, code: &AuthorizationCode) -> Result<(), StoreError>;

    /// Atomically remove and return a code. A second call for the same hash
    /// returns `None`.
    async fn take_code(&self, code_hash: &str) -> Result<Option<AuthorizationCode>, StoreError>;

    /// Delete codes that expired before `now`. Returns how many were removed.
    async fn purge_expired_codes(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), StoreError>;

    /// Find a non-revoked, non-expired token by hash.
    async fn find_valid_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Mark a token revoked. Returns false when it was unknown or already revoked.
    async fn revoke_refresh_token(&self, token_hash: &str) -> Result<bool, StoreError>;

    async fn revoke_all_refresh_tokens(&self, user_id: &str) -> Result<u64, StoreError>;

    /// Delete tokens that are revoked or expired before `now`.
    async fn purge_expired_refresh_tokens(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait LoginRepository: Send + Sync {
    async fn record_login(&self, login: &UserLogin) -> Result<(), StoreError>;

    /// Most recent first.
    async fn list_logins(&self, user_id: &str, limit: i64) -> Result<Vec<UserLogin>, StoreError>;

    /// Most recent login of this user to this destination with this exact scope.
    async fn last_login_for(
        &self,
        user_id: &str,
        destination: &str,
        scope: &str,
    ) -> Result<Option<UserLogin>, StoreError>;
}

#[async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn get_credential(&self, user_id: &str) -> Result<Option<PasswordCredential>, StoreError>;

    async fn find_credential_by_email(
        &self,
        email: &str,
    ) -> Result<Option<PasswordCredential>, StoreError>;

    async fn insert_credential(&self, credential: &PasswordCredential) -> Result<(), StoreError>;

    async fn delete_credential(&self, user_id: &str) -> Result<bool, StoreError>;
}

/// Every repository the service needs.
pub trait IdentityStore:
    UserRepository
    + RoleRepository
    + SubteamRepository
    + ClientRepository
    + AuthCodeRepository
    + RefreshTokenRepository
    + LoginRepository
    + CredentialRepository
{
}

impl<T> IdentityStore for T where
    T: UserRepository
        + RoleRepository
        + SubteamRepository
        + ClientRepository
        + AuthCodeRepository
        + RefreshTokenRepository
        + LoginRepository
        + CredentialRepository
{
}
