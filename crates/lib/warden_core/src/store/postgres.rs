//! PostgreSQL-backed store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    AuthCodeRepository, ClientRepository, CredentialRepository, LoginRepository,
    RefreshTokenRepository, RoleRepository, StoreError, SubteamRepository, UserRepository,
};
use crate::models::{
    AuthorizationCode, ClientApplication, LoginType, PasswordCredential, RefreshTokenRecord,
    Subteam, User, UserLogin,
};

/// [`IdentityStore`](super::IdentityStore) over a connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const USER_COLUMNS: &str = "id, username, first_name, last_name, email, avatar_url, verified, \
     graduation_year, major, shirt_size, jacket_size, created_at, updated_at";

type UserRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    bool,
    Option<i32>,
    Option<String>,
    Option<String>,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn user_from_row(row: UserRow) -> User {
    let (
        id,
        username,
        first_name,
        last_name,
        email,
        avatar_url,
        verified,
        graduation_year,
        major,
        shirt_size,
        jacket_size,
        created_at,
        updated_at,
    ) = row;
    User {
        id,
        username,
        first_name,
        last_name,
        email,
        avatar_url,
        verified,
        graduation_year,
        major,
        shirt_size,
        jacket_size,
        created_at,
        updated_at,
    }
}

type ClientRow = (String, String, String, String, DateTime<Utc>, DateTime<Utc>);

fn client_from_row(row: ClientRow, redirect_uris: Vec<String>) -> ClientApplication {
    let (id, secret, user_id, name, created_at, updated_at) = row;
    ClientApplication {
        id,
        secret,
        user_id,
        name,
        redirect_uris,
        created_at,
        updated_at,
    }
}

type RefreshRow = (
    Uuid,
    String,
    String,
    String,
    String,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    DateTime<Utc>,
);

fn refresh_from_row(row: RefreshRow) -> RefreshTokenRecord {
    let (id, token_hash, user_id, client_id, scope, expires_at, revoked_at, created_at) = row;
    RefreshTokenRecord {
        id,
        token_hash,
        user_id,
        client_id,
        scope,
        expires_at,
        revoked_at,
        created_at,
    }
}

type LoginRow = (Uuid, String, String, String, String, String, DateTime<Utc>);

fn login_from_row(row: LoginRow) -> UserLogin {
    let (id, user_id, destination, scope, ip_address, login_type, created_at) = row;
    UserLogin {
        id,
        user_id,
        destination,
        scope,
        ip_address,
        // Rows are only ever written through `record_login`.
        login_type: LoginType::parse(&login_type).unwrap_or(LoginType::Password),
        created_at,
    }
}

fn conflict_or_db(e: sqlx::Error, what: &str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(format!("{what} already exists"))
        }
        _ => StoreError::Db(e),
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[async_trait]
impl UserRepository for PgStore {
    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(user_from_row).collect())
    }

    async fn upsert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO users (id, username, first_name, last_name, email, avatar_url, verified, \
                                graduation_year, major, shirt_size, jacket_size, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, now()) \
             ON CONFLICT (id) DO UPDATE SET \
                username = EXCLUDED.username, \
                first_name = EXCLUDED.first_name, \
                last_name = EXCLUDED.last_name, \
                email = EXCLUDED.email, \
                avatar_url = EXCLUDED.avatar_url, \
                verified = EXCLUDED.verified, \
                graduation_year = EXCLUDED.graduation_year, \
                major = EXCLUDED.major, \
                shirt_size = EXCLUDED.shirt_size, \
                jacket_size = EXCLUDED.jacket_size, \
                updated_at = now()",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.avatar_url)
        .bind(user.verified)
        .bind(user.graduation_year)
        .bind(&user.major)
        .bind(&user.shirt_size)
        .bind(&user.jacket_size)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or_db(e, "email"))?;
        Ok(())
    }

    async fn delete_user(&self, id: &str) -> Result<bool, StoreError> {
        // Roles, subteams, credentials, refresh tokens and logins cascade.
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ---------------------------------------------------------------------------
// Roles & subteams
// ---------------------------------------------------------------------------

#[async_trait]
impl RoleRepository for PgStore {
    async fn list_role_tags(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT role FROM user_roles WHERE user_id = $1 ORDER BY role",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn add_role_tag(&self, user_id: &str, tag: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO user_roles (user_id, role) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(tag)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_role_tag(&self, user_id: &str, tag: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role = $2")
            .bind(user_id)
            .bind(tag)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_users_with_tag(&self, tag: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT user_id FROM user_roles WHERE role = $1 ORDER BY user_id",
        )
        .bind(tag)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl SubteamRepository for PgStore {
    async fn list_subteams(&self) -> Result<Vec<Subteam>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT id, name FROM subteams ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name)| Subteam { id, name })
            .collect())
    }

    async fn replace_subteams(&self, subteams: &[Subteam]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM subteams").execute(&mut *tx).await?;
        for subteam in subteams {
            sqlx::query("INSERT INTO subteams (id, name) VALUES ($1, $2)")
                .bind(&subteam.id)
                .bind(&subteam.name)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_user_subteams(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT subteam_id FROM user_subteams WHERE user_id = $1 ORDER BY subteam_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn add_user_subteam(&self, user_id: &str, subteam_id: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO user_subteams (user_id, subteam_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(subteam_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_user_subteam(
        &self,
        user_id: &str,
        subteam_id: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM user_subteams WHERE user_id = $1 AND subteam_id = $2")
            .bind(user_id)
            .bind(subteam_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Client applications
// ---------------------------------------------------------------------------

impl PgStore {
    async fn hydrate_clients(
        &self,
        rows: Vec<ClientRow>,
    ) -> Result<Vec<ClientApplication>, StoreError> {
        let mut clients = Vec::with_capacity(rows.len());
        for row in rows {
            let uris = self.list_redirect_uris(&row.0).await?;
            clients.push(client_from_row(row, uris));
        }
        Ok(clients)
    }
}

#[async_trait]
impl ClientRepository for PgStore {
    async fn list_clients(&self) -> Result<Vec<ClientApplication>, StoreError> {
        let rows = sqlx::query_as::<_, ClientRow>(
            "SELECT id, secret, user_id, name, created_at, updated_at \
             FROM client_applications ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;
        self.hydrate_clients(rows).await
    }

    async fn list_clients_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<ClientApplication>, StoreError> {
        let rows = sqlx::query_as::<_, ClientRow>(
            "SELECT id, secret, user_id, name, created_at, updated_at \
             FROM client_applications WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate_clients(rows).await
    }

    async fn get_client(&self, id: &str) -> Result<Option<ClientApplication>, StoreError> {
        let row = sqlx::query_as::<_, ClientRow>(
            "SELECT id, secret, user_id, name, created_at, updated_at \
             FROM client_applications WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            None => Ok(None),
            Some(row) => {
                let uris = self.list_redirect_uris(&row.0).await?;
                Ok(Some(client_from_row(row, uris)))
            }
        }
    }

    async fn upsert_client(&self, client: &ClientApplication) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO client_applications (id, secret, user_id, name, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, now()) \
             ON CONFLICT (id) DO UPDATE SET \
                secret = EXCLUDED.secret, \
                user_id = EXCLUDED.user_id, \
                name = EXCLUDED.name, \
                updated_at = now()",
        )
        .bind(&client.id)
        .bind(&client.secret)
        .bind(&client.user_id)
        .bind(&client.name)
        .bind(client.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_client(&self, id: &str) -> Result<bool, StoreError> {
        // Redirect URIs cascade.
        let result = sqlx::query("DELETE FROM client_applications WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_redirect_uris(&self, client_id: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT redirect_uri FROM client_redirect_uris WHERE client_id = $1 \
             ORDER BY redirect_uri",
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn add_redirect_uri(&self, client_id: &str, uri: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO client_redirect_uris (client_id, redirect_uri) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(client_id)
        .bind(uri)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_redirect_uri(&self, client_id: &str, uri: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM client_redirect_uris WHERE client_id = $1 AND redirect_uri = $2")
            .bind(client_id)
            .bind(uri)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Authorization codes & refresh tokens
// ---------------------------------------------------------------------------

#[async_trait]
impl AuthCodeRepository for PgStore {
    async fn insert_code(&self, code: &AuthorizationCode) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO authorization_codes \
                (code_hash, client_id, user_id, scope, redirect_uri, expires_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&code.code_hash)
        .bind(&code.client_id)
        .bind(&code.user_id)
        .bind(&code.scope)
        .bind(&code.redirect_uri)
        .bind(code.expires_at)
        .bind(code.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn take_code(&self, code_hash: &str) -> Result<Option<AuthorizationCode>, StoreError> {
        let row = sqlx::query_as::<
            _,
            (String, String, String, String, String, DateTime<Utc>, DateTime<Utc>),
        >(
            "DELETE FROM authorization_codes WHERE code_hash = $1 \
             RETURNING code_hash, client_id, user_id, scope, redirect_uri, expires_at, created_at",
        )
        .bind(code_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(
            |(code_hash, client_id, user_id, scope, redirect_uri, expires_at, created_at)| {
                AuthorizationCode {
                    code_hash,
                    client_id,
                    user_id,
                    scope,
                    redirect_uri,
                    expires_at,
                    created_at,
                }
            },
        ))
    }

    async fn purge_expired_codes(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM authorization_codes WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RefreshTokenRepository for PgStore {
    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO refresh_tokens \
                (id, token_hash, user_id, client_id, scope, expires_at, revoked_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(record.id)
        .bind(&record.token_hash)
        .bind(&record.user_id)
        .bind(&record.client_id)
        .bind(&record.scope)
        .bind(record.expires_at)
        .bind(record.revoked_at)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_valid_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let row = sqlx::query_as::<_, RefreshRow>(
            "SELECT id, token_hash, user_id, client_id, scope, expires_at, revoked_at, created_at \
             FROM refresh_tokens \
             WHERE token_hash = $1 AND revoked_at IS NULL AND expires_at > $2",
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(refresh_from_row))
    }

    async fn revoke_refresh_token(&self, token_hash: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = now() \
             WHERE token_hash = $1 AND revoked_at IS NULL",
        )
        .bind(token_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_refresh_tokens(&self, user_id: &str) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = now() \
             WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn purge_expired_refresh_tokens(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM refresh_tokens WHERE expires_at <= $1 OR revoked_at IS NOT NULL",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

// ---------------------------------------------------------------------------
// Logins & credentials
// ---------------------------------------------------------------------------

#[async_trait]
impl LoginRepository for PgStore {
    async fn record_login(&self, login: &UserLogin) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO user_logins \
                (id, user_id, destination, scope, ip_address, login_type, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(login.id)
        .bind(&login.user_id)
        .bind(&login.destination)
        .bind(&login.scope)
        .bind(&login.ip_address)
        .bind(login.login_type.as_str())
        .bind(login.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_logins(&self, user_id: &str, limit: i64) -> Result<Vec<UserLogin>, StoreError> {
        let rows = sqlx::query_as::<_, LoginRow>(
            "SELECT id, user_id, destination, scope, ip_address, login_type, created_at \
             FROM user_logins WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(login_from_row).collect())
    }

    async fn last_login_for(
        &self,
        user_id: &str,
        destination: &str,
        scope: &str,
    ) -> Result<Option<UserLogin>, StoreError> {
        let row = sqlx::query_as::<_, LoginRow>(
            "SELECT id, user_id, destination, scope, ip_address, login_type, created_at \
             FROM user_logins \
             WHERE user_id = $1 AND destination = $2 AND scope = $3 \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .bind(destination)
        .bind(scope)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(login_from_row))
    }
}

#[async_trait]
impl CredentialRepository for PgStore {
    async fn get_credential(&self, user_id: &str) -> Result<Option<PasswordCredential>, StoreError> {
        let row = sqlx::query_as::<_, (String, String, String, DateTime<Utc>)>(
            "SELECT user_id, email, password_hash, created_at FROM user_credentials \
             WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(user_id, email, password_hash, created_at)| PasswordCredential {
            user_id,
            email,
            password_hash,
            created_at,
        }))
    }

    async fn find_credential_by_email(
        &self,
        email: &str,
    ) -> Result<Option<PasswordCredential>, StoreError> {
        let row = sqlx::query_as::<_, (String, String, String, DateTime<Utc>)>(
            "SELECT user_id, email, password_hash, created_at FROM user_credentials \
             WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(user_id, email, password_hash, created_at)| PasswordCredential {
            user_id,
            email,
            password_hash,
            created_at,
        }))
    }

    async fn insert_credential(&self, credential: &PasswordCredential) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO user_credentials (user_id, email, password_hash, created_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&credential.user_id)
        .bind(&credential.email)
        .bind(&credential.password_hash)
        .bind(credential.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or_db(e, "credential"))?;
        Ok(())
    }

    async fn delete_credential(&self, user_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM user_credentials WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
