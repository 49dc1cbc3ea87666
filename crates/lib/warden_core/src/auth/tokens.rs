//! Token minting, refresh rotation and validation.

use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::clients::is_known_audience;
use super::keys::{JwkSet, KEY_ID, SigningKeys};
use super::scopes::{self, BLANKET_SCOPE, FIRST_PARTY_AUDIENCE, REFRESH_MARKER};
use super::{AuthError, hash_secret};
use crate::models::{RefreshTokenRecord, TokenClaims, User};
use crate::roles::RoleSet;
use crate::store::{IdentityStore, RefreshTokenRepository, RoleRepository, UserRepository};
use crate::uuid::uuidv7;

/// Access and identity tokens live one hour.
pub const ACCESS_TOKEN_LIFETIME_SECS: i64 = 60 * 60;

/// Refresh tokens live seven days.
pub const REFRESH_TOKEN_LIFETIME_SECS: i64 = 7 * 24 * 60 * 60;

/// Token endpoint response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_in: i64,
    pub scope: String,
}

/// Issues and verifies the authority's tokens.
pub struct TokenService {
    keys: Arc<SigningKeys>,
    issuer: String,
    store: Arc<dyn IdentityStore>,
}

impl TokenService {
    pub fn new(
        keys: Arc<SigningKeys>,
        issuer: impl Into<String>,
        store: Arc<dyn IdentityStore>,
    ) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            store,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn store(&self) -> &dyn IdentityStore {
        self.store.as_ref()
    }

    pub fn jwks(&self) -> JwkSet {
        self.keys.jwks()
    }

    // -------------------------------------------------------------------------
    // Encoding
    // -------------------------------------------------------------------------

    fn base_claims(&self, user_id: &str, audience: &str, scope: String, lifetime: i64) -> TokenClaims {
        let now = Utc::now();
        TokenClaims {
            sub: user_id.to_string(),
            iss: self.issuer.clone(),
            aud: audience.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(lifetime)).timestamp(),
            jti: Uuid::new_v4().to_string(),
            scope,
            name: None,
            given_name: None,
            family_name: None,
            profile: None,
            picture: None,
            email: None,
            email_verified: None,
            roles: None,
        }
    }

    fn sign(&self, claims: &TokenClaims) -> Result<String, AuthError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(KEY_ID.to_string());
        encode(&header, claims, self.keys.encoding_key())
            .map_err(|e| AuthError::TokenError(format!("jwt encode: {e}")))
    }

    /// Check signature, issuer and expiry. Audience and scope rules are
    /// applied by [`TokenService::validate`].
    pub fn decode(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.validate_aud = false;
        validation.leeway = 0;
        decode::<TokenClaims>(token, self.keys.decoding_key(), &validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::TokenError(format!("invalid token: {e}")))
    }

    // -------------------------------------------------------------------------
    // Minting
    // -------------------------------------------------------------------------

    /// Access token carrying every non-OIDC scope requested.
    pub fn mint_access_token(
        &self,
        user_id: &str,
        audience: &str,
        scope: &str,
    ) -> Result<String, AuthError> {
        let claims = self.base_claims(
            user_id,
            audience,
            scopes::access_scope(scope),
            ACCESS_TOKEN_LIFETIME_SECS,
        );
        self.sign(&claims)
    }

    /// Identity token carrying the OIDC scopes requested plus the implicit
    /// profile-read scope, and the profile claims those scopes disclose.
    pub fn mint_id_token(
        &self,
        user: &User,
        roles: &RoleSet,
        audience: &str,
        scope: &str,
    ) -> Result<String, AuthError> {
        let mut claims = self.base_claims(
            &user.id,
            audience,
            scopes::identity_scope(scope),
            ACCESS_TOKEN_LIFETIME_SECS,
        );
        if scopes::contains(scope, "profile") {
            claims.name = Some(user.display_name());
            claims.given_name = Some(user.first_name.clone());
            claims.family_name = Some(user.last_name.clone());
            claims.profile = Some(format!(
                "{}/users/{}",
                self.issuer.trim_end_matches('/'),
                user.id
            ));
            claims.picture = Some(user.avatar_url.clone());
            claims.email_verified = Some(user.verified);
        }
        if scopes::contains(scope, "email") {
            claims.email = Some(user.email.clone());
        }
        if scopes::contains(scope, "roles") {
            claims.roles = Some(roles.hierarchy_names());
        }
        self.sign(&claims)
    }

    /// Refresh token carrying the full scope plus the refresh marker. The
    /// token's hash is persisted so it can be revoked before expiry.
    pub async fn mint_refresh_token(
        &self,
        user_id: &str,
        audience: &str,
        scope: &str,
    ) -> Result<String, AuthError> {
        let claims = self.base_claims(
            user_id,
            audience,
            scopes::refresh_scope(scope),
            REFRESH_TOKEN_LIFETIME_SECS,
        );
        let token = self.sign(&claims)?;
        let now = Utc::now();
        self.store
            .insert_refresh_token(&RefreshTokenRecord {
                id: uuidv7(),
                token_hash: hash_secret(&token),
                user_id: user_id.to_string(),
                client_id: audience.to_string(),
                scope: scopes::strip_refresh_marker(&claims.scope),
                expires_at: now + Duration::seconds(REFRESH_TOKEN_LIFETIME_SECS),
                revoked_at: None,
                created_at: now,
            })
            .await?;
        Ok(token)
    }

    /// The shared issuance path: access token, identity token when `openid`
    /// was granted, and a refresh token.
    pub async fn issue_tokens(
        &self,
        user_id: &str,
        audience: &str,
        scope: &str,
    ) -> Result<TokenSet, AuthError> {
        let access_token = self.mint_access_token(user_id, audience, scope)?;

        let id_token = if scopes::contains(scope, "openid") {
            let user = self
                .store
                .get_user(user_id)
                .await?
                .ok_or_else(|| AuthError::InvalidGrant("unknown subject".into()))?;
            let roles = RoleSet::from_strings(self.store.list_role_tags(user_id).await?);
            Some(self.mint_id_token(&user, &roles, audience, scope)?)
        } else {
            None
        };

        let refresh_token = self.mint_refresh_token(user_id, audience, scope).await?;

        debug!(user_id, audience, scope, "tokens issued");
        Ok(TokenSet {
            access_token,
            id_token,
            refresh_token: Some(refresh_token),
            token_type: "Bearer".into(),
            expires_in: ACCESS_TOKEN_LIFETIME_SECS,
            scope: scope.to_string(),
        })
    }

    /// First-party session for a user who logged in directly.
    pub async fn issue_session(&self, user_id: &str) -> Result<TokenSet, AuthError> {
        self.issue_tokens(user_id, FIRST_PARTY_AUDIENCE, BLANKET_SCOPE)
            .await
    }

    // -------------------------------------------------------------------------
    // Refresh
    // -------------------------------------------------------------------------

    /// Exchange a refresh token for a fresh token triple.
    ///
    /// The presented token is revoked before anything new is minted, so it
    /// cannot be replayed even if minting fails.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, AuthError> {
        let claims = self.decode(refresh_token).map_err(|e| {
            debug!(error = %e, "refresh token rejected");
            AuthError::InvalidGrant("invalid refresh token".into())
        })?;

        if !claims.has_scope(REFRESH_MARKER) {
            return Err(AuthError::InvalidGrant("not a refresh token".into()));
        }

        let token_hash = hash_secret(refresh_token);
        if self
            .store
            .find_valid_refresh_token(&token_hash, Utc::now())
            .await?
            .is_none()
        {
            warn!(sub = %claims.sub, "revoked or unknown refresh token presented");
            return Err(AuthError::InvalidGrant("invalid refresh token".into()));
        }

        // A concurrent refresh with the same token loses here.
        if !self.store.revoke_refresh_token(&token_hash).await? {
            return Err(AuthError::InvalidGrant("invalid refresh token".into()));
        }

        let scope = scopes::strip_refresh_marker(&claims.scope);
        if !scopes::all_registered(&scope) {
            return Err(AuthError::InvalidGrant("invalid refresh token".into()));
        }
        if !is_known_audience(self.store(), &claims.aud).await? {
            return Err(AuthError::InvalidGrant("client no longer registered".into()));
        }

        info!(sub = %claims.sub, aud = %claims.aud, "refresh token rotated");
        self.issue_tokens(&claims.sub, &claims.aud, &scope).await
    }

    /// Revoke a refresh token, e.g. on logout.
    pub async fn revoke_refresh_token(&self, refresh_token: &str) -> Result<bool, AuthError> {
        Ok(self
            .store
            .revoke_refresh_token(&hash_secret(refresh_token))
            .await?)
    }

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------

    /// Full validation of a bearer token.
    ///
    /// Signature, issuer and expiry; every scope registered; audience is the
    /// first-party identifier or a registered client; and the blanket scope
    /// only on a first-party token.
    pub async fn validate(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let claims = self.decode(token)?;

        if !scopes::all_registered(&claims.scope) {
            return Err(AuthError::TokenError("token carries unregistered scope".into()));
        }
        if !is_known_audience(self.store(), &claims.aud).await? {
            return Err(AuthError::TokenError("unknown audience".into()));
        }
        if claims.has_scope(BLANKET_SCOPE) && claims.aud != FIRST_PARTY_AUDIENCE {
            warn!(aud = %claims.aud, sub = %claims.sub, "blanket scope on third-party token");
            return Err(AuthError::TokenError(
                "blanket scope is reserved for the first-party session".into(),
            ));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clients::{ClientInput, save_client};
    use crate::auth::testing::service;
    use crate::models::User;
    use crate::store::RoleRepository;

    async fn seed(store: &dyn IdentityStore) {
        let mut user = User::new("u1", "gaucho", "gaucho@org.example");
        user.first_name = "Gaucho".into();
        user.last_name = "Racer".into();
        user.verified = true;
        store.upsert_user(&user).await.unwrap();
        store.add_role_tag("u1", "lead").await.unwrap();
        store.add_role_tag("u1", "current_member").await.unwrap();
        save_client(
            store,
            "owner",
            ClientInput {
                id: Some("acme".into()),
                name: "Acme".into(),
                redirect_uris: vec!["https://acme.example/cb".into()],
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn access_and_identity_scopes_are_partitioned() {
        let (store, tokens) = service();
        seed(store.as_ref()).await;

        let set = tokens
            .issue_tokens("u1", "acme", "openid profile email roles user:write drive:read")
            .await
            .unwrap();

        let access = tokens.decode(&set.access_token).unwrap();
        assert_eq!(access.scope, "user:write drive:read");
        assert!(access.name.is_none());

        let id = tokens.decode(set.id_token.as_deref().unwrap()).unwrap();
        assert_eq!(id.scope, "openid profile email roles user:read");
        assert_eq!(id.name.as_deref(), Some("Gaucho Racer"));
        assert_eq!(id.email.as_deref(), Some("gaucho@org.example"));
        assert_eq!(id.email_verified, Some(true));
        assert_eq!(
            id.roles,
            Some(vec!["lead".to_string(), "current_member".to_string()])
        );
        assert_eq!(id.aud, "acme");
        assert_eq!(id.iss, crate::auth::testing::ISSUER);
    }

    #[tokio::test]
    async fn identity_token_only_for_openid() {
        let (store, tokens) = service();
        seed(store.as_ref()).await;
        let set = tokens.issue_tokens("u1", "acme", "user:read").await.unwrap();
        assert!(set.id_token.is_none());
        assert!(set.refresh_token.is_some());
        assert_eq!(set.token_type, "Bearer");
        assert_eq!(set.expires_in, ACCESS_TOKEN_LIFETIME_SECS);
    }

    #[tokio::test]
    async fn refresh_rotates_and_rejects_replay() {
        let (store, tokens) = service();
        seed(store.as_ref()).await;
        let first = tokens
            .issue_tokens("u1", "acme", "openid user:read")
            .await
            .unwrap();
        let original = first.refresh_token.unwrap();

        let second = tokens.refresh(&original).await.unwrap();
        let rotated = second.refresh_token.unwrap();
        assert_ne!(rotated, original);
        assert_eq!(second.scope, "openid user:read");
        assert!(second.id_token.is_some());

        let replay = tokens.refresh(&original).await;
        assert!(matches!(replay, Err(AuthError::InvalidGrant(_))));

        assert!(tokens.refresh(&rotated).await.is_ok());
    }

    #[tokio::test]
    async fn access_token_cannot_be_used_to_refresh() {
        let (store, tokens) = service();
        seed(store.as_ref()).await;
        let set = tokens.issue_tokens("u1", "acme", "user:read").await.unwrap();
        assert!(matches!(
            tokens.refresh(&set.access_token).await,
            Err(AuthError::InvalidGrant(_))
        ));
    }

    #[tokio::test]
    async fn refresh_token_does_not_validate_as_bearer() {
        let (store, tokens) = service();
        seed(store.as_ref()).await;
        let set = tokens.issue_tokens("u1", "acme", "user:read").await.unwrap();
        assert!(tokens.validate(&set.access_token).await.is_ok());
        assert!(
            tokens
                .validate(set.refresh_token.as_deref().unwrap())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn blanket_scope_only_validates_for_first_party() {
        let (store, tokens) = service();
        seed(store.as_ref()).await;

        let session = tokens.issue_session("u1").await.unwrap();
        let claims = tokens.validate(&session.access_token).await.unwrap();
        assert_eq!(claims.aud, FIRST_PARTY_AUDIENCE);
        assert!(claims.has_scope(BLANKET_SCOPE));

        let forged = tokens
            .mint_access_token("u1", "acme", "warden:all user:read")
            .unwrap();
        assert!(matches!(
            tokens.validate(&forged).await,
            Err(AuthError::TokenError(_))
        ));
    }

    #[tokio::test]
    async fn unknown_audience_and_scope_fail_validation() {
        let (store, tokens) = service();
        seed(store.as_ref()).await;

        let stray = tokens.mint_access_token("u1", "ghost-client", "user:read").unwrap();
        assert!(tokens.validate(&stray).await.is_err());

        let odd = tokens.mint_access_token("u1", "acme", "user:read launch:rockets").unwrap();
        assert!(tokens.validate(&odd).await.is_err());
    }

    #[tokio::test]
    async fn tokens_from_another_issuer_are_rejected() {
        let (store, tokens) = service();
        seed(store.as_ref()).await;
        let other = TokenService::new(
            crate::auth::testing::keys(),
            "https://elsewhere.test",
            store.clone(),
        );
        let token = other.mint_access_token("u1", "acme", "user:read").unwrap();
        assert!(tokens.validate(&token).await.is_err());
    }
}
