//! First-party password login.

use chrono::Utc;
use tracing::{info, warn};

use super::password::{hash_password, validate_policy, verify_password};
use super::scopes::{BLANKET_SCOPE, FIRST_PARTY_AUDIENCE};
use super::tokens::{TokenService, TokenSet};
use super::AuthError;
use crate::models::{LoginType, PasswordCredential, UserLogin};
use crate::store::{CredentialRepository, LoginRepository, RefreshTokenRepository, UserRepository};
use crate::uuid::uuidv7;

impl TokenService {
    /// Attach a password to an existing user. Accounts are never created
    /// here; they come from verification.
    pub async fn register_password(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let user = self
            .store()
            .find_user_by_email(email)
            .await?
            .ok_or_else(|| AuthError::NotFound(format!("no user registered with email: {email}")))?;

        if self.store().get_credential(&user.id).await?.is_some() {
            return Err(AuthError::ValidationError(
                "a password is already set for this user".into(),
            ));
        }
        validate_policy(password)?;

        self.store()
            .insert_credential(&PasswordCredential {
                user_id: user.id.clone(),
                email: user.email.clone(),
                password_hash: hash_password(password)?,
                created_at: Utc::now(),
            })
            .await?;
        info!(user_id = %user.id, "password registered");
        Ok(())
    }

    /// Check an email/password pair and open a first-party session.
    pub async fn login_password(
        &self,
        email: &str,
        password: &str,
        ip_address: &str,
    ) -> Result<TokenSet, AuthError> {
        let Some(credential) = self.store().find_credential_by_email(email).await? else {
            warn!(email, "login for unknown email");
            return Err(AuthError::CredentialError);
        };
        if !verify_password(password, &credential.password_hash)? {
            warn!(user_id = %credential.user_id, "login with wrong password");
            return Err(AuthError::CredentialError);
        }

        self.store()
            .record_login(&UserLogin {
                id: uuidv7(),
                user_id: credential.user_id.clone(),
                destination: FIRST_PARTY_AUDIENCE.to_string(),
                scope: BLANKET_SCOPE.to_string(),
                ip_address: ip_address.to_string(),
                login_type: LoginType::Password,
                created_at: Utc::now(),
            })
            .await?;

        info!(user_id = %credential.user_id, "password login");
        self.issue_session(&credential.user_id).await
    }

    /// Remove a user's password and end every session they hold.
    pub async fn reset_password(&self, user_id: &str) -> Result<(), AuthError> {
        if !self.store().delete_credential(user_id).await? {
            return Err(AuthError::NotFound(format!(
                "no password set for user: {user_id}"
            )));
        }
        let revoked = self.store().revoke_all_refresh_tokens(user_id).await?;
        info!(user_id, revoked, "password reset");
        Ok(())
    }
}
