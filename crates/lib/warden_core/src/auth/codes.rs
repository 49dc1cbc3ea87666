//! Single-use authorization codes.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use super::{AuthError, hash_secret, random_string};
use crate::models::AuthorizationCode;
use crate::store::{AuthCodeRepository, IdentityStore};

/// Codes expire five minutes after issue.
pub const CODE_LIFETIME_SECS: i64 = 5 * 60;

const CODE_LENGTH: usize = 32;

/// Same message for unknown, consumed, expired and mismatched codes.
const INVALID_CODE: &str = "invalid or expired code";

/// Mint a code bound to `(client, user, scope, redirect_uri)`. Returns the
/// plaintext code; only its hash is stored.
pub async fn issue_code(
    store: &dyn IdentityStore,
    client_id: &str,
    user_id: &str,
    scope: &str,
    redirect_uri: &str,
) -> Result<String, AuthError> {
    let code = random_string(CODE_LENGTH);
    let now = Utc::now();
    store
        .insert_code(&AuthorizationCode {
            code_hash: hash_secret(&code),
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            scope: scope.to_string(),
            redirect_uri: redirect_uri.to_string(),
            expires_at: now + Duration::seconds(CODE_LIFETIME_SECS),
            created_at: now,
        })
        .await?;
    debug!(client_id, user_id, "authorization code issued");
    Ok(code)
}

/// Consume a code.
///
/// The code is deleted before any check runs, so a second redemption fails
/// whether or not the first one succeeded.
pub async fn redeem_code(
    store: &dyn IdentityStore,
    code: &str,
    client_id: &str,
    redirect_uri: &str,
    now: DateTime<Utc>,
) -> Result<AuthorizationCode, AuthError> {
    let Some(record) = store.take_code(&hash_secret(code)).await? else {
        return Err(AuthError::InvalidGrant(INVALID_CODE.into()));
    };
    if record.expires_at <= now {
        debug!(client_id, "expired authorization code presented");
        return Err(AuthError::InvalidGrant(INVALID_CODE.into()));
    }
    if record.client_id != client_id || record.redirect_uri != redirect_uri {
        warn!(
            client_id,
            bound_client = %record.client_id,
            "authorization code presented with mismatched client or redirect_uri"
        );
        return Err(AuthError::InvalidGrant(INVALID_CODE.into()));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const CB: &str = "https://acme.example/cb";

    #[tokio::test]
    async fn a_code_redeems_at_most_once() {
        let store = MemoryStore::new();
        let code = issue_code(&store, "acme", "u1", "openid", CB).await.unwrap();

        let first = redeem_code(&store, &code, "acme", CB, Utc::now()).await;
        assert_eq!(first.unwrap().user_id, "u1");

        let second = redeem_code(&store, &code, "acme", CB, Utc::now()).await;
        assert!(matches!(second, Err(AuthError::InvalidGrant(m)) if m == INVALID_CODE));
    }

    #[tokio::test]
    async fn failed_redemption_still_burns_the_code() {
        let store = MemoryStore::new();
        let code = issue_code(&store, "acme", "u1", "openid", CB).await.unwrap();

        let wrong = redeem_code(&store, &code, "acme", "https://evil.example/cb", Utc::now()).await;
        assert!(matches!(wrong, Err(AuthError::InvalidGrant(_))));

        let retry = redeem_code(&store, &code, "acme", CB, Utc::now()).await;
        assert!(matches!(retry, Err(AuthError::InvalidGrant(_))));
    }

    #[tokio::test]
    async fn expired_and_unknown_codes_look_the_same() {
        let store = MemoryStore::new();
        let code = issue_code(&store, "acme", "u1", "openid", CB).await.unwrap();
        let later = Utc::now() + Duration::seconds(CODE_LIFETIME_SECS + 1);

        let expired = redeem_code(&store, &code, "acme", CB, later).await.unwrap_err();
        let unknown = redeem_code(&store, "nope", "acme", CB, Utc::now())
            .await
            .unwrap_err();
        assert_eq!(expired.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn wrong_client_is_rejected() {
        let store = MemoryStore::new();
        let code = issue_code(&store, "acme", "u1", "openid", CB).await.unwrap();
        assert!(redeem_code(&store, &code, "other", CB, Utc::now()).await.is_err());
    }
}
