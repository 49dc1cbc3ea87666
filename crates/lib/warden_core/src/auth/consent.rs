//! `prompt=none` consent bypass.
//!
//! Clients disagree on what `prompt` means. Only `none` asks to skip the
//! consent screen, and it is honoured only when the same user granted the
//! same client the exact same scope within the last seven days. Anything
//! else, including a failed history lookup, requires consent.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::store::{IdentityStore, LoginRepository};

pub const CONSENT_WINDOW_DAYS: i64 = 7;

pub async fn can_skip_consent(
    store: &dyn IdentityStore,
    user_id: &str,
    client_id: &str,
    scope: &str,
    prompt: Option<&str>,
    now: DateTime<Utc>,
) -> bool {
    if prompt != Some("none") {
        return false;
    }
    match store.last_login_for(user_id, client_id, scope).await {
        Ok(Some(login)) if login.created_at > now - Duration::days(CONSENT_WINDOW_DAYS) => {
            info!(user_id, client_id, scope, "previous grant found, skipping consent");
            true
        }
        Ok(_) => false,
        Err(e) => {
            warn!(user_id, client_id, error = %e, "login history lookup failed, requiring consent");
            false
        }
    }
}
