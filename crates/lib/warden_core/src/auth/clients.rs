//! Client application registry.

use std::collections::BTreeSet;

use chrono::Utc;
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use url::Url;

use super::scopes::FIRST_PARTY_AUDIENCE;
use super::{AuthError, random_string};
use crate::models::ClientApplication;
use crate::store::{ClientRepository, IdentityStore};

const CLIENT_ID_LENGTH: usize = 12;
const CLIENT_SECRET_LENGTH: usize = 32;

/// Create-or-update input for a client application.
#[derive(Debug, Clone)]
pub struct ClientInput {
    /// Existing client id to update; `None` registers a new client.
    pub id: Option<String>,
    pub name: String,
    pub redirect_uris: Vec<String>,
}

fn validate_input(input: &ClientInput) -> Result<(), AuthError> {
    if input.name.trim().is_empty() {
        return Err(AuthError::ValidationError("name is required".into()));
    }
    if input.redirect_uris.is_empty() {
        return Err(AuthError::ValidationError(
            "at least one redirect_uri is required".into(),
        ));
    }
    for uri in &input.redirect_uris {
        let parsed = Url::parse(uri)
            .map_err(|_| AuthError::ValidationError(format!("invalid redirect_uri: {uri}")))?;
        if parsed.fragment().is_some() {
            return Err(AuthError::ValidationError(format!(
                "redirect_uri must not contain a fragment: {uri}"
            )));
        }
    }
    Ok(())
}

/// Register a new client or update an existing one.
///
/// An update keeps the existing secret, owner and creation time; the
/// redirect URI set is replaced by diff.
pub async fn save_client(
    store: &dyn IdentityStore,
    owner_id: &str,
    input: ClientInput,
) -> Result<ClientApplication, AuthError> {
    validate_input(&input)?;

    let existing = match &input.id {
        Some(id) => store.get_client(id).await?,
        None => None,
    };

    let now = Utc::now();
    let client = match existing {
        Some(existing) => ClientApplication {
            name: input.name.trim().to_string(),
            updated_at: now,
            ..existing
        },
        None => ClientApplication {
            id: input
                .id
                .clone()
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| random_string(CLIENT_ID_LENGTH)),
            secret: random_string(CLIENT_SECRET_LENGTH),
            user_id: owner_id.to_string(),
            name: input.name.trim().to_string(),
            redirect_uris: Vec::new(),
            created_at: now,
            updated_at: now,
        },
    };

    if client.id == FIRST_PARTY_AUDIENCE {
        return Err(AuthError::ValidationError("client id is reserved".into()));
    }

    store.upsert_client(&client).await?;
    let redirect_uris = set_redirect_uris(store, &client.id, &input.redirect_uris).await?;
    info!(client_id = %client.id, owner = %client.user_id, "client application saved");

    Ok(ClientApplication {
        redirect_uris,
        ..client
    })
}

/// Replace a client's redirect URIs, writing only the difference.
pub async fn set_redirect_uris(
    store: &dyn IdentityStore,
    client_id: &str,
    desired: &[String],
) -> Result<Vec<String>, AuthError> {
    let current: BTreeSet<String> = store
        .list_redirect_uris(client_id)
        .await?
        .into_iter()
        .collect();
    let desired: BTreeSet<String> = desired.iter().cloned().collect();
    for uri in desired.difference(&current) {
        store.add_redirect_uri(client_id, uri).await?;
    }
    for uri in current.difference(&desired) {
        store.remove_redirect_uri(client_id, uri).await?;
    }
    Ok(desired.into_iter().collect())
}

/// Delete a client and its redirect URIs.
pub async fn delete_client(store: &dyn IdentityStore, client_id: &str) -> Result<(), AuthError> {
    if !store.delete_client(client_id).await? {
        return Err(AuthError::NotFound(format!(
            "no client application found with id: {client_id}"
        )));
    }
    info!(client_id, "client application deleted");
    Ok(())
}

/// Check a presented client id and secret.
///
/// Every failure is the same [`AuthError::InvalidClient`], whichever half
/// was wrong.
pub async fn authenticate_client(
    store: &dyn IdentityStore,
    client_id: &str,
    client_secret: &str,
) -> Result<ClientApplication, AuthError> {
    let Some(client) = store.get_client(client_id).await? else {
        warn!(client_id, "client authentication failed");
        return Err(AuthError::InvalidClient);
    };
    if bool::from(client.secret.as_bytes().ct_eq(client_secret.as_bytes())) {
        Ok(client)
    } else {
        warn!(client_id, "client authentication failed");
        Err(AuthError::InvalidClient)
    }
}

/// Exact-match check against the registered redirect URIs.
pub fn redirect_uri_registered(client: &ClientApplication, uri: &str) -> bool {
    client.redirect_uris.iter().any(|u| u == uri)
}

/// The first-party identifier or a currently registered client id.
pub async fn is_known_audience(store: &dyn IdentityStore, audience: &str) -> Result<bool, AuthError> {
    if audience == FIRST_PARTY_AUDIENCE {
        return Ok(true);
    }
    Ok(store.get_client(audience).await?.is_some())
}
