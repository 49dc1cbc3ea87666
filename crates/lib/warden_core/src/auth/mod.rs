//! The token service.
//!
//! Client registry, authorization codes, signed-token minting and
//! verification, scope and audience enforcement, and the password login
//! path. [`TokenService`] ties these together over an
//! [`IdentityStore`](crate::store::IdentityStore).

pub mod authorize;
pub mod clients;
pub mod codes;
pub mod consent;
pub mod credentials;
pub mod keys;
pub mod password;
pub mod scopes;
pub mod tokens;

use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::store::StoreError;

pub use authorize::{AuthorizeRequest, AuthorizePreview, AuthorizationGrant, ConsentPrompt};
pub use keys::{Jwk, JwkSet, SigningKeys};
pub use tokens::{TokenService, TokenSet};

/// Authentication and authorization errors.
///
/// The `Invalid*` variants map one-to-one onto OAuth error codes and carry
/// deliberately generic messages.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    CredentialError,

    #[error("Invalid client credentials")]
    InvalidClient,

    #[error("Invalid grant: {0}")]
    InvalidGrant(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    #[error("Unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    #[error("Unsupported response type: {0}")]
    UnsupportedResponseType(String),

    #[error("Token error: {0}")]
    TokenError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Key error: {0}")]
    KeyError(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Random alphanumeric string of the given length.
pub(crate) fn random_string(len: usize) -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// SHA-256 hex digest used to store codes and refresh tokens.
pub(crate) fn hash_secret(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use super::{SigningKeys, TokenService};
    use crate::store::MemoryStore;

    pub const SIGNING_KEY_PEM: &str = include_str!("testdata/signing_key.pem");
    pub const ISSUER: &str = "https://warden.test";

    pub fn keys() -> Arc<SigningKeys> {
        Arc::new(SigningKeys::from_pem(SIGNING_KEY_PEM).unwrap())
    }

    pub fn service() -> (Arc<MemoryStore>, TokenService) {
        let store = Arc::new(MemoryStore::new());
        let tokens = TokenService::new(keys(), ISSUER, store.clone());
        (store, tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_string_has_requested_length() {
        let s = random_string(32);
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn hash_secret_is_stable_hex() {
        let a = hash_secret("abc");
        assert_eq!(a, hash_secret("abc"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, hash_secret("abd"));
    }
}
