//! RS256 signing keys and their JWKS publication.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{DecodingKey, EncodingKey};
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};

use super::AuthError;

/// Key id advertised in the JWKS and token headers.
pub const KEY_ID: &str = "1";

/// One JSON Web Key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(rename = "use")]
    pub use_: String,
    pub alg: String,
    pub kid: String,
    pub n: String,
    pub e: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// The authority's signing key pair.
pub struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    jwk: Jwk,
}

impl SigningKeys {
    /// Load from a PKCS#8 (`BEGIN PRIVATE KEY`) or PKCS#1
    /// (`BEGIN RSA PRIVATE KEY`) PEM document.
    pub fn from_pem(pem: &str) -> Result<Self, AuthError> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| AuthError::KeyError(format!("parse private key: {e}")))?;

        let n = URL_SAFE_NO_PAD.encode(private.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(private.e().to_bytes_be());

        let encoding = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AuthError::KeyError(format!("encoding key: {e}")))?;
        let decoding = DecodingKey::from_rsa_components(&n, &e)
            .map_err(|e| AuthError::KeyError(format!("decoding key: {e}")))?;

        Ok(Self {
            encoding,
            decoding,
            jwk: Jwk {
                kty: "RSA".into(),
                use_: "sig".into(),
                alg: "RS256".into(),
                kid: KEY_ID.into(),
                n,
                e,
            },
        })
    }

    /// Read a PEM file. A missing or unreadable file is a key error.
    pub fn from_file(path: &Path) -> Result<Self, AuthError> {
        let pem = std::fs::read_to_string(path)
            .map_err(|e| AuthError::KeyError(format!("read {}: {e}", path.display())))?;
        Self::from_pem(&pem)
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }

    pub fn jwks(&self) -> JwkSet {
        JwkSet {
            keys: vec![self.jwk.clone()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::SIGNING_KEY_PEM;

    #[test]
    fn loads_pkcs8_pem_and_publishes_components() {
        let keys = SigningKeys::from_pem(SIGNING_KEY_PEM).unwrap();
        let jwks = keys.jwks();
        assert_eq!(jwks.keys.len(), 1);
        let jwk = &jwks.keys[0];
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.use_, "sig");
        assert_eq!(jwk.alg, "RS256");
        assert_eq!(jwk.kid, KEY_ID);
        // 65537
        assert_eq!(jwk.e, "AQAB");
        assert!(jwk.n.len() > 300);

        let json = serde_json::to_value(jwk).unwrap();
        assert_eq!(json["use"], "sig");
    }

    #[test]
    fn rejects_garbage() {
        let err = SigningKeys::from_pem("not a key").err().unwrap();
        assert!(matches!(err, AuthError::KeyError(_)));
    }

    #[test]
    fn missing_file_is_a_key_error() {
        let err = SigningKeys::from_file(Path::new("/nonexistent/warden.pem"))
            .err()
            .unwrap();
        assert!(matches!(err, AuthError::KeyError(_)));
    }
}
