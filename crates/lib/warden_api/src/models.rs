//! Request and response bodies.
//!
//! OAuth endpoints use the protocol's snake_case names; everything else is
//! camelCase.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::bridge::SyncOutcome;
use warden_core::directory::github::OrgRole;
use warden_core::directory::wiki::WikiUser;
use warden_core::models::{ClientApplication, User, UserLogin};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

// -----------------------------------------------------------------------------
// OAuth
// -----------------------------------------------------------------------------

/// Form body of `POST /oauth/token`.
#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    pub scopes_supported: Vec<String>,
    pub response_types_supported: Vec<&'static str>,
    pub grant_types_supported: Vec<&'static str>,
    pub subject_types_supported: Vec<&'static str>,
    pub id_token_signing_alg_values_supported: Vec<&'static str>,
    pub token_endpoint_auth_methods_supported: Vec<&'static str>,
    pub claims_supported: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct ScopesResponse {
    pub scopes: BTreeMap<&'static str, &'static str>,
}

/// Claims released by `/oauth/userinfo`. Everything past `sub` depends on
/// the disclosure scopes the token carries.
#[derive(Debug, Default, Serialize)]
pub struct UserInfo {
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

// -----------------------------------------------------------------------------
// Session auth
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
}

// -----------------------------------------------------------------------------
// Applications
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRequest {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationResponse {
    pub id: String,
    /// Only returned to the owner or an administrator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub user_id: String,
    pub name: String,
    pub redirect_uris: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationResponse {
    pub fn with_secret(client: ClientApplication) -> Self {
        let secret = Some(client.secret.clone());
        Self {
            secret,
            ..Self::without_secret(client)
        }
    }

    pub fn without_secret(client: ClientApplication) -> Self {
        Self {
            id: client.id,
            secret: None,
            user_id: client.user_id,
            name: client.name,
            redirect_uris: client.redirect_uris,
            created_at: client.created_at,
            updated_at: client.updated_at,
        }
    }
}

// -----------------------------------------------------------------------------
// Users
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub avatar_url: String,
    pub verified: bool,
    pub graduation_year: Option<i32>,
    pub major: Option<String>,
    pub shirt_size: Option<String>,
    pub jacket_size: Option<String>,
    pub roles: Vec<String>,
    pub subteams: Vec<String>,
    pub profile_complete: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserResponse {
    pub fn new(user: User, roles: Vec<String>, subteams: Vec<String>) -> Self {
        let profile_complete = warden_core::users::is_profile_complete(&user);
        Self {
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            avatar_url: user.avatar_url,
            verified: user.verified,
            graduation_year: user.graduation_year,
            major: user.major,
            shirt_size: user.shirt_size,
            jacket_size: user.jacket_size,
            roles,
            subteams,
            profile_complete,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginEntry {
    pub id: String,
    pub destination: String,
    pub scope: String,
    pub ip_address: String,
    pub login_type: String,
    pub created_at: DateTime<Utc>,
}

impl From<UserLogin> for LoginEntry {
    fn from(l: UserLogin) -> Self {
        Self {
            id: l.id.to_string(),
            destination: l.destination,
            scope: l.scope,
            ip_address: l.ip_address,
            login_type: l.login_type.as_str().to_string(),
            created_at: l.created_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginsQuery {
    pub limit: Option<i64>,
}

// -----------------------------------------------------------------------------
// Directory accounts
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GitHubLinkRequest {
    pub username: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubLinkResponse {
    pub username: String,
    /// The organization role the invite was sent with.
    pub role: OrgRole,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WikiAccountResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
}

impl From<WikiUser> for WikiAccountResponse {
    fn from(u: WikiUser) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
        }
    }
}

// -----------------------------------------------------------------------------
// Chat bot hooks
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// `synced`, `skipped_bot`, `skipped_unknown_user` or `not_in_guild`.
    pub outcome: &'static str,
    pub roles_added: Vec<String>,
    pub roles_removed: Vec<String>,
    pub subteams_added: Vec<String>,
    pub subteams_removed: Vec<String>,
    pub stripped_groups: Vec<String>,
}

impl From<SyncOutcome> for SyncResponse {
    fn from(outcome: SyncOutcome) -> Self {
        let empty = |label: &'static str| Self {
            outcome: label,
            roles_added: Vec::new(),
            roles_removed: Vec::new(),
            subteams_added: Vec::new(),
            subteams_removed: Vec::new(),
            stripped_groups: Vec::new(),
        };
        match outcome {
            SyncOutcome::Synced {
                roles,
                subteams,
                stripped_groups,
            } => Self {
                outcome: "synced",
                roles_added: roles.added,
                roles_removed: roles.removed,
                subteams_added: subteams.added,
                subteams_removed: subteams.removed,
                stripped_groups,
            },
            SyncOutcome::SkippedBot => empty("skipped_bot"),
            SyncOutcome::SkippedUnknownUser => empty("skipped_unknown_user"),
            SyncOutcome::NotInGuild => empty("not_in_guild"),
        }
    }
}
