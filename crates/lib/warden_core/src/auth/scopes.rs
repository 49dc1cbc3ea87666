//! The published scope registry and the scope partitioning rules.
//!
//! OIDC scopes (`openid`, `profile`, `email`, `roles`) are claim-disclosure
//! directives, never permissions: they go on identity tokens only. Every
//! other scope is a permission and goes on access tokens only.

use std::collections::BTreeMap;

use super::AuthError;

/// Audience of the system's own session.
pub const FIRST_PARTY_AUDIENCE: &str = "warden";

/// Full privilege. Only valid on tokens whose audience is [`FIRST_PARTY_AUDIENCE`].
pub const BLANKET_SCOPE: &str = "warden:all";

/// Marker carried by refresh tokens and by nothing else. Not registered, so
/// a refresh token never validates as a bearer token.
pub const REFRESH_MARKER: &str = "refresh_token";

/// Added to every identity token.
pub const IMPLICIT_IDENTITY_SCOPE: &str = "user:read";

pub const OIDC_SCOPES: [&str; 4] = ["openid", "profile", "email", "roles"];

const REGISTRY: &[(&str, &str)] = &[
    ("openid", "Verify your identity"),
    ("profile", "Read your name and profile picture"),
    ("email", "Read your email address"),
    ("roles", "Read your organization roles"),
    ("user:read", "Read your user profile"),
    ("user:write", "Update your user profile"),
    ("drive:read", "Read your shared drive access"),
    ("drive:write", "Manage your shared drive access"),
    ("github:read", "Read your GitHub organization membership"),
    ("github:write", "Manage your GitHub organization membership"),
    ("wiki:read", "Read your wiki account"),
    ("wiki:write", "Manage your wiki account"),
    ("applications:read", "Read registered client applications"),
    ("logins:read", "Read your login history"),
    (BLANKET_SCOPE, "Full access to your account"),
];

/// Scope name → description.
pub fn registry() -> BTreeMap<&'static str, &'static str> {
    REGISTRY.iter().copied().collect()
}

pub fn is_registered(scope: &str) -> bool {
    REGISTRY.iter().any(|(name, _)| *name == scope)
}

pub fn is_oidc(scope: &str) -> bool {
    OIDC_SCOPES.contains(&scope)
}

/// Split a space-separated scope string, dropping duplicates but keeping order.
pub fn split(scope: &str) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::new();
    for s in scope.split_whitespace() {
        if !out.contains(&s) {
            out.push(s);
        }
    }
    out
}

pub fn join<'a>(scopes: impl IntoIterator<Item = &'a str>) -> String {
    scopes.into_iter().collect::<Vec<_>>().join(" ")
}

pub fn contains(scope: &str, wanted: &str) -> bool {
    scope.split_whitespace().any(|s| s == wanted)
}

pub fn all_registered(scope: &str) -> bool {
    scope.split_whitespace().all(is_registered)
}

/// Scope for an access token: every non-OIDC scope requested.
pub fn access_scope(scope: &str) -> String {
    join(
        split(scope)
            .into_iter()
            .filter(|s| !is_oidc(s) && *s != REFRESH_MARKER),
    )
}

/// Scope for an identity token: the OIDC scopes requested plus the implicit
/// profile-read scope.
pub fn identity_scope(scope: &str) -> String {
    let mut out: Vec<&str> = split(scope).into_iter().filter(|s| is_oidc(s)).collect();
    out.push(IMPLICIT_IDENTITY_SCOPE);
    join(out)
}

/// Scope for a refresh token: everything granted plus the marker.
pub fn refresh_scope(scope: &str) -> String {
    let mut out: Vec<&str> = split(scope)
        .into_iter()
        .filter(|s| *s != REFRESH_MARKER)
        .collect();
    out.push(REFRESH_MARKER);
    join(out)
}

pub fn strip_refresh_marker(scope: &str) -> String {
    join(split(scope).into_iter().filter(|s| *s != REFRESH_MARKER))
}

/// A scope a third-party client may be granted: non-empty, fully
/// registered, and free of the blanket scope.
pub fn validate_grantable(scope: &str) -> Result<(), AuthError> {
    if scope.trim().is_empty() {
        return Err(AuthError::InvalidScope("scope is required".into()));
    }
    if !all_registered(scope) {
        return Err(AuthError::InvalidScope("scope is invalid".into()));
    }
    if contains(scope, BLANKET_SCOPE) {
        return Err(AuthError::InvalidScope("scope is invalid".into()));
    }
    Ok(())
}
