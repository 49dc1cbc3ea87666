//! Request handlers.

pub mod applications;
pub mod auth;
pub mod integrations;
pub mod internal;
pub mod oauth;
pub mod users;

use axum::http::HeaderMap;

/// Best-effort client address for the login history.
pub(crate) fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
