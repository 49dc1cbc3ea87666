//! Shared-secret guard for the `/internal` routes.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum::http::header::AUTHORIZATION;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::AppState;
use crate::error::AppError;

/// Axum middleware: requires `Authorization: Bearer <INTERNAL_TOKEN>`. With no
/// token configured every request is refused.
pub async fn require_internal(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.config.internal_token.as_deref() else {
        warn!("internal route called but no internal token is configured");
        return Err(AppError::NotFound("internal routes are disabled".into()));
    };

    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or_else(|| AppError::Unauthorized("Missing internal token".into()))?;

    if !token_matches(expected, presented) {
        warn!("internal route called with a bad token");
        return Err(AppError::Unauthorized("Invalid internal token".into()));
    }
    Ok(next.run(request).await)
}

fn token_matches(expected: &str, presented: &str) -> bool {
    expected.len() == presented.len() && bool::from(expected.as_bytes().ct_eq(presented.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_comparison() {
        assert!(token_matches("s3cret", "s3cret"));
        assert!(!token_matches("s3cret", "s3creT"));
        assert!(!token_matches("s3cret", "s3cret-longer"));
        assert!(!token_matches("s3cret", ""));
    }
}
