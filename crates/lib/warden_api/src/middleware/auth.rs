//! Bearer authentication and the caller's permission checks.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum::http::header::AUTHORIZATION;
use axum_extra::extract::CookieJar;

use warden_core::auth::scopes::{BLANKET_SCOPE, FIRST_PARTY_AUDIENCE};
use warden_core::models::TokenClaims;
use warden_core::roles::RoleSet;

use crate::AppState;
use crate::error::AppError;
use crate::services::cookies::ACCESS_COOKIE;

/// The authenticated principal, stored in request extensions.
#[derive(Debug, Clone)]
pub struct Caller {
    pub claims: TokenClaims,
    pub roles: RoleSet,
}

impl Caller {
    pub fn user_id(&self) -> &str {
        &self.claims.sub
    }

    /// A first-party session: audience is this authority itself.
    pub fn is_first_party(&self) -> bool {
        self.claims.aud == FIRST_PARTY_AUDIENCE
    }

    /// The blanket scope grants every permission, but only on a first-party token.
    pub fn has_blanket(&self) -> bool {
        self.is_first_party() && self.claims.has_scope(BLANKET_SCOPE)
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.has_blanket() || self.claims.has_scope(scope)
    }

    pub fn is_self(&self, user_id: &str) -> bool {
        self.claims.sub == user_id
    }

    pub fn is_admin(&self) -> bool {
        self.roles.is_admin()
    }

    pub fn require_first_party(&self) -> Result<(), AppError> {
        allow(self.is_first_party(), "a first-party session is required")
    }

    pub fn require_scope(&self, scope: &str) -> Result<(), AppError> {
        allow(self.has_scope(scope), &format!("missing scope: {scope}"))
    }
}

/// Turn a composed permission check into a result.
pub fn allow(granted: bool, reason: &str) -> Result<(), AppError> {
    if granted {
        Ok(())
    } else {
        Err(AppError::Forbidden(reason.to_string()))
    }
}

fn bearer_token(request: &Request) -> Result<Option<String>, AppError> {
    let Some(header) = request.headers().get(AUTHORIZATION) else {
        return Ok(None);
    };
    let header = header
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid authorization header".into()))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization scheme".into()))?;
    Ok(Some(token.to_string()))
}

/// Axum middleware: takes the token from `Authorization: Bearer <token>`,
/// falling back to the session cookie, validates it and injects [`Caller`]
/// into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = match bearer_token(&request)? {
        Some(token) => token,
        None => jar
            .get(ACCESS_COOKIE)
            .map(|c| c.value().to_string())
            .ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?,
    };

    let claims = state
        .tokens
        .validate(&token)
        .await
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;
    let roles = state.roles.get_roles(&claims.sub).await?;

    request.extensions_mut().insert(Caller { claims, roles });
    Ok(next.run(request).await)
}
