//! First-party session handlers: password login, registration, logout.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};
use axum_extra::extract::CookieJar;
use tracing::info;

use warden_core::auth::TokenSet;

use super::client_ip;
use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::{Caller, allow};
use crate::models::{LoginRequest, LogoutRequest, RegisterRequest, StatusResponse};
use crate::services::cookies;

/// `POST /auth/login`: verify a password and open a first-party session.
///
/// The tokens are returned in the body and also set as httpOnly cookies.
pub async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<TokenSet>)> {
    let tokens = state
        .tokens
        .login_password(&body.email, &body.password, &client_ip(&headers))
        .await?;

    let secure = state.config.secure_cookies;
    let mut jar = jar.add(cookies::access_cookie(&tokens.access_token, secure));
    if let Some(refresh) = &tokens.refresh_token {
        jar = jar.add(cookies::refresh_cookie(refresh, secure));
    }
    Ok((jar, Json(tokens)))
}

/// `POST /auth/register`: set a password for an existing user.
pub async fn register_handler(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<Json<StatusResponse>> {
    state
        .tokens
        .register_password(&body.email, &body.password)
        .await?;
    Ok(Json(StatusResponse { success: true }))
}

/// `DELETE /auth/password/{user_id}`: drop a password so it can be set
/// again. Self or admin.
pub async fn reset_password_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(user_id): Path<String>,
) -> AppResult<Json<StatusResponse>> {
    allow(
        (caller.is_self(&user_id) && caller.is_first_party()) || caller.is_admin(),
        "only the user or an administrator can reset a password",
    )?;
    state.tokens.reset_password(&user_id).await?;
    info!(user_id, by = caller.user_id(), "password reset");
    Ok(Json(StatusResponse { success: true }))
}

/// `POST /auth/logout`: revoke the refresh token (body or cookie) and
/// clear the session cookies. Unknown tokens are not an error.
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Option<Json<LogoutRequest>>,
) -> AppResult<(CookieJar, Json<StatusResponse>)> {
    let token = body
        .and_then(|Json(b)| b.refresh_token)
        .or_else(|| jar.get(cookies::REFRESH_COOKIE).map(|c| c.value().to_string()));
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        state.tokens.revoke_refresh_token(&token).await?;
    }

    let secure = state.config.secure_cookies;
    let jar = jar
        .add(cookies::clear_access_cookie(secure))
        .add(cookies::clear_refresh_cookie(secure));
    Ok((jar, Json(StatusResponse { success: true })))
}
