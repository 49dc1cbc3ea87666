//! OAuth 2.0 / OpenID Connect endpoints.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::{Extension, Form, Json};
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Basic;
use tracing::debug;

use warden_core::auth::{
    AuthError, AuthorizationGrant, AuthorizePreview, AuthorizeRequest, JwkSet, TokenSet, scopes,
};
use warden_core::auth::scopes::IMPLICIT_IDENTITY_SCOPE;
use warden_core::store::UserRepository;

use super::client_ip;
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::Caller;
use crate::models::{DiscoveryDocument, ScopesResponse, TokenRequest, UserInfo};

/// `GET /.well-known/jwks.json`
pub async fn jwks_handler(State(state): State<AppState>) -> Json<JwkSet> {
    Json(state.tokens.jwks())
}

/// `GET /.well-known/openid-configuration`
pub async fn discovery_handler(State(state): State<AppState>) -> Json<DiscoveryDocument> {
    let issuer = state.tokens.issuer().to_string();
    Json(DiscoveryDocument {
        authorization_endpoint: format!("{issuer}/oauth/authorize"),
        token_endpoint: format!("{issuer}/oauth/token"),
        userinfo_endpoint: format!("{issuer}/oauth/userinfo"),
        jwks_uri: format!("{issuer}/.well-known/jwks.json"),
        scopes_supported: scopes::registry()
            .keys()
            .filter(|s| **s != scopes::BLANKET_SCOPE)
            .map(|s| s.to_string())
            .collect(),
        response_types_supported: vec!["code"],
        grant_types_supported: vec!["authorization_code", "refresh_token"],
        subject_types_supported: vec!["public"],
        id_token_signing_alg_values_supported: vec!["RS256"],
        token_endpoint_auth_methods_supported: vec!["client_secret_basic", "client_secret_post"],
        claims_supported: vec![
            "sub",
            "iss",
            "aud",
            "exp",
            "iat",
            "name",
            "given_name",
            "family_name",
            "profile",
            "picture",
            "email",
            "email_verified",
            "roles",
        ],
        issuer,
    })
}

/// `GET /oauth/scopes`
pub async fn scopes_handler() -> Json<ScopesResponse> {
    Json(ScopesResponse {
        scopes: scopes::registry(),
    })
}

/// `GET /oauth/authorize`: validate a request and report whether the
/// consent screen can be skipped.
pub async fn authorize_preview_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(req): Query<AuthorizeRequest>,
) -> AppResult<Json<AuthorizePreview>> {
    caller.require_first_party()?;
    let preview = state
        .tokens
        .preview_authorization(caller.user_id(), &req)
        .await?;
    Ok(Json(preview))
}

/// `POST /oauth/authorize`: the user approved; mint a code.
pub async fn authorize_grant_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    headers: HeaderMap,
    Json(req): Json<AuthorizeRequest>,
) -> AppResult<Json<AuthorizationGrant>> {
    caller.require_first_party()?;
    let grant = state
        .tokens
        .grant_authorization(caller.user_id(), &req, &client_ip(&headers))
        .await?;
    Ok(Json(grant))
}

/// `POST /oauth/token`
///
/// Client credentials come from HTTP Basic auth, else from the form.
pub async fn token_handler(
    State(state): State<AppState>,
    basic: Option<TypedHeader<Authorization<Basic>>>,
    Form(form): Form<TokenRequest>,
) -> AppResult<Json<TokenSet>> {
    debug!(grant_type = %form.grant_type, "token request");
    let tokens = match form.grant_type.as_str() {
        "authorization_code" => {
            let (client_id, client_secret) = match &basic {
                Some(TypedHeader(auth)) => {
                    (auth.username().to_string(), auth.password().to_string())
                }
                None => (
                    form.client_id.clone().unwrap_or_default(),
                    form.client_secret.clone().unwrap_or_default(),
                ),
            };
            let code = required(form.code.as_deref(), "code")?;
            let redirect_uri = required(form.redirect_uri.as_deref(), "redirect_uri")?;
            state
                .tokens
                .exchange_code(&client_id, &client_secret, code, redirect_uri)
                .await?
        }
        "refresh_token" => {
            let token = required(form.refresh_token.as_deref(), "refresh_token")?;
            state.tokens.refresh(token).await?
        }
        other => return Err(AuthError::UnsupportedGrantType(other.to_string()).into()),
    };
    Ok(Json(tokens))
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, AppError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::InvalidRequest(format!("{name} is required")).into())
}

/// `GET /oauth/userinfo`
///
/// Releases the same claims an identity token minted for the caller's scope
/// would: `profile` for name and picture, `email` for the address, `roles`
/// for the hierarchy.
pub async fn userinfo_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> AppResult<Json<UserInfo>> {
    caller.require_scope(IMPLICIT_IDENTITY_SCOPE)?;
    let user = state
        .store
        .get_user(caller.user_id())
        .await?
        .ok_or_else(|| AppError::NotFound("user no longer exists".into()))?;

    let mut info = UserInfo {
        sub: user.id.clone(),
        ..Default::default()
    };
    if caller.has_scope("profile") {
        info.name = Some(user.display_name());
        info.profile = Some(format!(
            "{}/users/{}",
            state.tokens.issuer().trim_end_matches('/'),
            user.id
        ));
        info.given_name = Some(user.first_name);
        info.family_name = Some(user.last_name);
        info.preferred_username = Some(user.username);
        info.picture = Some(user.avatar_url);
        info.email_verified = Some(user.verified);
    }
    if caller.has_scope("email") {
        info.email = Some(user.email);
    }
    if caller.has_scope("roles") {
        info.roles = Some(caller.roles.hierarchy_names());
    }
    Ok(Json(info))
}
