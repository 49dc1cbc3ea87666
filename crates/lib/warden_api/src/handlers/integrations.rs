//! Linking a user's accounts in the external directories.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use tracing::info;

use warden_core::models::User;
use warden_core::store::UserRepository;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{Caller, allow};
use crate::models::{GitHubLinkRequest, GitHubLinkResponse, WikiAccountResponse};

async fn target_user(state: &AppState, id: &str) -> AppResult<User> {
    state
        .store
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no user found with id: {id}")))
}

/// `POST /users/{id}/github`: `github:write`, self or admin.
///
/// Invites the login to the organization and records it as the user's
/// `github:` link.
pub async fn link_github_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    Json(body): Json<GitHubLinkRequest>,
) -> AppResult<Json<GitHubLinkResponse>> {
    caller.require_scope("github:write")?;
    allow(
        caller.is_self(&id) || caller.is_admin(),
        "only the user or an administrator can link this account",
    )?;
    let github = state
        .integrations
        .github
        .as_ref()
        .ok_or_else(|| AppError::NotFound("the github integration is not configured".into()))?;

    let user = target_user(&state, &id).await?;
    let username = body.username.trim().to_string();
    let role = github.link_account(&user, &username).await?;
    info!(user_id = %id, by = caller.user_id(), %username, "github account linked via API");
    Ok(Json(GitHubLinkResponse { username, role }))
}

/// `POST /users/{id}/wiki`: `wiki:write`, self or admin.
pub async fn create_wiki_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> AppResult<Json<WikiAccountResponse>> {
    caller.require_scope("wiki:write")?;
    allow(
        caller.is_self(&id) || caller.is_admin(),
        "only the user or an administrator can create this account",
    )?;
    let wiki = state
        .integrations
        .wiki
        .as_ref()
        .ok_or_else(|| AppError::NotFound("the wiki integration is not configured".into()))?;

    let user = target_user(&state, &id).await?;
    let account = wiki.create_account(&user).await?;
    info!(user_id = %id, by = caller.user_id(), account_id = account.id, "wiki account created via API");
    Ok(Json(account.into()))
}
