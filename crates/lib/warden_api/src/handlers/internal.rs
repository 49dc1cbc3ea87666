//! Hooks the chat bot calls when a member's groups change or when a member
//! completes verification.

use axum::extract::{Path, State};
use axum::Json;
use tracing::info;

use warden_core::bridge::RoleBridge;
use warden_core::users::Verification;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{SyncResponse, UserResponse};

fn bridge(state: &AppState) -> AppResult<&RoleBridge> {
    state
        .integrations
        .bridge
        .as_deref()
        .ok_or_else(|| AppError::NotFound("the chat integration is not configured".into()))
}

/// `POST /internal/chat/members/{user_id}/sync`
pub async fn sync_member_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<SyncResponse>> {
    let outcome = bridge(&state)?.sync_member(&user_id).await?;
    info!(%user_id, ?outcome, "member update handled");
    Ok(Json(outcome.into()))
}

/// `POST /internal/chat/verify`
pub async fn verify_handler(
    State(state): State<AppState>,
    Json(input): Json<Verification>,
) -> AppResult<Json<UserResponse>> {
    let user = bridge(&state)?.verify(input).await?;
    let roles = state.roles.get_roles(&user.id).await?;
    let subteams = state.roles.get_subteams(&user.id).await?;
    Ok(Json(UserResponse::new(
        user,
        roles.encode().into_iter().collect(),
        subteams.into_iter().collect(),
    )))
}
