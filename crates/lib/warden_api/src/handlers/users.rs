//! User record handlers.

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use tracing::info;

use warden_core::store::{LoginRepository, UserRepository};
use warden_core::users::{self, ProfileUpdate};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{Caller, allow};
use crate::models::{LoginEntry, LoginsQuery, StatusResponse, UserResponse};

const DEFAULT_LOGIN_LIMIT: i64 = 50;
const MAX_LOGIN_LIMIT: i64 = 500;

async fn user_response(state: &AppState, id: &str) -> AppResult<UserResponse> {
    let user = state
        .store
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no user found with id: {id}")))?;
    let roles = state.roles.get_roles(id).await?;
    let subteams = state.roles.get_subteams(id).await?;
    Ok(UserResponse::new(
        user,
        roles.encode().into_iter().collect(),
        subteams.into_iter().collect(),
    ))
}

/// `GET /users/{id}`: `user:read`, self or admin.
pub async fn get_user_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> AppResult<Json<UserResponse>> {
    caller.require_scope("user:read")?;
    allow(
        caller.is_self(&id) || caller.is_admin(),
        "only the user or an administrator can read this record",
    )?;
    Ok(Json(user_response(&state, &id).await?))
}

/// `PATCH /users/{id}`: `user:write`, self or admin.
pub async fn update_user_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    Json(update): Json<ProfileUpdate>,
) -> AppResult<Json<UserResponse>> {
    caller.require_scope("user:write")?;
    allow(
        caller.is_self(&id) || caller.is_admin(),
        "only the user or an administrator can edit this record",
    )?;
    users::update_profile(state.store.as_ref(), &id, update).await?;
    Ok(Json(user_response(&state, &id).await?))
}

/// `DELETE /users/{id}`: administrators on a first-party session.
pub async fn delete_user_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> AppResult<Json<StatusResponse>> {
    allow(
        caller.is_admin() && caller.is_first_party(),
        "only an administrator can delete users",
    )?;
    users::delete_user(state.store.as_ref(), &id).await?;
    info!(user_id = %id, by = caller.user_id(), "user deleted via API");
    Ok(Json(StatusResponse { success: true }))
}

/// `GET /users/{id}/logins`: `logins:read`, self or admin. Newest first.
pub async fn list_logins_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    Query(query): Query<LoginsQuery>,
) -> AppResult<Json<Vec<LoginEntry>>> {
    caller.require_scope("logins:read")?;
    allow(
        caller.is_self(&id) || caller.is_admin(),
        "only the user or an administrator can read login history",
    )?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LOGIN_LIMIT)
        .clamp(1, MAX_LOGIN_LIMIT);
    let logins = state.store.list_logins(&id, limit).await?;
    Ok(Json(logins.into_iter().map(LoginEntry::from).collect()))
}
