//! Client application registry handlers.

use axum::extract::{Path, State};
use axum::{Extension, Json};

use warden_core::auth::clients::{self, ClientInput};
use warden_core::models::ClientApplication;
use warden_core::store::ClientRepository;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{Caller, allow};
use crate::models::{ApplicationRequest, ApplicationResponse, StatusResponse};

const READ_SCOPE: &str = "applications:read";

async fn load(state: &AppState, id: &str) -> AppResult<ClientApplication> {
    state
        .store
        .get_client(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no client application found with id: {id}")))
}

fn owner_or_admin(caller: &Caller, owner_id: &str) -> AppResult<()> {
    allow(
        caller.has_blanket() && (caller.is_self(owner_id) || caller.is_admin()),
        "only the owner or an administrator can access this application",
    )
}

/// `GET /applications`: every client. Blanket session, or an admin holding
/// `applications:read`.
pub async fn list_applications_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> AppResult<Json<Vec<ApplicationResponse>>> {
    allow(
        caller.has_blanket() || (caller.is_admin() && caller.has_scope(READ_SCOPE)),
        "listing applications requires administrator access",
    )?;
    let clients = state.store.list_clients().await?;
    Ok(Json(
        clients
            .into_iter()
            .map(ApplicationResponse::without_secret)
            .collect(),
    ))
}

/// `POST /applications`: create, or update when `id` names an existing
/// client the caller may manage.
pub async fn save_application_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<ApplicationRequest>,
) -> AppResult<Json<ApplicationResponse>> {
    allow(caller.has_blanket(), "a first-party session is required")?;
    if let Some(id) = &body.id
        && let Some(existing) = state.store.get_client(id).await?
    {
        owner_or_admin(&caller, &existing.user_id)?;
    }
    let client = clients::save_client(
        state.store.as_ref(),
        caller.user_id(),
        ClientInput {
            id: body.id,
            name: body.name,
            redirect_uris: body.redirect_uris,
        },
    )
    .await?;
    Ok(Json(ApplicationResponse::with_secret(client)))
}

/// `GET /applications/{id}`
pub async fn get_application_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> AppResult<Json<ApplicationResponse>> {
    let client = load(&state, &id).await?;
    owner_or_admin(&caller, &client.user_id)?;
    Ok(Json(ApplicationResponse::with_secret(client)))
}

/// `DELETE /applications/{id}`
pub async fn delete_application_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> AppResult<Json<StatusResponse>> {
    let client = load(&state, &id).await?;
    owner_or_admin(&caller, &client.user_id)?;
    clients::delete_client(state.store.as_ref(), &client.id).await?;
    Ok(Json(StatusResponse { success: true }))
}

/// `GET /users/{id}/applications`
pub async fn list_user_applications_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<ApplicationResponse>>> {
    owner_or_admin(&caller, &user_id)?;
    let clients = state.store.list_clients_for_user(&user_id).await?;
    Ok(Json(
        clients
            .into_iter()
            .map(ApplicationResponse::with_secret)
            .collect(),
    ))
}
