//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use warden_core::auth::AuthError;
use warden_core::bridge::BridgeError;
use warden_core::directory::DirectoryError;
use warden_core::store::StoreError;
use warden_core::users::UserError;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// An OAuth protocol error; `code` is the standard error code.
    #[error("{code}: {message}")]
    OAuth {
        status: StatusCode,
        code: &'static str,
        message: String,
    },

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    fn oauth(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        AppError::OAuth {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.as_str()),
            AppError::Conflict(m) => (StatusCode::CONFLICT, "conflict", m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m.as_str()),
            AppError::OAuth {
                status,
                code,
                message,
            } => (*status, *code, message.as_str()),
            AppError::Internal(detail) => {
                error!(%detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(msg) => AppError::NotFound(msg),
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::Db(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::CredentialError => AppError::Unauthorized("Invalid credentials".into()),
            AuthError::InvalidClient => AppError::oauth(
                StatusCode::UNAUTHORIZED,
                "invalid_client",
                "Client authentication failed",
            ),
            AuthError::InvalidGrant(msg) => {
                AppError::oauth(StatusCode::BAD_REQUEST, "invalid_grant", msg)
            }
            AuthError::InvalidRequest(msg) => {
                AppError::oauth(StatusCode::BAD_REQUEST, "invalid_request", msg)
            }
            AuthError::InvalidScope(msg) => {
                AppError::oauth(StatusCode::BAD_REQUEST, "invalid_scope", msg)
            }
            AuthError::UnsupportedGrantType(msg) => {
                AppError::oauth(StatusCode::BAD_REQUEST, "unsupported_grant_type", msg)
            }
            AuthError::UnsupportedResponseType(msg) => {
                AppError::oauth(StatusCode::BAD_REQUEST, "unsupported_response_type", msg)
            }
            AuthError::TokenError(msg) => AppError::Unauthorized(msg),
            AuthError::ValidationError(msg) => AppError::Validation(msg),
            AuthError::NotFound(msg) => AppError::NotFound(msg),
            AuthError::Store(e) => AppError::from(e),
            AuthError::KeyError(msg) | AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<UserError> for AppError {
    fn from(e: UserError) -> Self {
        match e {
            UserError::NotFound(id) => AppError::NotFound(format!("no user found with id: {id}")),
            UserError::Validation(msg) => AppError::Validation(msg),
            UserError::EmailTaken(msg) => AppError::Conflict(msg),
            UserError::NoStanding(msg) => AppError::Forbidden(msg),
            UserError::Store(e) => AppError::from(e),
        }
    }
}

impl From<DirectoryError> for AppError {
    fn from(e: DirectoryError) -> Self {
        match e {
            DirectoryError::Store(e) => AppError::from(e),
            DirectoryError::InvalidEntry(msg) => AppError::Validation(msg),
            DirectoryError::NotEntitled(msg) => AppError::Forbidden(msg),
            DirectoryError::AlreadyLinked(msg) => AppError::Conflict(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<BridgeError> for AppError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Store(e) => AppError::from(e),
            BridgeError::User(e) => AppError::from(e),
            BridgeError::NotAMember(id) => {
                AppError::NotFound(format!("not a member of the chat guild: {id}"))
            }
            BridgeError::Client(e) => AppError::Internal(e.to_string()),
        }
    }
}
