//! # warden_api
//!
//! HTTP API library for Warden: the OAuth/OIDC endpoints, the first-party
//! session, the client application registry, user administration, account
//! linking for the external directories and the chat bot's internal hooks.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};

use warden_core::auth::TokenService;
use warden_core::bridge::RoleBridge;
use warden_core::directory::github::GitHubAdapter;
use warden_core::directory::wiki::WikiAdapter;
use warden_core::roles::RoleStore;
use warden_core::store::IdentityStore;

use crate::config::ApiConfig;
use crate::handlers::{applications, auth, integrations, internal, oauth, users};

/// The configured external directories. Routes for an absent one answer 404.
#[derive(Clone, Default)]
pub struct Integrations {
    pub github: Option<Arc<GitHubAdapter>>,
    pub wiki: Option<Arc<WikiAdapter>>,
    pub bridge: Option<Arc<RoleBridge>>,
}

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<TokenService>,
    pub store: Arc<dyn IdentityStore>,
    pub roles: RoleStore,
    pub config: ApiConfig,
    pub integrations: Integrations,
}

impl AppState {
    pub fn new(tokens: Arc<TokenService>, store: Arc<dyn IdentityStore>, config: ApiConfig) -> Self {
        Self {
            roles: RoleStore::new(store.clone()),
            tokens,
            store,
            config,
            integrations: Integrations::default(),
        }
    }

    pub fn with_integrations(mut self, integrations: Integrations) -> Self {
        self.integrations = integrations;
        self
    }
}

/// Run embedded database migrations.
///
/// Delegates to `warden_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    warden_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route("/.well-known/jwks.json", get(oauth::jwks_handler))
        .route(
            "/.well-known/openid-configuration",
            get(oauth::discovery_handler),
        )
        .route("/oauth/scopes", get(oauth::scopes_handler))
        .route("/oauth/token", post(oauth::token_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/logout", post(auth::logout_handler));

    // Protected routes (require auth)
    let protected = Router::new()
        .route(
            "/oauth/authorize",
            get(oauth::authorize_preview_handler).post(oauth::authorize_grant_handler),
        )
        .route("/oauth/userinfo", get(oauth::userinfo_handler))
        .route(
            "/auth/password/{user_id}",
            delete(auth::reset_password_handler),
        )
        .route(
            "/applications",
            get(applications::list_applications_handler)
                .post(applications::save_application_handler),
        )
        .route(
            "/applications/{id}",
            get(applications::get_application_handler)
                .delete(applications::delete_application_handler),
        )
        .route(
            "/users/{id}",
            get(users::get_user_handler)
                .patch(users::update_user_handler)
                .delete(users::delete_user_handler),
        )
        .route(
            "/users/{id}/applications",
            get(applications::list_user_applications_handler),
        )
        .route("/users/{id}/logins", get(users::list_logins_handler))
        .route("/users/{id}/github", post(integrations::link_github_handler))
        .route("/users/{id}/wiki", post(integrations::create_wiki_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    // Chat bot hooks (shared secret)
    let internal = Router::new()
        .route(
            "/internal/chat/members/{user_id}/sync",
            post(internal::sync_member_handler),
        )
        .route("/internal/chat/verify", post(internal::verify_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::internal::require_internal,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .merge(internal)
        .layer(cors)
        .with_state(state)
}
