//! Shared harness: the router over an in-memory store, driven with `oneshot`.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use tower::ServiceExt;

use warden_api::config::ApiConfig;
use warden_api::{AppState, Integrations, router};
use warden_core::auth::{SigningKeys, TokenService};
use warden_core::models::User;
use warden_core::store::{MemoryStore, RoleRepository, UserRepository};

pub const ISSUER: &str = "https://warden.test";
pub const CB: &str = "https://acme.example/cb";
pub const CB_ENCODED: &str = "https%3A%2F%2Facme.example%2Fcb";
pub const PASSWORD: &str = "Sup3rSecret";
pub const INTERNAL_TOKEN: &str = "bot-secret";

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_integrations(Arc::new(MemoryStore::new()), Integrations::default()).await
    }

    /// Build the app over `store` with the given integrations, which should
    /// share that store.
    pub async fn with_integrations(store: Arc<MemoryStore>, integrations: Integrations) -> Self {
        let keys = SigningKeys::from_pem(include_str!("../fixtures/signing_key.pem")).unwrap();
        let tokens = Arc::new(TokenService::new(Arc::new(keys), ISSUER, store.clone()));
        let config = ApiConfig {
            bind_addr: "127.0.0.1:0".into(),
            issuer: ISSUER.into(),
            secure_cookies: false,
            internal_token: Some(INTERNAL_TOKEN.into()),
        };
        let state = AppState::new(tokens, store.clone(), config).with_integrations(integrations);
        Self {
            store,
            router: router(state),
        }
    }

    pub async fn seed_user(&self, id: &str, roles: &[&str]) {
        self.store
            .upsert_user(&User::new(id, id, format!("{id}@org.example")))
            .await
            .unwrap();
        for r in roles {
            self.store.add_role_tag(id, r).await.unwrap();
        }
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value, Vec<String>) {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let cookies = resp
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json, cookies)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let (status, json, _) = self.send(req).await;
        (status, json)
    }

    pub async fn post_json(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let (status, json, _) = self
            .send(req.body(Body::from(body.to_string())).unwrap())
            .await;
        (status, json)
    }

    pub async fn post_form(&self, body: String, basic: Option<(&str, &str)>) -> (StatusCode, Value) {
        let mut req = Request::builder()
            .method("POST")
            .uri("/oauth/token")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some((id, secret)) = basic {
            req = req.header(
                header::AUTHORIZATION,
                format!("Basic {}", STANDARD.encode(format!("{id}:{secret}"))),
            );
        }
        let (status, json, _) = self.send(req.body(Body::from(body)).unwrap()).await;
        (status, json)
    }

    /// Register a password and log in; returns the first-party access token.
    pub async fn session(&self, id: &str) -> String {
        let email = format!("{id}@org.example");
        let (status, _) = self
            .post_json(
                "/auth/register",
                None,
                json!({"email": email, "password": PASSWORD}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, json) = self
            .post_json(
                "/auth/login",
                None,
                json!({"email": email, "password": PASSWORD}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{json}");
        json["access_token"].as_str().unwrap().to_string()
    }

    /// Register the `acme` client as `owner`; returns its secret.
    pub async fn register_client(&self, session: &str) -> String {
        let (status, json) = self
            .post_json(
                "/applications",
                Some(session),
                json!({"id": "acme", "name": "Acme", "redirectUris": [CB]}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{json}");
        json["secret"].as_str().unwrap().to_string()
    }
}

pub fn decode_payload(token: &str) -> Value {
    let payload = token.split('.').nth(1).unwrap();
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

