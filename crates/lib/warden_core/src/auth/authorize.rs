//! Authorization-code flow: consent preview, grant and code exchange.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::clients::{authenticate_client, redirect_uri_registered};
use super::codes::{issue_code, redeem_code};
use super::consent::can_skip_consent;
use super::scopes;
use super::tokens::{TokenService, TokenSet};
use super::AuthError;
use crate::models::{ClientApplication, LoginType, UserLogin};
use crate::store::{ClientRepository, LoginRepository};
use crate::uuid::uuidv7;

/// Parameters of an authorization request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub response_type: Option<String>,
}

/// Whether the user must be shown the consent screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentPrompt {
    None,
    Consent,
}

/// What the consent screen shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizePreview {
    pub client_id: String,
    pub client_name: String,
    pub redirect_uri: String,
    pub scope: String,
    pub prompt: ConsentPrompt,
}

/// A granted authorization: the code and where to send it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationGrant {
    pub code: String,
    pub redirect_uri: String,
    pub scope: String,
}

impl TokenService {
    async fn check_request(&self, req: &AuthorizeRequest) -> Result<ClientApplication, AuthError> {
        if let Some(response_type) = req.response_type.as_deref()
            && response_type != "code"
        {
            return Err(AuthError::UnsupportedResponseType(response_type.to_string()));
        }
        let client = self
            .store()
            .get_client(&req.client_id)
            .await?
            .ok_or_else(|| AuthError::InvalidRequest("unknown client_id".into()))?;
        if !redirect_uri_registered(&client, &req.redirect_uri) {
            return Err(AuthError::InvalidRequest(
                "redirect_uri is not registered for this client".into(),
            ));
        }
        scopes::validate_grantable(&req.scope)?;
        Ok(client)
    }

    /// Validate a request and tell the caller whether consent can be skipped.
    pub async fn preview_authorization(
        &self,
        user_id: &str,
        req: &AuthorizeRequest,
    ) -> Result<AuthorizePreview, AuthError> {
        let client = self.check_request(req).await?;
        let skip = can_skip_consent(
            self.store(),
            user_id,
            &client.id,
            &req.scope,
            req.prompt.as_deref(),
            Utc::now(),
        )
        .await;
        Ok(AuthorizePreview {
            client_id: client.id,
            client_name: client.name,
            redirect_uri: req.redirect_uri.clone(),
            scope: req.scope.clone(),
            prompt: if skip {
                ConsentPrompt::None
            } else {
                ConsentPrompt::Consent
            },
        })
    }

    /// The user approved: record the grant in their login history and issue a
    /// single-use code.
    pub async fn grant_authorization(
        &self,
        user_id: &str,
        req: &AuthorizeRequest,
        ip_address: &str,
    ) -> Result<AuthorizationGrant, AuthError> {
        let client = self.check_request(req).await?;

        self.store()
            .record_login(&UserLogin {
                id: uuidv7(),
                user_id: user_id.to_string(),
                destination: client.id.clone(),
                scope: req.scope.clone(),
                ip_address: ip_address.to_string(),
                login_type: LoginType::OAuth,
                created_at: Utc::now(),
            })
            .await?;

        let code = issue_code(self.store(), &client.id, user_id, &req.scope, &req.redirect_uri).await?;
        info!(user_id, client_id = %client.id, scope = %req.scope, "authorization granted");

        Ok(AuthorizationGrant {
            code,
            redirect_uri: req.redirect_uri.clone(),
            scope: req.scope.clone(),
        })
    }

    /// `grant_type=authorization_code`.
    pub async fn exchange_code(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenSet, AuthError> {
        let client = authenticate_client(self.store(), client_id, client_secret).await?;
        let record = redeem_code(self.store(), code, &client.id, redirect_uri, Utc::now()).await?;
        self.issue_tokens(&record.user_id, &client.id, &record.scope)
            .await
    }
}
