//! HTTP clients for the external directories.
//!
//! Each client implements the collaborator trait its adapter consumes, so
//! the reconciler and bridge never see wire details.

pub mod discord;
pub mod drive;
pub mod github;
pub mod wiki;

use reqwest::Response;
use thiserror::Error;

pub use discord::DiscordClient;
pub use drive::DriveClient;
pub use github::GitHubClient;
pub use wiki::WikiClient;

/// Errors from an external directory's API.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Status { status: 404, .. })
    }
}

/// Turn a non-success response into [`ClientError::Status`].
pub(crate) async fn check(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp
        .text()
        .await
        .unwrap_or_else(|_| "<no body>".to_string());
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Decode a JSON body, reporting the target type on failure.
pub(crate) async fn json<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let resp = check(resp).await?;
    resp.json::<T>()
        .await
        .map_err(|e| ClientError::Decode(format!("{}: {e}", std::any::type_name::<T>())))
}
