//! Fire-and-forget audit notifications.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::bridge::ChatPlatform;
use crate::clients::ClientError;

/// Sink for human-readable audit lines.
#[async_trait]
pub trait AuditNotifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), ClientError>;
}

/// Posts audit lines to a chat channel.
pub struct ChatNotifier {
    platform: Arc<dyn ChatPlatform>,
    channel_id: String,
}

impl ChatNotifier {
    pub fn new(platform: Arc<dyn ChatPlatform>, channel_id: impl Into<String>) -> Self {
        Self {
            platform,
            channel_id: channel_id.into(),
        }
    }
}

#[async_trait]
impl AuditNotifier for ChatNotifier {
    async fn notify(&self, message: &str) -> Result<(), ClientError> {
        self.platform
            .send_message(&self.channel_id, message)
            .await
            .map(|_| ())
    }
}

/// Handle used by every corrective action. Each message goes out on its
/// own task; a failed send is logged and never reaches the caller.
#[derive(Clone, Default)]
pub struct Notifications {
    sink: Option<Arc<dyn AuditNotifier>>,
}

impl Notifications {
    pub fn new(sink: Arc<dyn AuditNotifier>) -> Self {
        Self { sink: Some(sink) }
    }

    /// Drops every message.
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn send(&self, message: impl Into<String>) {
        let Some(sink) = self.sink.clone() else {
            return;
        };
        let message = message.into();
        tokio::spawn(async move {
            if let Err(e) = sink.notify(&message).await {
                warn!(error = %e, "audit notification failed");
            }
        });
    }
}
