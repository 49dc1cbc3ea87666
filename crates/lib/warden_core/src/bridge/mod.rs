//! Chat-platform role bridge.
//!
//! The chat platform's groups are the source of hierarchy and subteam
//! membership. The bridge reads a member's groups, derives the internal role
//! set and writes it to the role store. The only write back to the platform
//! is the alumni correction: an alumnus loses their subteam and active-member
//! groups.

mod derive;
mod groups;
mod sync;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clients::ClientError;
use crate::store::StoreError;
use crate::users::UserError;

pub use derive::{Derivation, derive};
pub use groups::{GroupKind, GroupTable};
pub use sync::{RoleBridge, SyncOutcome, SyncSummary};

#[cfg(test)]
pub(crate) use groups::testing as group_fixtures;

/// A member of the chat-platform guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMember {
    pub user_id: String,
    pub username: String,
    pub nick: Option<String>,
    pub bot: bool,
    pub group_ids: Vec<String>,
}

impl ChatMember {
    pub fn display_name(&self) -> &str {
        self.nick.as_deref().unwrap_or(&self.username)
    }
}

/// A chat-platform group (a "role" in the platform's own vocabulary).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatGroup {
    pub id: String,
    pub name: String,
}

/// The operations the bridge and the chat adapter need from the platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn list_members(&self) -> Result<Vec<ChatMember>, ClientError>;

    /// `None` when the user is not in the guild.
    async fn get_member(&self, user_id: &str) -> Result<Option<ChatMember>, ClientError>;

    async fn list_groups(&self) -> Result<Vec<ChatGroup>, ClientError>;

    async fn add_group(&self, user_id: &str, group_id: &str) -> Result<(), ClientError>;

    async fn remove_group(&self, user_id: &str, group_id: &str) -> Result<(), ClientError>;

    /// Returns the new message's id.
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<String, ClientError>;

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), ClientError>;
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Chat platform error: {0}")]
    Client(#[from] ClientError),

    #[error(transparent)]
    User(#[from] UserError),

    #[error("Not a guild member: {0}")]
    NotAMember(String),
}
