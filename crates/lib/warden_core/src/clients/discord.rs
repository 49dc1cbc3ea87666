//! Chat platform client (Discord REST v10).

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ClientError, check, json};
use crate::bridge::{ChatGroup, ChatMember, ChatPlatform};

pub const DEFAULT_BASE_URL: &str = "https://discord.com/api/v10";

/// Guild members are listed in pages of this size.
const PAGE_SIZE: usize = 1000;

#[derive(Deserialize)]
struct ApiUser {
    id: String,
    username: String,
    #[serde(default)]
    bot: bool,
}

#[derive(Deserialize)]
struct ApiMember {
    user: ApiUser,
    #[serde(default)]
    nick: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
}

impl From<ApiMember> for ChatMember {
    fn from(m: ApiMember) -> Self {
        ChatMember {
            user_id: m.user.id,
            username: m.user.username,
            nick: m.nick,
            bot: m.user.bot,
            group_ids: m.roles,
        }
    }
}

#[derive(Deserialize)]
struct ApiRole {
    id: String,
    name: String,
}

#[derive(Serialize)]
struct NewMessage<'a> {
    content: &'a str,
}

#[derive(Deserialize)]
struct ApiMessage {
    id: String,
}

pub struct DiscordClient {
    http: Client,
    base_url: String,
    token: String,
    guild_id: String,
}

impl DiscordClient {
    pub fn new(token: impl Into<String>, guild_id: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, token, guild_id)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        token: impl Into<String>,
        guild_id: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            guild_id: guild_id.into(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bot {}", self.token))
    }
}

#[async_trait]
impl ChatPlatform for DiscordClient {
    async fn list_members(&self) -> Result<Vec<ChatMember>, ClientError> {
        let mut out = Vec::new();
        let mut after = "0".to_string();
        loop {
            let page: Vec<ApiMember> = json(
                self.request(
                    Method::GET,
                    &format!(
                        "/guilds/{}/members?limit={PAGE_SIZE}&after={after}",
                        self.guild_id
                    ),
                )
                .send()
                .await?,
            )
            .await?;
            let count = page.len();
            if let Some(last) = page.last() {
                after = last.user.id.clone();
            }
            out.extend(page.into_iter().map(ChatMember::from));
            if count < PAGE_SIZE {
                break;
            }
        }
        debug!(members = out.len(), "guild members listed");
        Ok(out)
    }

    async fn get_member(&self, user_id: &str) -> Result<Option<ChatMember>, ClientError> {
        let resp = self
            .request(
                Method::GET,
                &format!("/guilds/{}/members/{user_id}", self.guild_id),
            )
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let member: ApiMember = json(resp).await?;
        Ok(Some(member.into()))
    }

    async fn list_groups(&self) -> Result<Vec<ChatGroup>, ClientError> {
        let roles: Vec<ApiRole> = json(
            self.request(Method::GET, &format!("/guilds/{}/roles", self.guild_id))
                .send()
                .await?,
        )
        .await?;
        Ok(roles
            .into_iter()
            .map(|r| ChatGroup {
                id: r.id,
                name: r.name,
            })
            .collect())
    }

    async fn add_group(&self, user_id: &str, group_id: &str) -> Result<(), ClientError> {
        check(
            self.request(
                Method::PUT,
                &format!(
                    "/guilds/{}/members/{user_id}/roles/{group_id}",
                    self.guild_id
                ),
            )
            .send()
            .await?,
        )
        .await?;
        Ok(())
    }

    async fn remove_group(&self, user_id: &str, group_id: &str) -> Result<(), ClientError> {
        check(
            self.request(
                Method::DELETE,
                &format!(
                    "/guilds/{}/members/{user_id}/roles/{group_id}",
                    self.guild_id
                ),
            )
            .send()
            .await?,
        )
        .await?;
        Ok(())
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> Result<String, ClientError> {
        let message: ApiMessage = json(
            self.request(Method::POST, &format!("/channels/{channel_id}/messages"))
                .json(&NewMessage { content })
                .send()
                .await?,
        )
        .await?;
        Ok(message.id)
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), ClientError> {
        check(
            self.request(
                Method::DELETE,
                &format!("/channels/{channel_id}/messages/{message_id}"),
            )
            .send()
            .await?,
        )
        .await?;
        Ok(())
    }
}
