//! Wiki administration client (BookStack REST).

use std::collections::BTreeSet;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};

use super::{ClientError, check, json};
use crate::directory::wiki::{WikiRole, WikiUser, WikiUsers};

/// Per-user detail lookups in flight at once.
const DETAIL_CONCURRENCY: usize = 4;

#[derive(Deserialize)]
struct ListResponse<T> {
    data: Vec<T>,
}

#[derive(Deserialize)]
struct ApiUserSummary {
    id: i64,
}

#[derive(Deserialize)]
struct ApiRole {
    id: i64,
}

#[derive(Deserialize)]
struct ApiUser {
    id: i64,
    name: String,
    email: String,
    #[serde(default)]
    roles: Vec<ApiRole>,
}

impl From<ApiUser> for WikiUser {
    fn from(user: ApiUser) -> Self {
        WikiUser {
            id: user.id,
            name: user.name,
            email: user.email,
            roles: user.roles.iter().map(|r| WikiRole::from_id(r.id)).collect(),
        }
    }
}

#[derive(Serialize)]
struct RolesBody {
    roles: Vec<i64>,
}

#[derive(Serialize)]
struct CreateBody<'a> {
    name: &'a str,
    email: &'a str,
    roles: Vec<i64>,
    send_invite: bool,
}

pub struct WikiClient {
    http: Client,
    base_url: String,
    token_id: String,
    token_secret: String,
}

impl WikiClient {
    pub fn new(
        base_url: impl Into<String>,
        token_id: impl Into<String>,
        token_secret: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token_id: token_id.into(),
            token_secret: token_secret.into(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/api{}", self.base_url, path))
            .header(
                "Authorization",
                format!("Token {}:{}", self.token_id, self.token_secret),
            )
    }

    async fn fetch_user(&self, id: i64) -> Result<WikiUser, ClientError> {
        let user: ApiUser = json(self.request(Method::GET, &format!("/users/{id}")).send().await?).await?;
        Ok(user.into())
    }
}

#[async_trait]
impl WikiUsers for WikiClient {
    /// The list endpoint omits roles, so each user is fetched individually.
    async fn list_users(&self) -> Result<Vec<WikiUser>, ClientError> {
        let list: ListResponse<ApiUserSummary> =
            json(self.request(Method::GET, "/users?count=500").send().await?).await?;
        stream::iter(list.data)
            .map(|summary| self.fetch_user(summary.id))
            .buffered(DETAIL_CONCURRENCY)
            .try_collect()
            .await
    }

    async fn get_user(&self, id: i64) -> Result<Option<WikiUser>, ClientError> {
        match self.fetch_user(id).await {
            Ok(user) => Ok(Some(user)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_user(
        &self,
        name: &str,
        email: &str,
        roles: &BTreeSet<WikiRole>,
    ) -> Result<WikiUser, ClientError> {
        let user: ApiUser = json(
            self.request(Method::POST, "/users")
                .json(&CreateBody {
                    name,
                    email,
                    roles: roles.iter().map(|r| r.id()).collect(),
                    send_invite: true,
                })
                .send()
                .await?,
        )
        .await?;
        Ok(user.into())
    }

    async fn update_roles(&self, id: i64, roles: &BTreeSet<WikiRole>) -> Result<(), ClientError> {
        check(
            self.request(Method::PUT, &format!("/users/{id}"))
                .json(&RolesBody {
                    roles: roles.iter().map(|r| r.id()).collect(),
                })
                .send()
                .await?,
        )
        .await?;
        Ok(())
    }

    async fn delete_user(&self, id: i64) -> Result<(), ClientError> {
        check(self.request(Method::DELETE, &format!("/users/{id}")).send().await?).await?;
        Ok(())
    }
}
