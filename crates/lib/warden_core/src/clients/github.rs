//! Source-hosting organization client (GitHub REST).

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};

use super::{ClientError, check, json};
use crate::directory::github::{OrgMember, OrgMemberships, OrgRole};

pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

const PER_PAGE: usize = 100;
const USER_AGENT: &str = concat!("warden/", env!("CARGO_PKG_VERSION"));

#[derive(Deserialize)]
struct ApiMember {
    login: String,
}

#[derive(Serialize)]
struct MembershipBody {
    role: &'static str,
}

pub struct GitHubClient {
    http: Client,
    base_url: String,
    token: String,
    org: String,
}

impl GitHubClient {
    pub fn new(token: impl Into<String>, org: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, token, org)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        token: impl Into<String>,
        org: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            org: org.into(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
    }

    async fn list_with_role(&self, role: OrgRole) -> Result<Vec<OrgMember>, ClientError> {
        let mut out = Vec::new();
        for page in 1.. {
            let batch: Vec<ApiMember> = json(
                self.request(
                    Method::GET,
                    &format!(
                        "/orgs/{}/members?role={}&per_page={PER_PAGE}&page={page}",
                        self.org,
                        role.as_str()
                    ),
                )
                .send()
                .await?,
            )
            .await?;
            let count = batch.len();
            out.extend(batch.into_iter().map(|m| OrgMember { login: m.login, role }));
            if count < PER_PAGE {
                break;
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl OrgMemberships for GitHubClient {
    async fn list_members(&self) -> Result<Vec<OrgMember>, ClientError> {
        let mut members = self.list_with_role(OrgRole::Admin).await?;
        members.extend(self.list_with_role(OrgRole::Member).await?);
        Ok(members)
    }

    async fn set_membership(&self, login: &str, role: OrgRole) -> Result<(), ClientError> {
        check(
            self.request(
                Method::PUT,
                &format!("/orgs/{}/memberships/{login}", self.org),
            )
            .json(&MembershipBody {
                role: role.as_str(),
            })
            .send()
            .await?,
        )
        .await?;
        Ok(())
    }

    /// Removing someone who is already gone is not an error.
    async fn remove_membership(&self, login: &str) -> Result<(), ClientError> {
        let resp = self
            .request(
                Method::DELETE,
                &format!("/orgs/{}/memberships/{login}", self.org),
            )
            .send()
            .await?;
        match check(resp).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other.map(|_| ()),
        }
    }
}
