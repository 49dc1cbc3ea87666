//! Shared-drive permission client (Google Drive v3).
//!
//! Takes a ready OAuth access token; obtaining and refreshing it is the
//! deployment's concern.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};

use super::{ClientError, check, json};
use crate::directory::drive::{DrivePermission, DrivePermissions, DriveRole};

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";

const LIST_FIELDS: &str = "nextPageToken,permissions(id,type,emailAddress,role)";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PermissionList {
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default)]
    permissions: Vec<ApiPermission>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPermission {
    id: String,
    #[serde(default)]
    email_address: String,
    role: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewPermission<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    email_address: &'a str,
    role: &'a str,
}

pub struct DriveClient {
    http: Client,
    base_url: String,
    token: String,
    drive_id: String,
}

impl DriveClient {
    pub fn new(token: impl Into<String>, drive_id: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, token, drive_id)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        token: impl Into<String>,
        drive_id: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            drive_id: drive_id.into(),
        }
    }

    fn request(&self, method: Method, suffix: &str) -> RequestBuilder {
        self.http
            .request(
                method,
                format!(
                    "{}/drive/v3/files/{}/permissions{suffix}",
                    self.base_url, self.drive_id
                ),
            )
            .header("Authorization", format!("Bearer {}", self.token))
            .query(&[("supportsAllDrives", "true")])
    }
}

#[async_trait]
impl DrivePermissions for DriveClient {
    async fn list_permissions(&self) -> Result<Vec<DrivePermission>, ClientError> {
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut req = self.request(Method::GET, "").query(&[("fields", LIST_FIELDS)]);
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token.as_str())]);
            }
            let page: PermissionList = json(req.send().await?).await?;
            out.extend(page.permissions.into_iter().map(|p| DrivePermission {
                id: p.id,
                email: p.email_address,
                role: DriveRole::parse(&p.role),
            }));
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }
        Ok(out)
    }

    async fn create_permission(&self, email: &str, role: &DriveRole) -> Result<(), ClientError> {
        check(
            self.request(Method::POST, "")
                .query(&[("sendNotificationEmail", "false")])
                .json(&NewPermission {
                    kind: "user",
                    email_address: email,
                    role: role.as_str(),
                })
                .send()
                .await?,
        )
        .await?;
        Ok(())
    }

    async fn delete_permission(&self, permission_id: &str) -> Result<(), ClientError> {
        check(
            self.request(Method::DELETE, &format!("/{permission_id}"))
                .send()
                .await?,
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn follows_page_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/d1/permissions"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "permissions": [{"id": "b", "emailAddress": "b@org.example", "role": "organizer"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/d1/permissions"))
            .and(query_param("supportsAllDrives", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "nextPageToken": "p2",
                "permissions": [{"id": "a", "emailAddress": "a@org.example", "role": "reader"}]
            })))
            .mount(&server)
            .await;

        let client = DriveClient::with_base_url(server.uri(), "t", "d1");
        let perms = client.list_permissions().await.unwrap();
        assert_eq!(perms.len(), 2);
        assert_eq!(perms[0].role, DriveRole::Other("reader".into()));
        assert_eq!(perms[1].role, DriveRole::Organizer);
    }

    #[tokio::test]
    async fn creates_and_deletes_permissions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/drive/v3/files/d1/permissions"))
            .and(query_param("sendNotificationEmail", "false"))
            .and(body_json(json!({"type": "user", "emailAddress": "a@org.example", "role": "writer"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "new"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/drive/v3/files/d1/permissions/old"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = DriveClient::with_base_url(server.uri(), "t", "d1");
        client
            .create_permission("a@org.example", &DriveRole::Writer)
            .await
            .unwrap();
        client.delete_permission("old").await.unwrap();
    }
}
