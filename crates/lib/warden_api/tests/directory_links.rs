//! Integration tests for account linking and the chat bot's internal hooks,
//! with the external directories replaced by in-memory fakes.

mod common;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};

use warden_api::Integrations;
use warden_core::bridge::{ChatGroup, ChatMember, ChatPlatform, RoleBridge};
use warden_core::clients::ClientError;
use warden_core::directory::Notifications;
use warden_core::directory::github::{GitHubAdapter, OrgMember, OrgMemberships, OrgRole};
use warden_core::directory::wiki::{WikiAdapter, WikiRole, WikiUser, WikiUsers};
use warden_core::store::{MemoryStore, RoleRepository, UserRepository};

use common::{INTERNAL_TOKEN, TestApp};

#[derive(Default)]
struct Org(Mutex<HashMap<String, OrgRole>>);

#[async_trait]
impl OrgMemberships for Org {
    async fn list_members(&self) -> Result<Vec<OrgMember>, ClientError> {
        Ok(self
            .0
            .lock()
            .unwrap()
            .iter()
            .map(|(login, role)| OrgMember {
                login: login.clone(),
                role: *role,
            })
            .collect())
    }

    async fn set_membership(&self, login: &str, role: OrgRole) -> Result<(), ClientError> {
        self.0.lock().unwrap().insert(login.to_string(), role);
        Ok(())
    }

    async fn remove_membership(&self, login: &str) -> Result<(), ClientError> {
        self.0.lock().unwrap().remove(login);
        Ok(())
    }
}

#[derive(Default)]
struct Wiki(Mutex<BTreeMap<i64, WikiUser>>);

#[async_trait]
impl WikiUsers for Wiki {
    async fn list_users(&self) -> Result<Vec<WikiUser>, ClientError> {
        Ok(self.0.lock().unwrap().values().cloned().collect())
    }

    async fn get_user(&self, id: i64) -> Result<Option<WikiUser>, ClientError> {
        Ok(self.0.lock().unwrap().get(&id).cloned())
    }

    async fn create_user(
        &self,
        name: &str,
        email: &str,
        roles: &BTreeSet<WikiRole>,
    ) -> Result<WikiUser, ClientError> {
        let mut users = self.0.lock().unwrap();
        let id = users.len() as i64 + 1;
        let user = WikiUser {
            id,
            name: name.to_string(),
            email: email.to_string(),
            roles: roles.clone(),
        };
        users.insert(id, user.clone());
        Ok(user)
    }

    async fn update_roles(&self, id: i64, roles: &BTreeSet<WikiRole>) -> Result<(), ClientError> {
        if let Some(u) = self.0.lock().unwrap().get_mut(&id) {
            u.roles = roles.clone();
        }
        Ok(())
    }

    async fn delete_user(&self, id: i64) -> Result<(), ClientError> {
        self.0.lock().unwrap().remove(&id);
        Ok(())
    }
}

/// A guild with a member group, an alumni group and one subteam.
struct Guild {
    members: Mutex<Vec<ChatMember>>,
}

impl Guild {
    fn new(members: &[(&str, &[&str])]) -> Self {
        Self {
            members: Mutex::new(
                members
                    .iter()
                    .map(|(id, groups)| ChatMember {
                        user_id: id.to_string(),
                        username: id.to_string(),
                        nick: None,
                        bot: false,
                        group_ids: groups.iter().map(|g| g.to_string()).collect(),
                    })
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl ChatPlatform for Guild {
    async fn list_members(&self) -> Result<Vec<ChatMember>, ClientError> {
        Ok(self.members.lock().unwrap().clone())
    }

    async fn get_member(&self, user_id: &str) -> Result<Option<ChatMember>, ClientError> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.user_id == user_id)
            .cloned())
    }

    async fn list_groups(&self) -> Result<Vec<ChatGroup>, ClientError> {
        Ok([("g-member", "Member"), ("g-alumni", "Alumni"), ("g-aero", "Aero")]
            .iter()
            .map(|(id, name)| ChatGroup {
                id: id.to_string(),
                name: name.to_string(),
            })
            .collect())
    }

    async fn add_group(&self, user_id: &str, group_id: &str) -> Result<(), ClientError> {
        if let Some(m) = self
            .members
            .lock()
            .unwrap()
            .iter_mut()
            .find(|m| m.user_id == user_id)
        {
            m.group_ids.push(group_id.to_string());
        }
        Ok(())
    }

    async fn remove_group(&self, user_id: &str, group_id: &str) -> Result<(), ClientError> {
        if let Some(m) = self
            .members
            .lock()
            .unwrap()
            .iter_mut()
            .find(|m| m.user_id == user_id)
        {
            m.group_ids.retain(|g| g != group_id);
        }
        Ok(())
    }

    async fn send_message(&self, _channel_id: &str, _content: &str) -> Result<String, ClientError> {
        Ok("m1".into())
    }

    async fn delete_message(&self, _channel_id: &str, _message_id: &str) -> Result<(), ClientError> {
        Ok(())
    }
}

async fn directory_app() -> (TestApp, Arc<Org>, Arc<Wiki>) {
    let store = Arc::new(MemoryStore::new());
    let org = Arc::new(Org::default());
    let wiki = Arc::new(Wiki::default());
    let integrations = Integrations {
        github: Some(Arc::new(GitHubAdapter::new(org.clone(), store.clone()))),
        wiki: Some(Arc::new(WikiAdapter::new(wiki.clone(), store.clone()))),
        bridge: None,
    };
    let app = TestApp::with_integrations(store, integrations).await;
    (app, org, wiki)
}

async fn chat_app(members: &[(&str, &[&str])]) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let bridge = RoleBridge::connect(
        Arc::new(Guild::new(members)),
        store.clone(),
        vec!["Aero".to_string()],
        Notifications::disabled(),
    )
    .await
    .unwrap();
    let integrations = Integrations {
        bridge: Some(Arc::new(bridge)),
        ..Default::default()
    };
    TestApp::with_integrations(store, integrations).await
}

async fn internal_post(app: &TestApp, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
    let mut req = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let (status, json, _) = app.send(req.body(Body::from(body.to_string())).unwrap()).await;
    (status, json)
}

#[tokio::test]
async fn linking_github_invites_and_records_the_login() {
    let (app, org, _) = directory_app().await;
    app.seed_user("u1", &["current_member"]).await;
    app.seed_user("u2", &["current_member"]).await;
    app.seed_user("nobody", &[]).await;
    let u1 = app.session("u1").await;
    let u2 = app.session("u2").await;
    let nobody = app.session("nobody").await;

    let (status, linked) = app
        .post_json("/users/u1/github", Some(&u1), json!({"username": "gaucho"}))
        .await;
    assert_eq!(status, StatusCode::OK, "{linked}");
    assert_eq!(linked["role"], "member");
    assert_eq!(org.0.lock().unwrap().get("gaucho"), Some(&OrgRole::Member));
    assert!(
        app.store
            .list_role_tags("u1")
            .await
            .unwrap()
            .contains(&"github:gaucho".to_string())
    );

    // someone else's record, a login already taken, no standing
    let (status, _) = app
        .post_json("/users/u1/github", Some(&u2), json!({"username": "other"}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .post_json("/users/u2/github", Some(&u2), json!({"username": "gaucho"}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = app
        .post_json("/users/nobody/github", Some(&nobody), json!({"username": "nobody-gh"}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(org.0.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn creating_a_wiki_account_links_it_once() {
    let (app, _, wiki) = directory_app().await;
    app.seed_user("u1", &["lead", "current_member"]).await;
    let u1 = app.session("u1").await;

    let (status, account) = app.post_json("/users/u1/wiki", Some(&u1), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{account}");
    let id = account["id"].as_i64().unwrap();
    assert_eq!(account["email"], "u1@org.example");
    assert_eq!(
        wiki.0.lock().unwrap().get(&id).map(|u| u.roles.clone()),
        Some([WikiRole::Editor, WikiRole::Lead].into())
    );
    assert!(
        app.store
            .list_role_tags("u1")
            .await
            .unwrap()
            .contains(&format!("wiki:{id}"))
    );

    let (status, _) = app.post_json("/users/u1/wiki", Some(&u1), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn link_routes_answer_not_found_without_the_integration() {
    let app = TestApp::new().await;
    app.seed_user("u1", &["current_member"]).await;
    let u1 = app.session("u1").await;

    let (status, _) = app
        .post_json("/users/u1/github", Some(&u1), json!({"username": "gaucho"}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.post_json("/users/u1/wiki", Some(&u1), json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn member_update_hook_syncs_roles() {
    let app = chat_app(&[("u1", &["g-member", "g-aero"])]).await;
    app.seed_user("u1", &[]).await;

    let (status, _) = internal_post(&app, "/internal/chat/members/u1/sync", None, json!({})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) =
        internal_post(&app, "/internal/chat/members/u1/sync", Some("wrong"), json!({})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, synced) = internal_post(
        &app,
        "/internal/chat/members/u1/sync",
        Some(INTERNAL_TOKEN),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{synced}");
    assert_eq!(synced["outcome"], "synced");
    assert_eq!(synced["rolesAdded"], json!(["current_member"]));
    assert_eq!(synced["subteamsAdded"], json!(["g-aero"]));
    assert!(
        app.store
            .list_role_tags("u1")
            .await
            .unwrap()
            .contains(&"current_member".to_string())
    );

    let (status, outside) = internal_post(
        &app,
        "/internal/chat/members/stranger/sync",
        Some(INTERNAL_TOKEN),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outside["outcome"], "not_in_guild");
}

#[tokio::test]
async fn verification_hook_creates_the_user() {
    let app = chat_app(&[("u7", &["g-member"]), ("u8", &["g-aero"])]).await;
    let body = |id: &str| {
        json!({
            "id": id,
            "username": "gaucho",
            "first_name": "Gaucho",
            "last_name": "Racer",
            "email": format!("{id}@org.example"),
        })
    };

    let (status, user) =
        internal_post(&app, "/internal/chat/verify", Some(INTERNAL_TOKEN), body("u7")).await;
    assert_eq!(status, StatusCode::OK, "{user}");
    assert_eq!(user["verified"], true);
    assert_eq!(user["roles"], json!(["current_member"]));
    assert!(app.store.get_user("u7").await.unwrap().is_some());

    // in the guild but without a standing group
    let (status, _) =
        internal_post(&app, "/internal/chat/verify", Some(INTERNAL_TOKEN), body("u8")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) =
        internal_post(&app, "/internal/chat/verify", Some(INTERNAL_TOKEN), body("u9")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
