//! User lifecycle: verification, profile edits, deletion.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::models::User;
use crate::roles::RoleSet;
use crate::store::{IdentityStore, StoreError, UserRepository};

#[derive(Debug, Error)]
pub enum UserError {
    #[error("User not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Email already in use: {0}")]
    EmailTaken(String),

    #[error("User has no standing in the organization: {0}")]
    NoStanding(String),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for UserError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => UserError::EmailTaken(msg),
            other => UserError::Store(other),
        }
    }
}

/// Identity details supplied by the chat verification flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub avatar_url: String,
}

/// Partial profile update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub graduation_year: Option<i32>,
    pub major: Option<String>,
    pub shirt_size: Option<String>,
    pub jacket_size: Option<String>,
}

fn validate_email(email: &str) -> Result<(), UserError> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if valid {
        Ok(())
    } else {
        Err(UserError::Validation(format!("invalid email: {email}")))
    }
}

/// Create or replace a user from the verification flow.
///
/// `platform_roles` is the role set derived from the caller's chat-platform
/// groups; verification requires standing (current member or alumni).
/// Re-verifying replaces the identity fields and keeps the profile.
pub async fn verify_user(
    store: &dyn IdentityStore,
    input: Verification,
    platform_roles: &RoleSet,
) -> Result<User, UserError> {
    if input.id.trim().is_empty() {
        return Err(UserError::Validation("user id cannot be empty".into()));
    }
    validate_email(&input.email)?;
    if !platform_roles.has_standing() {
        return Err(UserError::NoStanding(input.id));
    }

    let now = Utc::now();
    let user = match store.get_user(&input.id).await? {
        Some(existing) => User {
            username: input.username,
            first_name: input.first_name,
            last_name: input.last_name,
            email: input.email,
            avatar_url: input.avatar_url,
            verified: true,
            updated_at: now,
            ..existing
        },
        None => {
            info!(user_id = %input.id, "new user verified");
            User {
                first_name: input.first_name,
                last_name: input.last_name,
                avatar_url: input.avatar_url,
                verified: true,
                ..User::new(input.id, input.username, input.email)
            }
        }
    };
    store.upsert_user(&user).await?;
    Ok(user)
}

pub async fn update_profile(
    store: &dyn IdentityStore,
    user_id: &str,
    update: ProfileUpdate,
) -> Result<User, UserError> {
    let mut user = store
        .get_user(user_id)
        .await?
        .ok_or_else(|| UserError::NotFound(user_id.to_string()))?;

    if let Some(email) = update.email {
        validate_email(&email)?;
        user.email = email;
    }
    if let Some(v) = update.first_name {
        user.first_name = v;
    }
    if let Some(v) = update.last_name {
        user.last_name = v;
    }
    if let Some(v) = update.avatar_url {
        user.avatar_url = v;
    }
    if let Some(year) = update.graduation_year {
        if !(1900..=2200).contains(&year) {
            return Err(UserError::Validation(format!(
                "invalid graduation year: {year}"
            )));
        }
        user.graduation_year = Some(year);
    }
    if update.major.is_some() {
        user.major = update.major;
    }
    if update.shirt_size.is_some() {
        user.shirt_size = update.shirt_size;
    }
    if update.jacket_size.is_some() {
        user.jacket_size = update.jacket_size;
    }
    user.updated_at = Utc::now();

    store.upsert_user(&user).await?;
    info!(user_id, "profile updated");
    Ok(user)
}

/// Delete a user. Roles, subteams, credentials, sessions and login history
/// go with it.
pub async fn delete_user(store: &dyn IdentityStore, user_id: &str) -> Result<(), UserError> {
    if !store.delete_user(user_id).await? {
        return Err(UserError::NotFound(user_id.to_string()));
    }
    info!(user_id, "user deleted");
    Ok(())
}

pub fn is_profile_complete(user: &User) -> bool {
    fn filled(v: &Option<String>) -> bool {
        v.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
    !user.first_name.trim().is_empty()
        && !user.last_name.trim().is_empty()
        && !user.email.trim().is_empty()
        && user.graduation_year.is_some()
        && filled(&user.major)
        && filled(&user.shirt_size)
        && filled(&user.jacket_size)
}

pub async fn incomplete_profiles(store: &dyn IdentityStore) -> Result<Vec<User>, UserError> {
    Ok(store
        .list_users()
        .await?
        .into_iter()
        .filter(|u| !is_profile_complete(u))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::HierarchyTag;
    use crate::store::{MemoryStore, RoleRepository};

    fn verification(id: &str, email: &str) -> Verification {
        Verification {
            id: id.into(),
            username: "gaucho".into(),
            first_name: "Gaucho".into(),
            last_name: "Racer".into(),
            email: email.into(),
            avatar_url: String::new(),
        }
    }

    fn member() -> RoleSet {
        [HierarchyTag::CurrentMember].into_iter().collect()
    }

    #[tokio::test]
    async fn verify_creates_then_replaces() {
        let store = MemoryStore::new();
        let user = verify_user(&store, verification("u1", "g@org.example"), &member())
            .await
            .unwrap();
        assert!(user.verified);

        update_profile(
            &store,
            "u1",
            ProfileUpdate {
                major: Some("Mechanical Engineering".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let again = verify_user(&store, verification("u1", "new@org.example"), &member())
            .await
            .unwrap();
        assert_eq!(again.email, "new@org.example");
        assert_eq!(again.major.as_deref(), Some("Mechanical Engineering"));
        assert_eq!(again.created_at, user.created_at);
    }

    #[tokio::test]
    async fn verify_requires_standing() {
        let store = MemoryStore::new();
        let alumni: RoleSet = [HierarchyTag::Alumni].into_iter().collect();
        assert!(
            verify_user(&store, verification("u1", "a@org.example"), &alumni)
                .await
                .is_ok()
        );
        assert!(matches!(
            verify_user(&store, verification("u2", "b@org.example"), &RoleSet::new()).await,
            Err(UserError::NoStanding(_))
        ));
    }

    #[tokio::test]
    async fn verify_rejects_bad_input_and_duplicate_email() {
        let store = MemoryStore::new();
        assert!(matches!(
            verify_user(&store, verification("", "g@org.example"), &member()).await,
            Err(UserError::Validation(_))
        ));
        assert!(matches!(
            verify_user(&store, verification("u1", "not-an-email"), &member()).await,
            Err(UserError::Validation(_))
        ));
        verify_user(&store, verification("u1", "g@org.example"), &member())
            .await
            .unwrap();
        assert!(matches!(
            verify_user(&store, verification("u2", "g@org.example"), &member()).await,
            Err(UserError::EmailTaken(_))
        ));
    }

    #[tokio::test]
    async fn profile_completeness() {
        let store = MemoryStore::new();
        verify_user(&store, verification("u1", "g@org.example"), &member())
            .await
            .unwrap();
        assert_eq!(incomplete_profiles(&store).await.unwrap().len(), 1);

        let user = update_profile(
            &store,
            "u1",
            ProfileUpdate {
                graduation_year: Some(2027),
                major: Some("Computer Science".into()),
                shirt_size: Some("M".into()),
                jacket_size: Some("L".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(is_profile_complete(&user));
        assert!(incomplete_profiles(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_cascades_and_reports_missing() {
        let store = MemoryStore::new();
        verify_user(&store, verification("u1", "g@org.example"), &member())
            .await
            .unwrap();
        store.add_role_tag("u1", "lead").await.unwrap();

        delete_user(&store, "u1").await.unwrap();
        assert!(store.list_role_tags("u1").await.unwrap().is_empty());
        assert!(matches!(
            delete_user(&store, "u1").await,
            Err(UserError::NotFound(_))
        ));
    }
}
