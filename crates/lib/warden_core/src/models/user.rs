//! User and subteam records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A member of the organization.
///
/// `id` is the stable chat-platform identifier assigned at verification time;
/// `email` is the join key used against external directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub avatar_url: String,
    pub verified: bool,
    pub graduation_year: Option<i32>,
    pub major: Option<String>,
    pub shirt_size: Option<String>,
    pub jacket_size: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A fresh, unverified user with empty profile fields.
    pub fn new(id: impl Into<String>, username: impl Into<String>, email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            username: username.into(),
            first_name: String::new(),
            last_name: String::new(),
            email: email.into(),
            avatar_url: String::new(),
            verified: false,
            graduation_year: None,
            major: None,
            shirt_size: None,
            jacket_size: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// "First Last", falling back to the username when no name is on file.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

/// A working group sourced from a chat-platform group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subteam {
    pub id: String,
    pub name: String,
}
