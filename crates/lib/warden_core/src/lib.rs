//! # warden_core
//!
//! Core domain logic for Warden: the role model, the token service, the
//! directory reconciler and the chat-platform role bridge.

pub mod auth;
pub mod bridge;
pub mod clients;
pub mod directory;
pub mod jobs;
pub mod migrate;
pub mod models;
pub mod roles;
pub mod store;
pub mod users;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
