//! Request middleware.

pub mod auth;
pub mod internal;
