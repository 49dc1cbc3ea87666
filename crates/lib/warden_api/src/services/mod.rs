//! Shared request-handling services.

pub mod cookies;
