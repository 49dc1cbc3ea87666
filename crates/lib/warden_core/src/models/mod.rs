//! Domain models shared by the store, the token service and the HTTP layer.

pub mod claims;
pub mod oauth;
pub mod user;

pub use claims::TokenClaims;
pub use oauth::{
    AuthorizationCode, ClientApplication, LoginType, PasswordCredential, RefreshTokenRecord,
    UserLogin,
};
pub use user::{Subteam, User};
