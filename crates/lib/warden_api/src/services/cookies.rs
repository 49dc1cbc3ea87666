//! Session cookies: `warden_access`, `warden_refresh`.

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use warden_core::auth::tokens::{ACCESS_TOKEN_LIFETIME_SECS, REFRESH_TOKEN_LIFETIME_SECS};

/// Cookie name for the access token.
pub const ACCESS_COOKIE: &str = "warden_access";
/// Cookie name for the refresh token.
pub const REFRESH_COOKIE: &str = "warden_refresh";

fn build(name: &str, value: &str, max_age: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((name.to_string(), value.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/".to_string())
        .max_age(max_age)
        .build()
}

/// httpOnly cookie for the access token.
pub fn access_cookie(token: &str, secure: bool) -> Cookie<'static> {
    build(
        ACCESS_COOKIE,
        token,
        Duration::seconds(ACCESS_TOKEN_LIFETIME_SECS),
        secure,
    )
}

/// httpOnly cookie for the refresh token, living as long as the token.
pub fn refresh_cookie(token: &str, secure: bool) -> Cookie<'static> {
    build(
        REFRESH_COOKIE,
        token,
        Duration::seconds(REFRESH_TOKEN_LIFETIME_SECS),
        secure,
    )
}

pub fn clear_access_cookie(secure: bool) -> Cookie<'static> {
    build(ACCESS_COOKIE, "", Duration::ZERO, secure)
}

pub fn clear_refresh_cookie(secure: bool) -> Cookie<'static> {
    build(REFRESH_COOKIE, "", Duration::ZERO, secure)
}
