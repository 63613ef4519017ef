use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use super::jwt::SESSION_TTL;
use crate::config::Environment;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "jwt";

/// HTTP-only session cookie. Production deployments serve the dashboard from
/// another site, so the cookie must be `Secure; SameSite=None` there.
pub fn session_cookie(token: String, env: Environment) -> Cookie<'static> {
    build(token, SESSION_TTL, env)
}

/// Overwrites the session cookie with an empty, already-expired value.
pub fn cleared_session_cookie(env: Environment) -> Cookie<'static> {
    build(String::new(), Duration::ZERO, env)
}

fn build(value: String, max_age: Duration, env: Environment) -> Cookie<'static> {
    let same_site = if env.is_production() {
        SameSite::None
    } else {
        SameSite::Lax
    };
    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .max_age(max_age)
        .same_site(same_site)
        .secure(env.is_production())
        .build()
}
