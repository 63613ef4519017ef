use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{debug, warn};

use super::{cookie::SESSION_COOKIE, jwt::JwtKeys};
use crate::{error::AppError, state::AppState, users::repo_types::User};

/// Identity resolved from the session cookie, if any.
///
/// A missing cookie, a bad or expired token, and a token whose user no longer
/// exists all resolve to `Session(None)`. Routes decide for themselves whether
/// an anonymous caller is acceptable.
#[derive(Debug, Clone)]
pub struct Session(pub Option<User>);

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let Some(cookie) = jar.get(SESSION_COOKIE) else {
            return Ok(Session(None));
        };
        if cookie.value().is_empty() {
            return Ok(Session(None));
        }

        let keys = JwtKeys::from_ref(state);
        let claims = match keys.verify(cookie.value()) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(error = %e, "ignoring session cookie");
                return Ok(Session(None));
            }
        };

        let user = state.store.find_by_id(claims.sub).await?;
        if user.is_none() {
            warn!(user_id = %claims.sub, "session token refers to a deleted user");
        }
        Ok(Session(user))
    }
}

/// An authenticated caller. Rejects with 401 when the session is anonymous.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match Session::from_request_parts(parts, state).await? {
            Session(Some(user)) => Ok(CurrentUser(user)),
            Session(None) => Err(AppError::Unauthorized),
        }
    }
}
