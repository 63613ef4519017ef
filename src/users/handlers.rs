use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Router,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{info, instrument};

use super::{
    dto::{
        LoginRequest, MeResponse, MessageResponse, Profile, PublicUser, SignupRequest,
        UpdateProfileRequest,
    },
    services,
};
use crate::{
    auth::{
        cookie::{cleared_session_cookie, session_cookie},
        extractors::{CurrentUser, Session},
        jwt::JwtKeys,
    },
    error::AppError,
    extract::Json,
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/signup", post(signup))
        .route("/users/login", post(login))
        .route("/users/logout", post(logout))
        .route("/users/me", get(me))
        .route("/users/update", put(update))
        .route("/users/delete", delete(delete_account))
}

#[instrument(skip_all)]
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<PublicUser>), AppError> {
    let user = services::signup(state.store.as_ref(), payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<PublicUser>), AppError> {
    let keys = JwtKeys::from_ref(&state);
    let (user, token) = services::login(state.store.as_ref(), &keys, payload).await?;
    let jar = jar.add(session_cookie(token, state.config.environment));
    Ok((jar, Json(user)))
}

/// Always succeeds, with or without a session.
#[instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Json<MessageResponse>) {
    let jar = jar.add(cleared_session_cookie(state.config.environment));
    (
        jar,
        Json(MessageResponse {
            message: "Logged out successfully",
        }),
    )
}

#[instrument(skip_all)]
pub async fn me(CurrentUser(user): CurrentUser) -> Json<MeResponse> {
    Json(user.into())
}

#[instrument(skip_all)]
pub async fn update(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<Profile>, AppError> {
    let profile = services::update_profile(state.store.as_ref(), user.id, payload).await?;
    Ok(Json(profile))
}

#[instrument(skip_all)]
pub async fn delete_account(
    State(state): State<AppState>,
    Session(user): Session,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>), AppError> {
    services::delete_account(state.store.as_ref(), user.map(|u| u.id)).await?;
    info!("session cookie cleared after deletion");
    let jar = jar.add(cleared_session_cookie(state.config.environment));
    Ok((
        jar,
        Json(MessageResponse {
            message: "Account deleted",
        }),
    ))
}
