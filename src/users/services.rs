use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{LoginRequest, Profile, PublicUser, SignupRequest, UpdateProfileRequest},
    repo_types::{NewUser, UserChanges},
    store::UserStore,
};
use crate::{
    auth::{
        jwt::JwtKeys,
        password::{hash_password, verify_password},
    },
    error::AppError,
};

pub const MIN_PASSWORD_CHARS: usize = 6;

/// Well-formed argon2id PHC string with the default cost parameters. Logins for
/// unknown emails verify against it so both failure paths pay for one hash.
pub(crate) const DUMMY_PASSWORD_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

#[cfg(test)]
pub(crate) static VERIFIED_PLAINTEXTS: std::sync::Mutex<Vec<String>> =
    std::sync::Mutex::new(Vec::new());

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn check_password_length(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_CHARS} characters"
        )));
    }
    Ok(())
}

// Argon2 is CPU-bound; keep it off the async workers.
async fn hash(plain: String) -> Result<String, AppError> {
    let hash = tokio::task::spawn_blocking(move || hash_password(&plain))
        .await
        .context("password hashing task")??;
    Ok(hash)
}

async fn verify(plain: String, hash: String) -> Result<bool, AppError> {
    #[cfg(test)]
    VERIFIED_PLAINTEXTS.lock().unwrap().push(plain.clone());

    let ok = tokio::task::spawn_blocking(move || verify_password(&plain, &hash))
        .await
        .context("password verification task")??;
    Ok(ok)
}

pub async fn signup(store: &dyn UserStore, req: SignupRequest) -> Result<PublicUser, AppError> {
    let name = req.name.trim().to_string();
    let email = normalize_email(&req.email);
    let phone = req.phone.trim().to_string();

    if name.is_empty() {
        return Err(AppError::Validation("Name is required".into()));
    }
    if !is_valid_email(&email) {
        return Err(AppError::Validation("Invalid email".into()));
    }
    if phone.is_empty() {
        return Err(AppError::Validation("Phone is required".into()));
    }
    check_password_length(&req.password)?;

    // Fast path only; the store's unique constraint is what actually decides.
    if store.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "signup for registered email");
        return Err(AppError::UserExists);
    }

    let password_hash = hash(req.password).await?;
    let user = store
        .create(NewUser {
            name,
            email,
            phone,
            password_hash,
        })
        .await?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(user.into())
}

/// Returns the public profile and a freshly issued session token.
pub async fn login(
    store: &dyn UserStore,
    keys: &JwtKeys,
    req: LoginRequest,
) -> Result<(PublicUser, String), AppError> {
    let email = normalize_email(&req.email);

    let Some(user) = store.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        verify(req.password, DUMMY_PASSWORD_HASH.to_string()).await?;
        return Err(AppError::InvalidCredentials);
    };

    if !verify(req.password, user.password_hash.clone()).await? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    let token = keys.issue(user.id)?;
    info!(user_id = %user.id, "user logged in");
    Ok((user.into(), token))
}

pub async fn update_profile(
    store: &dyn UserStore,
    user_id: Uuid,
    req: UpdateProfileRequest,
) -> Result<Profile, AppError> {
    let user = store.find_by_id(user_id).await?.ok_or(AppError::NotFound)?;
    let mut changes = UserChanges::default();

    if let Some(new_password) = req.new_password.filter(|p| !p.is_empty()) {
        let current = req
            .current_password
            .filter(|p| !p.is_empty())
            .ok_or(AppError::PasswordRequired)?;
        if !verify(current, user.password_hash.clone()).await? {
            warn!(user_id = %user.id, "password change with wrong current password");
            return Err(AppError::PasswordIncorrect);
        }
        check_password_length(&new_password)?;
        changes.password_hash = Some(hash(new_password).await?);
    }

    changes.name = req
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    let updated = store.update(user.id, changes).await?;
    info!(user_id = %updated.id, "profile updated");
    Ok(updated.into())
}

/// Hard-deletes the caller's account.
pub async fn delete_account(store: &dyn UserStore, user_id: Option<Uuid>) -> Result<(), AppError> {
    let user_id = user_id.ok_or(AppError::Unauthorized)?;
    store.delete(user_id).await?;
    info!(user_id = %user_id, "account deleted");
    Ok(())
}
