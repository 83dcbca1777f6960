use super::{remove_blob, require_http_url};
use crate::{
    auth::{
        jwt::{generate_token, TokenLifetime},
        password::{hash_password, validate_password_strength, verify_password},
        AuthUser,
    },
    errors::{internal_error, AppError},
    models::{Role, User},
    views::{AccountView, AuthResponse, MessageResponse, UserStats},
    AppState,
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Profile fields a user may change. An empty `avatar` clears it.
#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

/// Identity fields as stored: username trimmed, email trimmed and lowercased.
#[derive(Debug, Validate)]
struct Identity {
    #[validate(length(min = 3, max = 30, message = "Username must be between 3 and 30 characters"))]
    username: String,
    #[validate(email(message = "Please enter a valid email"))]
    email: String,
}

impl Identity {
    fn normalized(username: &str, email: &str) -> Result<Self, AppError> {
        let identity = Identity {
            username: username.trim().to_string(),
            email: email.trim().to_lowercase(),
        };
        identity.validate()?;
        Ok(identity)
    }
}

fn issue_token(user: &User, lifetime: TokenLifetime, state: &AppState) -> Result<String, AppError> {
    generate_token(user.user_id, user.role, lifetime, &state.config.jwt)
        .map_err(|e| internal_error!("Failed to sign token: {}", e))
}

/// Argon2 runs on the blocking pool, away from the async workers.
async fn hash_blocking(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| internal_error!("Password hashing task failed: {}", e))?
        .map_err(|e| internal_error!("Failed to hash password: {}", e))
}

async fn verify_blocking(password: String, hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| internal_error!("Password check task failed: {}", e))?
        .map_err(|e| internal_error!("Stored password hash is unreadable: {}", e))
}

async fn load_account(state: &AppState, user_id: Uuid) -> Result<User, AppError> {
    state
        .user_repo
        .get_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

async fn register_with(
    state: &AppState,
    request: RegisterRequest,
    lifetime: TokenLifetime,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    // Everything is checked before anything is written.
    let identity = Identity::normalized(&request.username, &request.email)?;
    validate_password_strength(&request.password).map_err(AppError::InvalidInput)?;

    let password_hash = hash_blocking(request.password).await?;
    let now = Utc::now();
    let user = User {
        user_id: Uuid::new_v4(),
        username: identity.username,
        email: identity.email,
        password_hash,
        avatar: None,
        role: Role::User,
        created_at: now,
        updated_at: now,
    };
    state.user_repo.create(&user).await?;

    let token = issue_token(&user, lifetime, state)?;
    tracing::info!(user_id = %user.user_id, username = %user.username, "User registered");
    Ok((StatusCode::CREATED, Json(AuthResponse { user: AccountView::from(&user), token })))
}

async fn login_with(
    state: &AppState,
    request: LoginRequest,
    lifetime: TokenLifetime,
) -> Result<Json<AuthResponse>, AppError> {
    let invalid = || AppError::Unauthorized("Invalid credentials".into());
    let email = request.email.trim().to_lowercase();
    let user = state.user_repo.get_by_email(&email).await?.ok_or_else(invalid)?;

    if !verify_blocking(request.password, user.password_hash.clone()).await? {
        tracing::info!(user_id = %user.user_id, "Login rejected: wrong password");
        return Err(invalid());
    }

    let token = issue_token(&user, lifetime, state)?;
    tracing::info!(user_id = %user.user_id, "User logged in");
    Ok(Json(AuthResponse { user: AccountView::from(&user), token }))
}

/// POST /users/register: token valid for the standard lifetime.
pub async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let Json(request) = payload?;
    register_with(&state, request, TokenLifetime::Standard).await
}

/// POST /auth/register: token valid for the short lifetime.
pub async fn auth_register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let Json(request) = payload?;
    register_with(&state, request, TokenLifetime::Short).await
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    let Json(request) = payload?;
    login_with(&state, request, TokenLifetime::Standard).await
}

pub async fn auth_login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    let Json(request) = payload?;
    login_with(&state, request, TokenLifetime::Short).await
}

/// GET /users/profile, /users/me, /auth/me
pub async fn get_profile(State(state): State<Arc<AppState>>, user: AuthUser) -> Result<Json<AccountView>, AppError> {
    let account = load_account(&state, user.user_id).await?;
    Ok(Json(AccountView::from(&account)))
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    payload: Result<Json<ProfileUpdate>, JsonRejection>,
) -> Result<Json<AccountView>, AppError> {
    let Json(update) = payload?;
    let previous = load_account(&state, user.user_id).await?;

    let identity = Identity::normalized(
        update.username.as_deref().unwrap_or(&previous.username),
        update.email.as_deref().unwrap_or(&previous.email),
    )?;
    let avatar = match update.avatar.as_deref().map(str::trim) {
        None => previous.avatar.clone(),
        Some("") => None,
        Some(url) => Some(require_http_url("avatar", url)?),
    };

    let updated = User {
        username: identity.username,
        email: identity.email,
        avatar,
        updated_at: Utc::now(),
        ..previous.clone()
    };
    state.user_repo.update(&previous, &updated).await?;
    tracing::info!(user_id = %user.user_id, "Profile updated");
    Ok(Json(AccountView::from(&updated)))
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(request) = payload?;
    let account = load_account(&state, user.user_id).await?;

    if !verify_blocking(request.current_password, account.password_hash.clone()).await? {
        return Err(AppError::Unauthorized("Current password is incorrect".into()));
    }
    validate_password_strength(&request.new_password).map_err(AppError::InvalidInput)?;

    let updated = User {
        password_hash: hash_blocking(request.new_password).await?,
        updated_at: Utc::now(),
        ..account.clone()
    };
    state.user_repo.update(&account, &updated).await?;
    tracing::info!(user_id = %user.user_id, "Password changed");
    Ok(Json(MessageResponse::new("Password updated successfully")))
}

/// DELETE /users/profile. The user's memes and their images go with the
/// account; comments and votes elsewhere stay and resolve to no user.
pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<MessageResponse>, AppError> {
    let account = load_account(&state, user.user_id).await?;

    let memes = state.meme_repo.list_by_creator(user.user_id).await?;
    for meme in &memes {
        state.meme_repo.delete(meme.meme_id).await?;
        if let Some(key) = &meme.image_key {
            if remove_blob(&state, key).await.is_err() {
                tracing::warn!(meme_id = %meme.meme_id, image_key = %key, "Meme deleted but its image was kept");
            }
        }
    }
    state.user_repo.delete(&account).await?;

    tracing::info!(user_id = %user.user_id, memes_removed = memes.len(), "Account deleted");
    Ok(Json(MessageResponse::new("Account deleted successfully")))
}

/// GET /users/{userId}/stats
pub async fn user_stats(
    State(state): State<Arc<AppState>>,
    _caller: AuthUser,
    Path(user_id): Path<String>,
) -> Result<Json<UserStats>, AppError> {
    let user_id = Uuid::parse_str(&user_id)?;
    let memes = state.meme_repo.list_by_creator(user_id).await?;
    Ok(Json(UserStats::from_memes(&memes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn password_hashing_runs_off_the_executor() {
        let hash = hash_blocking("hunter22".into()).await.unwrap();
        assert!(verify_blocking("hunter22".into(), hash.clone()).await.unwrap());
        assert!(!verify_blocking("hunter23".into(), hash).await.unwrap());
        assert_matches!(
            verify_blocking("hunter22".into(), "not a phc string".into()).await,
            Err(AppError::InternalServerError(_))
        );
    }

    #[test]
    fn identity_is_trimmed_lowercased_and_checked() {
        let identity = Identity::normalized("  pepe  ", " Pepe@Example.COM ").unwrap();
        assert_eq!(identity.username, "pepe");
        assert_eq!(identity.email, "pepe@example.com");

        assert_matches!(Identity::normalized("ab", "ab@example.com"), Err(AppError::Validation(_)));
        assert_matches!(Identity::normalized(&"x".repeat(31), "x@example.com"), Err(AppError::Validation(_)));
        assert_matches!(Identity::normalized("pepe", "not-an-email"), Err(AppError::Validation(_)));
    }
}
