//! Bearer-token extractors for handlers.

use super::jwt::validate_token;
use crate::{errors::AppError, models::Role, AppState};
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use std::sync::Arc;
use uuid::Uuid;

/// The authenticated caller. Rejects with 401 unless the request carries a
/// valid token for a user that still exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

/// The caller when a valid token is present, else anonymous. An invalid
/// token is treated as no token.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

impl MaybeAuthUser {
    pub fn user_id(&self) -> Option<Uuid> {
        self.0.map(|user| user.user_id)
    }
}

fn bearer_token(parts: &Parts) -> Result<Option<&str>, AppError> {
    let Some(value) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| Some(token.trim()))
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization format. Expected: Bearer <token>".into()))
}

async fn resolve(token: &str, state: &AppState) -> Result<AuthUser, AppError> {
    let claims = validate_token(token, &state.config.jwt)
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;

    // Tokens outlive deleted accounts; the account must still exist.
    let user = state
        .user_repo
        .get_by_id(claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".into()))?;

    Ok(AuthUser {
        user_id: user.user_id,
        role: user.role,
    })
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?
            .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))?;
        resolve(token, state).await
    }
}

impl FromRequestParts<Arc<AppState>> for MaybeAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let Ok(Some(token)) = bearer_token(parts) else {
            return Ok(MaybeAuthUser(None));
        };
        match resolve(token, state).await {
            Ok(user) => Ok(MaybeAuthUser(Some(user))),
            Err(AppError::Unauthorized(reason)) => {
                tracing::debug!(%reason, "Ignoring unusable bearer token");
                Ok(MaybeAuthUser(None))
            }
            Err(e) => Err(e),
        }
    }
}
