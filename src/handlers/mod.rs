//! HTTP handlers, grouped by resource.

pub mod images;
pub mod memes;
pub mod users;

use crate::{
    errors::{AppError, StorageError},
    models::Meme,
    views::{MemeView, UserDirectory},
    AppState,
};
use uuid::Uuid;

/// Loads a meme the caller may see. Drafts of other users are reported as
/// missing rather than forbidden.
pub(crate) async fn load_visible_meme(state: &AppState, id: Uuid, viewer: Option<Uuid>) -> Result<Meme, AppError> {
    match state.meme_repo.get_by_id(id).await? {
        Some(meme) if meme.is_visible_to(viewer) => Ok(meme),
        Some(_) => {
            tracing::debug!(meme_id = %id, "Hiding draft from non-owner");
            Err(AppError::NotFound("Meme not found".into()))
        }
        None => Err(AppError::NotFound("Meme not found".into())),
    }
}

/// Renders one meme with its creator and commenters resolved.
pub(crate) async fn meme_view(state: &AppState, meme: &Meme, viewer: Option<Uuid>) -> Result<MemeView, AppError> {
    let directory = UserDirectory::load(state.user_repo.as_ref(), std::slice::from_ref(meme)).await?;
    Ok(directory.meme_view(meme, viewer))
}

pub(crate) async fn meme_views(
    state: &AppState,
    memes: &[Meme],
    viewer: Option<Uuid>,
) -> Result<Vec<MemeView>, AppError> {
    let directory = UserDirectory::load(state.user_repo.as_ref(), memes).await?;
    Ok(memes.iter().map(|m| directory.meme_view(m, viewer)).collect())
}

/// Accepts only absolute http(s) URLs.
pub(crate) fn require_http_url(field: &str, url: &str) -> Result<String, AppError> {
    let url = url.trim();
    let has_host = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .is_some_and(|rest| !rest.is_empty() && !rest.starts_with('/'));
    if !has_host {
        return Err(AppError::InvalidInput(format!("{field} must be an http or https URL")));
    }
    Ok(url.to_string())
}

/// Deletes an uploaded image, tolerating one that is already gone.
pub(crate) async fn remove_blob(state: &AppState, key: &str) -> Result<(), AppError> {
    match state.file_storage.delete(key).await {
        Ok(()) => Ok(()),
        Err(StorageError::NotFound(_)) => {
            tracing::warn!(image_key = %key, "Image already missing from storage");
            Ok(())
        }
        Err(e) => {
            tracing::error!(image_key = %key, error = ?e, "Failed to delete image from storage");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_http_urls_are_accepted() {
        assert_eq!(
            require_http_url("imageUrl", " https://i.imgflip.com/30b1gx.jpg ").unwrap(),
            "https://i.imgflip.com/30b1gx.jpg"
        );
        assert!(require_http_url("imageUrl", "http://localhost:3000/images/a.png").is_ok());
        assert!(require_http_url("imageUrl", "ftp://example.com/a.png").is_err());
        assert!(require_http_url("imageUrl", "https://").is_err());
        assert!(require_http_url("imageUrl", "javascript:alert(1)").is_err());
    }
}
