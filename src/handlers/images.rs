use super::load_visible_meme;
use crate::{
    auth::MaybeAuthUser,
    errors::{internal_error, AppError, RenderError},
    render,
    AppState,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
};
use std::sync::Arc;
use tracing;
use uuid::Uuid;

fn binary_response(data: Vec<u8>, content_type: &str) -> Result<Response, AppError> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(data))
        .map_err(|e| internal_error!("Failed to build image response: {}", e))
}

/// GET /images/{key}
pub async fn get_image(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    tracing::debug!(image_key = %key, "Serving uploaded image");
    let (data, content_type) = state.file_storage.download(&key).await?;
    binary_response(data, content_type.as_deref().unwrap_or("application/octet-stream"))
}

/// Base image bytes: from blob storage when uploaded here, else fetched.
async fn base_image(state: &AppState, image_key: Option<&str>, image_url: Option<&str>) -> Result<Vec<u8>, AppError> {
    if let Some(key) = image_key {
        let (data, _) = state.file_storage.download(key).await?;
        return Ok(data);
    }
    let url = image_url.ok_or_else(|| AppError::NotFound("Meme has no image".into()))?;
    tracing::debug!(%url, "Fetching remote base image");
    let response = state
        .http_client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| RenderError::ImageLoad(format!("{url}: {e}")))?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| RenderError::ImageLoad(format!("{url}: {e}")))?;
    Ok(bytes.to_vec())
}

/// GET /memes/{id}/render: the composite as PNG. Does not count as a view.
pub async fn render_meme(
    State(state): State<Arc<AppState>>,
    viewer: MaybeAuthUser,
    Path(id_str): Path<String>,
) -> Result<Response, AppError> {
    let meme_id = Uuid::parse_str(&id_str)?;
    let meme = load_visible_meme(&state, meme_id, viewer.user_id()).await?;
    let bytes = base_image(&state, meme.image_key.as_deref(), meme.image_url.as_deref()).await?;

    let font = Some(state.caption_font.clone());
    let design = meme.design;
    let png = tokio::task::spawn_blocking(move || render::render_png(&design, &bytes, font))
        .await
        .map_err(|e| internal_error!("Render task failed: {}", e))??;

    tracing::debug!(%meme_id, bytes = png.len(), "Rendered meme");
    binary_response(png, "image/png")
}
