use super::{load_visible_meme, meme_view, meme_views, remove_blob, require_http_url};
use crate::{
    auth::{AuthUser, MaybeAuthUser},
    editor::{EditPatch, EditState},
    errors::AppError,
    ledger::VoteType,
    models::{Comment, Meme, ReportDetails},
    ranking::{self, PageQuery, DEFAULT_HIGHLIGHTS, DEFAULT_PAGE_SIZE, DEFAULT_TOP_MEMES},
    views::{MemePage, MemeView, MessageResponse, UserDirectory},
    AppState,
};
use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Local, Utc};
use serde::Deserialize;
use std::{fmt::Display, str::FromStr, sync::Arc};
use tracing;
use uuid::Uuid;
use validator::Validate;

const MAX_REPORT_REASON_CHARS: usize = 500;

async fn page_response(
    state: &AppState,
    memes: Vec<Meme>,
    query: &PageQuery,
    viewer: Option<Uuid>,
) -> Result<Json<MemePage>, AppError> {
    let page = ranking::paginate(memes, query.resolve(DEFAULT_PAGE_SIZE));
    let directory = UserDirectory::load(state.user_repo.as_ref(), &page.items).await?;
    Ok(Json(directory.page_view(&page, viewer)))
}

/// GET /memes: published memes, newest first.
pub async fn list_memes(
    State(state): State<Arc<AppState>>,
    viewer: MaybeAuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<MemePage>, AppError> {
    let mut memes: Vec<Meme> = state.meme_repo.list_all().await?.into_iter().filter(|m| !m.is_draft).collect();
    ranking::newest_first(&mut memes);
    tracing::debug!(total = memes.len(), "Listing published memes");
    page_response(&state, memes, &query, viewer.user_id()).await
}

pub async fn trending(
    State(state): State<Arc<AppState>>,
    viewer: MaybeAuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<MemePage>, AppError> {
    let memes = ranking::trending(state.meme_repo.list_all().await?, Utc::now());
    page_response(&state, memes, &query, viewer.user_id()).await
}

// Same trailing window as `trending`; kept as its own route for clients that use it.
pub async fn trending_weekly(
    state: State<Arc<AppState>>,
    viewer: MaybeAuthUser,
    query: Query<PageQuery>,
) -> Result<Json<MemePage>, AppError> {
    trending(state, viewer, query).await
}

pub async fn highlights(
    State(state): State<Arc<AppState>>,
    viewer: MaybeAuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<MemeView>>, AppError> {
    let mut memes = ranking::trending(state.meme_repo.list_all().await?, Utc::now());
    memes.truncate(query.limit_or(DEFAULT_HIGHLIGHTS));
    Ok(Json(meme_views(&state, &memes, viewer.user_id()).await?))
}

pub async fn meme_of_the_day(
    State(state): State<Arc<AppState>>,
    viewer: MaybeAuthUser,
) -> Result<Json<Option<MemeView>>, AppError> {
    let best = ranking::meme_of_the_day(state.meme_repo.list_all().await?, &Local::now());
    match best {
        Some(meme) => Ok(Json(Some(meme_view(&state, &meme, viewer.user_id()).await?))),
        None => Ok(Json(None)),
    }
}

pub async fn weekly_champion(
    State(state): State<Arc<AppState>>,
    viewer: MaybeAuthUser,
) -> Result<Json<Option<MemeView>>, AppError> {
    let best = ranking::weekly_champion(state.meme_repo.list_all().await?, Utc::now());
    match best {
        Some(meme) => Ok(Json(Some(meme_view(&state, &meme, viewer.user_id()).await?))),
        None => Ok(Json(None)),
    }
}

/// GET /memes/user/{userId}: drafts are included only for their owner.
pub async fn user_memes(
    State(state): State<Arc<AppState>>,
    viewer: MaybeAuthUser,
    Path(user_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<MemePage>, AppError> {
    let user_id = Uuid::parse_str(&user_id)?;
    let viewer = viewer.user_id();
    let mut memes: Vec<Meme> = state
        .meme_repo
        .list_by_creator(user_id)
        .await?
        .into_iter()
        .filter(|m| m.is_visible_to(viewer))
        .collect();
    ranking::newest_first(&mut memes);
    page_response(&state, memes, &query, viewer).await
}

pub async fn user_top_memes(
    State(state): State<Arc<AppState>>,
    viewer: MaybeAuthUser,
    Path(user_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<MemeView>>, AppError> {
    let user_id = Uuid::parse_str(&user_id)?;
    let memes = ranking::top_by_upvotes(
        state.meme_repo.list_by_creator(user_id).await?,
        query.limit_or(DEFAULT_TOP_MEMES),
    );
    Ok(Json(meme_views(&state, &memes, viewer.user_id()).await?))
}

/// GET /memes/{id}. Counts as a view.
pub async fn get_meme(
    State(state): State<Arc<AppState>>,
    viewer: MaybeAuthUser,
    Path(id_str): Path<String>,
) -> Result<Json<MemeView>, AppError> {
    let meme_id = Uuid::parse_str(&id_str)?;
    let mut meme = load_visible_meme(&state, meme_id, viewer.user_id()).await?;
    meme.views = state.meme_repo.record_view(meme_id).await?;
    tracing::debug!(%meme_id, views = meme.views, "Meme viewed");
    Ok(Json(meme_view(&state, &meme, viewer.user_id()).await?))
}

/// An image sent as the `image` part of the create form.
struct UploadedImage {
    data: Vec<u8>,
    content_type: Option<String>,
}

/// The create-meme multipart form.
#[derive(Default)]
struct MemeForm {
    patch: EditPatch,
    image_url: Option<String>,
    is_draft: bool,
    image: Option<UploadedImage>,
}

/// Empty means "not sent"; anything else must parse.
fn strict<T>(field: &str, raw: &str) -> Result<Option<T>, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|e| AppError::InvalidInput(format!("{field}: {e}")))
}

/// Numbers that fail to parse fall back to the defaults.
fn lenient_size(raw: &str) -> Option<i64> {
    raw.trim().parse::<f64>().ok().filter(|n| n.is_finite()).map(|n| n.round() as i64)
}

fn lenient_position(raw: &str) -> Option<f32> {
    raw.trim().parse::<f32>().ok().filter(|n| n.is_finite())
}

impl MemeForm {
    fn set_text_field(&mut self, name: &str, value: String) -> Result<(), AppError> {
        let patch = &mut self.patch;
        match name {
            "title" => patch.title = Some(value),
            "topText" => patch.top_text = Some(value),
            "bottomText" => patch.bottom_text = Some(value),
            "topTextSize" => patch.top_text_size = lenient_size(&value),
            "bottomTextSize" => patch.bottom_text_size = lenient_size(&value),
            "topTextPosition" => patch.top_text_position = lenient_position(&value),
            "bottomTextPosition" => patch.bottom_text_position = lenient_position(&value),
            "topTextColor" => patch.top_text_color = strict(name, &value)?,
            "bottomTextColor" => patch.bottom_text_color = strict(name, &value)?,
            "topTextStroke" => patch.top_text_stroke = strict(name, &value)?,
            "bottomTextStroke" => patch.bottom_text_stroke = strict(name, &value)?,
            "topTextEffect" => patch.top_text_effect = strict(name, &value)?,
            "bottomTextEffect" => patch.bottom_text_effect = strict(name, &value)?,
            "imageFilter" => patch.image_filter = strict(name, &value)?,
            "imageUrl" => self.image_url = Some(value).filter(|v| !v.trim().is_empty()),
            "isDraft" => self.is_draft = value.trim() == "true",
            other => tracing::debug!("Ignoring unknown multipart field: {}", other),
        }
        Ok(())
    }

    async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = MemeForm::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if name == "image" {
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await?.to_vec();
                if !data.is_empty() {
                    form.image = Some(UploadedImage { data, content_type });
                }
            } else {
                let value = field.text().await?;
                form.set_text_field(&name, value)?;
            }
        }
        Ok(form)
    }
}

/// Published memes need a title and an image; drafts need neither.
fn check_publishable(meme: &Meme) -> Result<(), AppError> {
    if meme.is_draft {
        return Ok(());
    }
    if meme.design.title.is_empty() {
        return Err(AppError::InvalidInput("Title is required".into()));
    }
    if !meme.has_image() {
        return Err(AppError::InvalidInput("Either an image file or imageUrl must be provided".into()));
    }
    Ok(())
}

/// POST /memes (multipart).
pub async fn create_meme(
    State(state): State<Arc<AppState>>,
    caller: MaybeAuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<MemeView>), AppError> {
    let form = MemeForm::read(multipart).await?;
    if !form.is_draft && caller.0.is_none() {
        return Err(AppError::Unauthorized("Authentication required".into()));
    }

    let design = EditState::default().merge(&form.patch);
    design.validate()?;
    let image_url = form.image_url.as_deref().map(|url| require_http_url("imageUrl", url)).transpose()?;

    let mut meme = Meme::new(design, image_url, None, form.is_draft, caller.user_id(), Utc::now());
    if let Some(image) = &form.image {
        // Sniff the bytes rather than trusting the declared type.
        let format = image::guess_format(&image.data)
            .map_err(|_| AppError::InvalidInput("Uploaded file is not a supported image".into()))?;
        let extension = format.extensions_str().first().copied().unwrap_or("bin");
        meme.image_key = Some(format!("{}.{}", meme.meme_id, extension));
    }
    check_publishable(&meme)?;

    if let Some(key) = &meme.image_key {
        meme.image_url = Some(format!("{}/images/{}", state.config.public_base_url, key));
    }

    // A blob is only written once its record exists.
    state.meme_repo.create(&meme).await?;
    if let (Some(image), Some(key)) = (form.image, meme.image_key.as_deref()) {
        let content_type = image
            .content_type
            .filter(|ct| ct.starts_with("image/"))
            .or_else(|| mime_guess::from_path(key).first_raw().map(str::to_string));
        if let Err(e) = state.file_storage.upload(key, image.data, content_type).await {
            tracing::error!(meme_id = %meme.meme_id, image_key = %key, error = ?e, "Upload failed, dropping the meme");
            state.meme_repo.delete(meme.meme_id).await?;
            return Err(e.into());
        }
    }
    tracing::info!(meme_id = %meme.meme_id, is_draft = meme.is_draft, creator = ?meme.creator_id, "Meme created");
    Ok((StatusCode::CREATED, Json(meme_view(&state, &meme, caller.user_id()).await?)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMemeRequest {
    #[serde(flatten)]
    pub patch: EditPatch,
    pub image_url: Option<String>,
    pub is_draft: Option<bool>,
}

/// PUT /memes/{id}: creator only.
pub async fn update_meme(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id_str): Path<String>,
    payload: Result<Json<UpdateMemeRequest>, JsonRejection>,
) -> Result<Json<MemeView>, AppError> {
    let meme_id = Uuid::parse_str(&id_str)?;
    let Json(request) = payload?;

    let mut meme = load_visible_meme(&state, meme_id, Some(user.user_id)).await?;
    if !meme.is_owned_by(user.user_id) {
        return Err(AppError::Forbidden("Not authorized".into()));
    }

    meme.design = meme.design.merge(&request.patch);
    meme.design.validate()?;
    let mut replaced_key = None;
    if let Some(url) = &request.image_url {
        let url = require_http_url("imageUrl", url)?;
        if meme.image_url.as_deref() != Some(url.as_str()) {
            replaced_key = meme.image_key.take();
            meme.image_url = Some(url);
        }
    }
    if let Some(is_draft) = request.is_draft {
        meme.is_draft = is_draft;
    }
    check_publishable(&meme)?;
    meme.updated_at = Utc::now();

    let stored = state.meme_repo.update_content(&meme).await?;
    if let Some(key) = replaced_key {
        remove_blob(&state, &key).await?;
    }
    tracing::info!(%meme_id, "Meme updated");
    Ok(Json(meme_view(&state, &stored, Some(user.user_id)).await?))
}

/// DELETE /memes/{id}: creator only. Removes the uploaded image too.
pub async fn delete_meme(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id_str): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let meme_id = Uuid::parse_str(&id_str)?;
    let meme = load_visible_meme(&state, meme_id, Some(user.user_id)).await?;
    if !meme.is_owned_by(user.user_id) {
        return Err(AppError::Forbidden("Not authorized".into()));
    }

    state.meme_repo.delete(meme_id).await?;
    if let Some(key) = &meme.image_key {
        // The meme is already gone; a blob left behind is only logged.
        if remove_blob(&state, key).await.is_err() {
            tracing::warn!(%meme_id, image_key = %key, "Meme deleted but its image was kept");
        }
    }

    tracing::info!(%meme_id, "Meme deleted");
    Ok(Json(MessageResponse::new("Meme deleted")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    #[serde(default)]
    pub vote_type: String,
}

pub async fn vote(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id_str): Path<String>,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> Result<Json<MemeView>, AppError> {
    let meme_id = Uuid::parse_str(&id_str)?;
    let Json(request) = payload?;
    let vote: VoteType = request
        .vote_type
        .parse()
        .map_err(|e: crate::ledger::InvalidVoteType| AppError::InvalidInput(e.to_string()))?;

    load_visible_meme(&state, meme_id, Some(user.user_id)).await?;
    let meme = state.meme_repo.cast_vote(meme_id, user.user_id, vote).await?;
    tracing::info!(%meme_id, user_id = %user.user_id, %vote, "Vote recorded");
    Ok(Json(meme_view(&state, &meme, Some(user.user_id)).await?))
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    #[serde(default)]
    pub text: String,
}

pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id_str): Path<String>,
    payload: Result<Json<CommentRequest>, JsonRejection>,
) -> Result<Json<MemeView>, AppError> {
    let meme_id = Uuid::parse_str(&id_str)?;
    let Json(request) = payload?;
    let comment = Comment::new(user.user_id, &request.text, Utc::now())?;

    load_visible_meme(&state, meme_id, Some(user.user_id)).await?;
    let meme = state.meme_repo.add_comment(meme_id, &comment).await?;
    tracing::info!(%meme_id, comment_id = %comment.comment_id, "Comment added");
    Ok(Json(meme_view(&state, &meme, Some(user.user_id)).await?))
}

/// DELETE /memes/{id}/comments/{comment_id}: author only.
pub async fn delete_comment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((id_str, comment_id_str)): Path<(String, String)>,
) -> Result<Json<MessageResponse>, AppError> {
    let meme_id = Uuid::parse_str(&id_str)?;
    let comment_id = Uuid::parse_str(&comment_id_str)?;

    let meme = load_visible_meme(&state, meme_id, Some(user.user_id)).await?;
    let position = meme.comments.authorize_removal(comment_id, user.user_id)?;
    state.meme_repo.remove_comment(meme_id, comment_id, position).await?;

    tracing::info!(%meme_id, %comment_id, "Comment deleted");
    Ok(Json(MessageResponse::new("Comment deleted")))
}

#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    #[serde(default)]
    pub reason: String,
}

pub async fn report(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id_str): Path<String>,
    payload: Result<Json<ReportRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let meme_id = Uuid::parse_str(&id_str)?;
    let Json(request) = payload?;
    let reason = request.reason.trim();
    if reason.is_empty() {
        return Err(AppError::InvalidInput("Report reason is required".into()));
    }
    if reason.chars().count() > MAX_REPORT_REASON_CHARS {
        return Err(AppError::InvalidInput(format!(
            "Report reason must be at most {MAX_REPORT_REASON_CHARS} characters"
        )));
    }

    load_visible_meme(&state, meme_id, Some(user.user_id)).await?;
    let details = ReportDetails {
        reason: reason.to_string(),
        reported_by: user.user_id,
        reported_at: Utc::now(),
    };
    state.meme_repo.report(meme_id, &details).await?;
    tracing::warn!(%meme_id, reported_by = %user.user_id, "Meme reported");
    Ok(Json(MessageResponse::new("Meme reported")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{HexColor, ImageFilter, TextEffect};
    use assert_matches::assert_matches;

    #[test]
    fn junk_numbers_fall_back_and_bad_colors_are_rejected() {
        let mut form = MemeForm::default();
        form.set_text_field("topTextSize", "huge".into()).unwrap();
        form.set_text_field("bottomTextSize", "64.4".into()).unwrap();
        form.set_text_field("topTextPosition", "NaN".into()).unwrap();
        form.set_text_field("topTextColor", "#0f0".into()).unwrap();
        form.set_text_field("imageFilter", "sepia(100%)".into()).unwrap();
        form.set_text_field("isDraft", "true".into()).unwrap();

        assert_eq!(form.patch.top_text_size, None);
        assert_eq!(form.patch.bottom_text_size, Some(64));
        assert_eq!(form.patch.top_text_position, None);
        assert_eq!(form.patch.top_text_color, Some(HexColor::rgb(0, 255, 0)));
        assert_eq!(form.patch.image_filter, Some(ImageFilter::Sepia(1.0)));
        assert!(form.is_draft);

        assert_matches!(form.set_text_field("bottomTextColor", "red".into()), Err(AppError::InvalidInput(_)));
        assert_matches!(form.set_text_field("topTextEffect", "wobble".into()), Err(AppError::InvalidInput(_)));
    }

    #[test]
    fn design_form_fields_read_back_unchanged() {
        let design = EditState::default().merge(&EditPatch {
            title: Some("Distracted".into()),
            top_text: Some("me".into()),
            bottom_text: Some("new crate".into()),
            top_text_size: Some(72),
            bottom_text_position: Some(0.25),
            bottom_text_color: Some(HexColor::rgb(0xff, 0xcc, 0x00)),
            top_text_effect: Some(TextEffect::Rotate(-15.0)),
            image_filter: Some(ImageFilter::Sepia(1.0)),
            ..EditPatch::default()
        });

        let mut form = MemeForm::default();
        for (name, value) in design.form_fields() {
            form.set_text_field(name, value).unwrap();
        }
        assert_eq!(EditState::default().merge(&form.patch), design);
    }

    #[test]
    fn drafts_skip_the_publish_rules() {
        let draft = Meme::new(EditState::default(), None, None, true, None, Utc::now());
        assert!(check_publishable(&draft).is_ok());

        let mut published = Meme { is_draft: false, ..draft };
        assert_matches!(check_publishable(&published), Err(AppError::InvalidInput(msg)) if msg == "Title is required");
        published.design.title = "Drake".into();
        assert_matches!(check_publishable(&published), Err(AppError::InvalidInput(_)));
        published.image_url = Some("https://i.imgflip.com/30b1gx.jpg".into());
        assert!(check_publishable(&published).is_ok());
    }
}
