//! Meme creation and sharing: a REST API over DynamoDB and S3, the caption
//! renderer, and a client library for composing and posting memes.

pub mod auth;
pub mod aws_clients;
pub mod client;
pub mod config;
pub mod domain;
pub mod editor;
pub mod errors;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod ranking;
pub mod render;
pub mod repositories;
pub mod routes;
pub mod startup;
pub mod storage;
pub mod views;

use crate::config::Config;
use crate::domain::{FileStorage, MemeRepository, UserRepository};
use ab_glyph::FontArc;
use std::sync::Arc;

/// Shared resources for the web server.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub meme_repo: Arc<dyn MemeRepository>,
    pub user_repo: Arc<dyn UserRepository>,
    pub file_storage: Arc<dyn FileStorage>,
    /// Fetches remote base images for the render endpoint.
    pub http_client: reqwest::Client,
    /// Bundled bold face unless `MEME_FONT_PATH` names another.
    pub caption_font: FontArc,
}
