//! Client side of the meme service: a signed-in session, an HTTP client for
//! the REST API, and the composer that builds a meme before it is posted.

pub mod api;
pub mod composer;
pub mod session;

pub use api::MemeClient;
pub use composer::{
    Composer, ImageChoice, MemeSubmission, Template, TextStyle, EFFECT_PRESETS, FILTER_PRESETS, TEMPLATES, TEXT_STYLES,
};
pub use session::{FileSessionStore, MemorySessionStore, Session, SessionStore};

use crate::errors::RenderError;

/// Errors from the client library.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The HTTP request itself failed (network, DNS, TLS, body decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("Server returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Session file error: {0}")]
    SessionIo(#[from] std::io::Error),

    #[error("Session file is not valid JSON: {0}")]
    SessionFormat(#[from] serde_json::Error),

    #[error("Not signed in")]
    NotSignedIn,

    /// Rejected locally before anything was sent.
    #[error("{0}")]
    Invalid(String),

    #[error("Preview failed: {0}")]
    Render(#[from] RenderError),
}

impl ClientError {
    /// HTTP status of an API error, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}
