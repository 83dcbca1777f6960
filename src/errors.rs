use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

// --- Domain/Infrastructure Errors ---

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("{entity} not found with ID: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Database backend error: {0}")]
    BackendError(#[from] anyhow::Error),

    #[error("Stored record could not be parsed: {0}")]
    DataCorruption(String),

    #[error("{0} is already taken")]
    Duplicate(&'static str),

    #[error("Record changed while it was being updated: {0}")]
    StaleWrite(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File upload failed: {0}")]
    UploadFailed(String),

    #[error("File not found with key: {0}")]
    NotFound(String),

    #[error("Storage backend error: {0}")]
    BackendError(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to load base image: {0}")]
    ImageLoad(String),
    #[error("No caption font is available")]
    FontUnavailable,
    #[error("Caption font could not be loaded: {0}")]
    InvalidFont(String),
    #[error("Failed to encode rendered image: {0}")]
    Encode(String),
}

// --- Web Layer Error ---

#[derive(Error, Debug)]
pub enum AppError {
    // Input validation / request parsing errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Error processing multipart form data: {0}")]
    MultipartError(#[from] axum::extract::multipart::MultipartError),
    #[error("Invalid ID format: {0}")]
    InvalidUuid(#[from] uuid::Error),
    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    // Caller identity
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),

    // Domain/Service level errors (mapped from RepoError/StorageError)
    #[error("{0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Could not access stored data")]
    RepositoryError(#[source] RepoError),
    #[error("Could not perform file storage operation")]
    StorageError(#[source] StorageError),
    #[error("Could not render meme")]
    RenderError(#[from] RenderError),

    // Configuration / Startup errors
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Initialization error: {0}")]
    InitError(String),

    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

// --- Conversions from Domain Errors to AppError ---

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound { entity, .. } => AppError::NotFound(format!("{entity} not found")),
            RepoError::Duplicate(field) => {
                AppError::InvalidInput(format!("User with this {field} already exists"))
            }
            RepoError::StaleWrite(msg) => AppError::Conflict(msg),
            e @ (RepoError::BackendError(_) | RepoError::DataCorruption(_)) => AppError::RepositoryError(e),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(format!("Image not found: {key}")),
            e => AppError::StorageError(e),
        }
    }
}

impl From<crate::config::ConfigError> for AppError {
    fn from(err: crate::config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

/// Joins the per-field messages of a failed `validate()` call.
fn validation_message(errors: &validator::ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| match &e.message {
                Some(message) => message.to_string(),
                None => format!("{field} is invalid"),
            })
        })
        .collect();
    messages.sort();
    messages.join("; ")
}

// --- Axum Response Implementation ---

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, detail) = match &self {
            // 4xx Client Errors
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::MultipartError(e) => {
                (StatusCode::BAD_REQUEST, format!("Invalid multipart form data: {e}"), None)
            }
            AppError::InvalidUuid(e) => (StatusCode::BAD_REQUEST, format!("Invalid ID format: {e}"), None),
            AppError::Validation(errors) => (StatusCode::BAD_REQUEST, validation_message(errors), None),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone(), None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone(), None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone(), None),

            // 5xx Server Errors
            AppError::RepositoryError(e) => {
                tracing::error!(error.source = ?e, "Repository error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "Database operation failed".to_string(), Some(e.to_string()))
            }
            AppError::StorageError(e) => {
                tracing::error!(error.source = ?e, "Storage error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "File storage operation failed".to_string(), Some(e.to_string()))
            }
            AppError::RenderError(e) => {
                tracing::error!(error.source = ?e, "Render error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "Error rendering meme".to_string(), Some(e.to_string()))
            }
            AppError::ConfigError(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server configuration error".to_string(), None)
            }
            AppError::InitError(msg) => {
                tracing::error!("Initialization error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server initialization error".to_string(), None)
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal server error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "An internal server error occurred".to_string(), Some(msg.clone()))
            }
        };

        if status.is_server_error() {
            tracing::error!(error.message = %message, error.detail = %self, "Responding with error");
        } else {
            tracing::warn!(status = status.as_u16(), error.message = %message, "Rejecting request");
        }

        let body = match detail {
            Some(detail) => json!({ "message": message, "error": detail }),
            None => json!({ "message": message }),
        };
        (status, Json(body)).into_response()
    }
}

// Helper macro for creating internal server errors with context
macro_rules! internal_error {
    ($err:expr) => {
        $crate::errors::AppError::InternalServerError(format!("{}: {}", std::line!(), $err))
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::errors::AppError::InternalServerError(format!(concat!("{}: ", $fmt), std::line!(), $($arg)*))
    };
}
pub(crate) use internal_error;
