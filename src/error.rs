use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::profile::ProfileError;
use crate::storage::{DirectoryError, StorageError};
use crate::webhook::RelayError;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("user already tracked")]
    AlreadyExists,

    #[error("user not tracked")]
    NotFound,

    #[error("rate limit exceeded")]
    RateLimited { retry_secs: u64 },

    /// Profile lookup failed while adding a user.
    #[error("profile lookup failed: {0}")]
    Profile(#[from] ProfileError),

    /// Profile refresh failed while listing users.
    #[error("profile refresh failed: {0}")]
    Refresh(ProfileError),

    #[error("webhook forward failed: {0}")]
    Webhook(#[from] RelayError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<DirectoryError> for ServerError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::AlreadyExists => ServerError::AlreadyExists,
            DirectoryError::NotFound => ServerError::NotFound,
            DirectoryError::Storage(e) => ServerError::Storage(e),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ServerError::Validation(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ServerError::AlreadyExists => {
                (StatusCode::CONFLICT, json!({ "error": "already exists" }))
            }
            ServerError::NotFound => (StatusCode::NOT_FOUND, json!({ "error": "not found" })),
            ServerError::RateLimited { retry_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({ "error": "too many requests", "retry": retry_secs }),
            ),
            ServerError::Profile(ProfileError::NotFound) => {
                (StatusCode::BAD_REQUEST, json!({ "error": "unknown user id" }))
            }
            ServerError::Profile(e) => {
                tracing::warn!(error = %e, "profile fetch failed");
                (
                    StatusCode::BAD_REQUEST,
                    json!({ "error": "invalid user id or API error" }),
                )
            }
            ServerError::Refresh(e) => {
                tracing::error!(error = %e, "profile refresh failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "failed to fetch" }),
                )
            }
            ServerError::Webhook(e) => {
                tracing::error!(error = %e, "webhook forward failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "failed to forward webhook", "details": e.to_string() }),
                )
            }
            ServerError::Storage(e) => {
                tracing::error!(error = %e, "storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal server error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
