use axum::{http::StatusCode, Json};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("visitor total row is missing")]
    MissingTotal,
}

/// Failures that keep the server from starting.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("store initialization failed: {0}")]
    Store(#[from] StoreError),

    #[error("failed to bind listener: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
#[error("visitor service unavailable: {0}")]
pub struct ClientUnavailable(#[from] pub reqwest::Error);

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Logs `err` and hides it behind a generic `message`.
    pub fn store(message: impl Into<String>, err: StoreError) -> Self {
        let message = message.into();
        error!("{message}: {err}");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
