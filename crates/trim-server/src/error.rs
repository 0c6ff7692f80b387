//! Error types for the HTTP server.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Nothing to serve at the given path.
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Request path tries to escape the served root.
    #[error("Forbidden path: {0}")]
    Forbidden(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            // Do not reveal whether a path outside the root exists.
            Self::FileNotFound(_) | Self::Forbidden(_) => StatusCode::NOT_FOUND,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::debug!(status = status.as_u16(), error = %self, "Request failed");

        status.into_response()
    }
}
