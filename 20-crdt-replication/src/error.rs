//! Errors returned to HTTP callers and their status codes.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::warn;

/// Errors surfaced to HTTP callers. Nothing is mutated when one is returned.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// `/change` body was not a JSON object of string values.
    #[error("invalid body format")]
    InvalidBody,
    /// `/sync` body was not a JSON array of operations.
    #[error("malformed sync payload: {0}")]
    MalformedSync(#[source] serde_json::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidBody => StatusCode::BAD_REQUEST,
            ApiError::MalformedSync(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        warn!(%status, error = %self, "request rejected");
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
