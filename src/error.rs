use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::events::ActivityError;

/// Request-level failures. Reported to the caller as a JSON body with
/// `success: false`; the HTTP status stays 200.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Request body is missing or empty")]
    MissingBody,

    #[error("Malformed JSON body: {0}")]
    MalformedBody(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error(transparent)]
    Log(#[from] ActivityError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::warn!("Request failed: {}", self);
        Json(json!({ "success": false, "error": self.to_string() })).into_response()
    }
}
