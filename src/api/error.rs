//! Request-level API errors

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Errors that fail a request outright
///
/// Backend failures never show up here: they end in the apology reply inside
/// a normal response.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed or missing input
    BadRequest(String),
    /// A collaborator the request needs is not configured
    NotConfigured(&'static str),
    /// Speech could not be transcribed
    TranscriptionFailed(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
        }

        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotConfigured(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.to_string()),
            Self::TranscriptionFailed(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        tracing::warn!(status = %status, error = %message, "request failed");
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
