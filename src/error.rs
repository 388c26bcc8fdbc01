use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Request-level failures, each mapping to one JSON `{error, message}` body.
/// Upstream detail is only relayed when the provider supplied a user-safe
/// message with a non-500 status; everything else becomes a generic 500.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Too many requests. Try again in {retry_after} seconds.")]
    RateLimited { retry_after: u64 },

    #[error("{message}")]
    Upstream { status: u16, message: String },

    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "Bad request"),
            AppError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded"),
            AppError::Upstream { status, .. } => (
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                "API Error",
            ),
            AppError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "API Error"),
        };

        let mut body = json!({
            "error": error,
            "message": self.to_string(),
        });
        if let AppError::RateLimited { retry_after } = &self {
            body["retryAfter"] = json!(retry_after);
        }

        (status, Json(body)).into_response()
    }
}
