// =============================================================================
// Ecoledger Backend - Error Types
// =============================================================================

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// API error type.
///
/// An unresolvable next-tier party is deliberately NOT a variant here:
/// settlement still succeeds in that case and the outcome is reported in the
/// response body instead (see `dues::CascadeOutcome::Unresolved`).
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Insufficient stock: {available} available, {requested} requested")]
    InsufficientStock { available: i64, requested: i64 },

    #[error("Due already settled")]
    AlreadySettled,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::InsufficientStock { .. } => (StatusCode::CONFLICT, self.to_string()),
            ApiError::AlreadySettled => (StatusCode::CONFLICT, "Due already settled".into()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".into())
            }
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
