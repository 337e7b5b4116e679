//! Error types for the webhook engine.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Webhook engine error variants.
///
/// Delivery-attempt failures (transport errors, retriable and terminal
/// remote statuses) never appear here: they are classified inside the
/// dispatcher and live on the outbox row.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Webhook not found")]
    NotFound,

    #[error("Webhook belongs to another tenant")]
    Forbidden,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// JSON error response returned by the admin endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            WebhookError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            WebhookError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            WebhookError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            WebhookError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            WebhookError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            WebhookError::EncryptionFailed(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "encryption_error")
            }
            WebhookError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = ErrorResponse {
            success: false,
            error: error_type.to_string(),
            message: self.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, WebhookError>;
