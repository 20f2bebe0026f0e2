//! HTTP Error Types
//!
//! Maps application errors to status codes. Request-shape errors never get
//! here; axum's `Json` extractor rejects them (422/415/400).

use crate::types::ErrorResponse;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pyron_core::error::AppError;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Queue backend could not take the append
    #[error("queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::QueueUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::QueueUnavailable(msg) => ApiError::QueueUnavailable(msg),
            AppError::QueueClosed => ApiError::QueueUnavailable(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        error!(status = status.as_u16(), error = %self, "Webhook rejected");

        let body = ErrorResponse {
            status: "error".to_string(),
            message: match &self {
                ApiError::QueueUnavailable(_) => "Queue unavailable, payload not accepted".into(),
                ApiError::Internal(_) => "Internal error".into(),
            },
        };
        (status, Json(body)).into_response()
    }
}
