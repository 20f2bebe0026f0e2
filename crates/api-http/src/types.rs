//! HTTP Request/Response Types

use pyron_core::domain::Payload;
use serde::{Deserialize, Serialize};

pub const BUFFERED_STATUS: &str = "buffered";
pub const BUFFERED_MESSAGE: &str = "Payload received and queued";
pub const HEALTHY_STATUS: &str = "We are good!!!";

/// Response header telling operators whether the payload reached the queue
pub const QUEUED_HEADER: &str = "x-pyron-queued";

/// POST /webhook body. `payload` must be a JSON object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookRequest {
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: String,
    pub message: String,
}

impl WebhookResponse {
    pub fn buffered() -> Self {
        Self {
            status: BUFFERED_STATUS.to_string(),
            message: BUFFERED_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: HEALTHY_STATUS.to_string(),
        }
    }
}

/// Error body for non-2xx answers produced by this crate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}
