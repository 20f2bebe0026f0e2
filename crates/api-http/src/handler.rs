//! HTTP Handlers

use crate::error::ApiError;
use crate::types::{HealthResponse, WebhookRequest, WebhookResponse, QUEUED_HEADER};
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::Json;
use pyron_core::application::SignalProducer;
use std::sync::Arc;
use tracing::debug;

/// POST /webhook
///
/// 202 once the queue acknowledged the append. In degraded ingress (no
/// queue handle) the answer is the same 202 with `x-pyron-queued: false`.
pub async fn webhook(
    State(producer): State<Arc<SignalProducer>>,
    Json(request): Json<WebhookRequest>,
) -> Result<
    (
        StatusCode,
        [(HeaderName, HeaderValue); 1],
        Json<WebhookResponse>,
    ),
    ApiError,
> {
    let ack = producer.enqueue(&request.payload).await?;
    debug!(queued = ack.is_queued(), "Webhook accepted");

    let queued = HeaderValue::from_static(if ack.is_queued() { "true" } else { "false" });
    Ok((
        StatusCode::ACCEPTED,
        [(HeaderName::from_static(QUEUED_HEADER), queued)],
        Json(WebhookResponse::buffered()),
    ))
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyron_core::domain::{Payload, QueueChannel};
    use pyron_core::port::signal_queue::mocks::InMemorySignalQueue;
    use serde_json::json;

    fn request(value: serde_json::Value) -> Json<WebhookRequest> {
        Json(WebhookRequest {
            payload: Payload::from_value(value).unwrap(),
        })
    }

    #[tokio::test]
    async fn test_webhook_buffers_payload() {
        let queue = Arc::new(InMemorySignalQueue::new());
        let producer = Arc::new(SignalProducer::new(queue.clone(), QueueChannel::default()));

        let (status, headers, Json(body)) =
            webhook(State(producer), request(json!({"ticker": "BTCUSDT"})))
                .await
                .unwrap();

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(headers[0].1, "true");
        assert_eq!(body, WebhookResponse::buffered());
        assert_eq!(queue.ready_entries(), vec![r#"{"ticker":"BTCUSDT"}"#.to_string()]);
    }

    #[tokio::test]
    async fn test_webhook_degraded_still_accepts() {
        let producer = Arc::new(SignalProducer::unqueued(QueueChannel::default()));

        let (status, headers, _) = webhook(State(producer), request(json!({"a": 1})))
            .await
            .unwrap();

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(headers[0].1, "false");
    }

    #[tokio::test]
    async fn test_webhook_queue_outage_is_error() {
        let queue = Arc::new(InMemorySignalQueue::new());
        queue.set_unavailable(true);
        let producer = Arc::new(SignalProducer::new(queue, QueueChannel::default()));

        let err = webhook(State(producer), request(json!({"a": 1})))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_health() {
        let Json(body) = health().await;
        assert_eq!(body.status, "We are good!!!");
    }
}
