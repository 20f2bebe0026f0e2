// HTTP ingress tests over a real socket

use pyron_api_http::types::{HealthResponse, WebhookResponse, QUEUED_HEADER};
use pyron_api_http::{HttpServer, HttpServerConfig, ServerHandle};
use pyron_core::application::SignalProducer;
use pyron_core::domain::QueueChannel;
use pyron_core::port::signal_queue::mocks::InMemorySignalQueue;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

struct TestServer {
    handle: ServerHandle,
    stop: oneshot::Sender<()>,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.handle.local_addr, path)
    }

    async fn shutdown(self) {
        let _ = self.stop.send(());
        self.handle.stopped().await.unwrap();
    }
}

async fn spawn_server(producer: SignalProducer) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let server = HttpServer::new(HttpServerConfig::default(), Arc::new(producer));
    let handle = server
        .start_on(listener, async move {
            let _ = stopped.await;
        })
        .await
        .unwrap();
    TestServer { handle, stop }
}

#[tokio::test]
async fn test_webhook_returns_202_and_buffers() {
    let queue = Arc::new(InMemorySignalQueue::new());
    let server = spawn_server(SignalProducer::new(queue.clone(), QueueChannel::default())).await;

    let response = reqwest::Client::new()
        .post(server.url("/api/v1/webhook"))
        .json(&json!({"payload": {"ticker": "BTCUSDT", "action": "buy", "price": 67000}}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 202);
    assert_eq!(response.headers()[QUEUED_HEADER], "true");
    let body: WebhookResponse = response.json().await.unwrap();
    assert_eq!(body.status, "buffered");
    assert_eq!(body.message, "Payload received and queued");

    let entries = queue.ready_entries();
    assert_eq!(entries.len(), 1);
    let stored: serde_json::Value = serde_json::from_str(&entries[0]).unwrap();
    assert_eq!(stored, json!({"ticker": "BTCUSDT", "action": "buy", "price": 67000}));

    server.shutdown().await;
}

#[tokio::test]
async fn test_health() {
    let server = spawn_server(SignalProducer::unqueued(QueueChannel::default())).await;

    let response = reqwest::get(server.url("/health")).await.unwrap();
    assert_eq!(response.status(), 200);
    let body: HealthResponse = response.json().await.unwrap();
    assert_eq!(body.status, "We are good!!!");

    server.shutdown().await;
}

#[tokio::test]
async fn test_non_object_payload_is_rejected() {
    let queue = Arc::new(InMemorySignalQueue::new());
    let server = spawn_server(SignalProducer::new(queue.clone(), QueueChannel::default())).await;
    let client = reqwest::Client::new();

    for body in [json!({"payload": [1, 2]}), json!({"payload": "x"}), json!({"other": {}})] {
        let response = client
            .post(server.url("/api/v1/webhook"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 422, "body {body} should be rejected");
    }
    assert!(queue.ready_entries().is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn test_queue_outage_returns_503() {
    let queue = Arc::new(InMemorySignalQueue::new());
    queue.set_unavailable(true);
    let server = spawn_server(SignalProducer::new(queue, QueueChannel::default())).await;

    let response = reqwest::Client::new()
        .post(server.url("/api/v1/webhook"))
        .json(&json!({"payload": {"a": 1}}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 503);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "error");

    server.shutdown().await;
}

#[tokio::test]
async fn test_degraded_ingress_acknowledges_without_queue() {
    let server = spawn_server(SignalProducer::unqueued(QueueChannel::default())).await;

    let response = reqwest::Client::new()
        .post(server.url("/api/v1/webhook"))
        .json(&json!({"payload": {"a": 1}}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 202);
    assert_eq!(response.headers()[QUEUED_HEADER], "false");

    server.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_webhooks_are_all_buffered() {
    let queue = Arc::new(InMemorySignalQueue::new());
    let server = spawn_server(SignalProducer::new(queue.clone(), QueueChannel::default())).await;
    let client = reqwest::Client::new();
    let url = server.url("/api/v1/webhook");

    let requests = (0..50).map(|n| {
        let client = client.clone();
        let url = url.clone();
        async move {
            client
                .post(url)
                .json(&json!({"payload": {"n": n}}))
                .send()
                .await
                .unwrap()
                .status()
        }
    });
    let statuses = futures::future::join_all(requests).await;

    assert!(statuses.iter().all(|status| *status == 202));
    assert_eq!(queue.ready_entries().len(), 50);

    server.shutdown().await;
}
