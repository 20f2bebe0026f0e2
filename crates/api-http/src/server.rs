//! HTTP Server
//!
//! axum router with request tracing and a per-request timeout, served with
//! graceful shutdown.

use crate::handler;
use axum::extract::MatchedPath;
use axum::http::Request;
use axum::routing::{get, post};
use axum::Router;
use pyron_core::application::SignalProducer;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_API_PREFIX: &str = "/api/v1";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// HTTP Server Configuration
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
    /// Mount point of the webhook route; `/health` stays at the root
    pub api_prefix: String,
    pub request_timeout: Duration,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl HttpServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `/api/v1` + `/webhook`, tolerating a trailing or missing slash
    pub fn webhook_path(&self) -> String {
        let prefix = self.api_prefix.trim_end_matches('/');
        if prefix.is_empty() {
            "/webhook".to_string()
        } else if prefix.starts_with('/') {
            format!("{}/webhook", prefix)
        } else {
            format!("/{}/webhook", prefix)
        }
    }
}

/// Running server: bound address plus the serving task
pub struct ServerHandle {
    pub local_addr: SocketAddr,
    pub task: JoinHandle<std::io::Result<()>>,
}

impl ServerHandle {
    /// Wait for the server to finish draining after shutdown was signalled
    pub async fn stopped(self) -> std::io::Result<()> {
        self.task
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
    }
}

pub struct HttpServer {
    config: HttpServerConfig,
    producer: Arc<SignalProducer>,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, producer: Arc<SignalProducer>) -> Self {
        Self { config, producer }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.config.webhook_path(), post(handler::webhook))
            .route("/health", get(handler::health))
            .with_state(self.producer.clone())
            .layer((
                TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                    let matched_path = request
                        .extensions()
                        .get::<MatchedPath>()
                        .map(MatchedPath::as_str);

                    info_span!("http_request", method = ?request.method(), matched_path)
                }),
                TimeoutLayer::new(self.config.request_timeout),
            ))
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    ///
    /// In-flight requests are drained before the returned task completes.
    pub async fn start<F>(self, shutdown: F) -> std::io::Result<ServerHandle>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.addr()).await?;
        self.start_on(listener, shutdown).await
    }

    /// Serve on an already bound listener (tests bind `127.0.0.1:0`)
    pub async fn start_on<F>(
        self,
        listener: TcpListener,
        shutdown: F,
    ) -> std::io::Result<ServerHandle>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        let router = self.router();

        info!(
            addr = %local_addr,
            webhook = %self.config.webhook_path(),
            degraded = self.producer.is_degraded(),
            "HTTP server listening"
        );

        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
        });

        Ok(ServerHandle { local_addr, task })
    }
}
