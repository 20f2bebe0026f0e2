//! Connection setup for each process mode

use crate::settings::Settings;
use anyhow::{Context, Result};
use pyron_core::application::Connections;
use pyron_core::port::{DocumentStore, SignalQueue};
use pyron_infra_redis::RedisSignalQueue;
use pyron_infra_sqlite::{create_pool, run_migrations, SqliteDocumentStore};
use std::sync::Arc;
use tracing::{info, warn};

/// Which halves of the pipeline this process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::Subcommand)]
pub enum Mode {
    /// HTTP ingress only (queue connection)
    Api,
    /// Consumer only (queue and store connections)
    Worker,
    /// Ingress and consumer in one process
    All,
}

impl Mode {
    pub fn runs_api(self) -> bool {
        matches!(self, Mode::Api | Mode::All)
    }

    pub fn runs_worker(self) -> bool {
        matches!(self, Mode::Worker | Mode::All)
    }
}

/// Establish the connections `mode` needs.
///
/// Failure is fatal, except a queue failure in `api` mode with
/// `degraded_ingress` set: ingress then starts without a queue handle.
pub async fn establish(settings: &Settings, mode: Mode) -> Result<Connections> {
    let channel = settings.queue_channel()?;

    if mode.runs_worker() && settings.uses_default_consumer_name() {
        warn!(
            consumer_name = %settings.consumer_name,
            "Default consumer name in use; give each worker process its own consumer_name"
        );
    }

    let queue: Option<Arc<dyn SignalQueue>> =
        match RedisSignalQueue::connect(&settings.redis_url, channel, &settings.consumer_name)
            .await
        {
            Ok(queue) => Some(Arc::new(queue)),
            Err(e) if mode == Mode::Api && settings.degraded_ingress => {
                warn!(
                    redis_url = %settings.redis_url,
                    error = %e,
                    "Queue unreachable; starting DEGRADED ingress (payloads will not be queued)"
                );
                None
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to connect to queue at {}", settings.redis_url)
                })
            }
        };

    let store: Option<Arc<dyn DocumentStore>> = if mode.runs_worker() {
        match connect_store(settings).await {
            Ok(store) => Some(store),
            Err(e) => {
                // Partial startup: release the queue before bailing out
                Connections::new(queue, None).close().await;
                return Err(e);
            }
        }
    } else {
        None
    };

    Ok(Connections::new(queue, store))
}

async fn connect_store(settings: &Settings) -> Result<Arc<dyn DocumentStore>> {
    let store_url = settings.store_url_expanded();
    if let Some(file) = settings.store_file() {
        if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create store directory {}", parent.display())
            })?;
        }
    }

    info!(store_url = %store_url, collection = %settings.collection, "Opening document store");
    let pool = create_pool(&store_url)
        .await
        .with_context(|| format!("Failed to open document store at {}", store_url))?;
    run_migrations(&pool)
        .await
        .context("Document store migration failed")?;

    Ok(Arc::new(SqliteDocumentStore::new(
        pool,
        settings.collection.clone(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_settings() -> Settings {
        Settings {
            redis_url: "redis://127.0.0.1:1/0".into(),
            store_url: "sqlite::memory:".into(),
            ..Settings::default()
        }
    }

    #[test]
    fn test_mode_halves() {
        assert!(Mode::All.runs_api() && Mode::All.runs_worker());
        assert!(Mode::Api.runs_api() && !Mode::Api.runs_worker());
        assert!(!Mode::Worker.runs_api() && Mode::Worker.runs_worker());
    }

    #[tokio::test]
    async fn test_worker_fails_fast_without_queue() {
        let result = establish(&unreachable_settings(), Mode::Worker).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_degraded_api_starts_without_queue() {
        let settings = Settings {
            degraded_ingress: true,
            ..unreachable_settings()
        };

        let connections = establish(&settings, Mode::Api).await.unwrap();
        assert!(connections.queue().is_none());
        assert!(connections.store().is_none());
        connections.close().await;
    }

    #[tokio::test]
    async fn test_api_without_degraded_flag_is_fatal() {
        let result = establish(&unreachable_settings(), Mode::Api).await;
        assert!(result.is_err());
    }
}
