//! Logging setup
//!
//! `tracing` registry with an `EnvFilter` (`RUST_LOG`, default `pyron=info`)
//! and a `fmt` layer writing through a non-blocking stdout appender.

use crate::settings::LogFormat;
use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "pyron=info,pyron_core=info,pyron_infra_redis=info,\
    pyron_infra_sqlite=info,pyron_api_http=info,tower_http=info";

/// Install the global subscriber.
///
/// The returned guard flushes buffered lines on drop; hold it until exit.
pub fn init_tracing(format: LogFormat) -> Result<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .context("Failed to create env filter")?;

    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    match format {
        LogFormat::Json => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(writer))
                .try_init()
                .context("Failed to install tracing subscriber")?;
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(writer))
                .try_init()
                .context("Failed to install tracing subscriber")?;
        }
    }

    Ok(guard)
}
