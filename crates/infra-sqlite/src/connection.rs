// SQLite Connection Pool Setup

use pyron_core::error::{AppError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

const MAX_CONNECTIONS: u32 = 10;

/// Create SQLite connection pool with WAL mode.
///
/// An in-memory database lives inside a single connection, so the pool is
/// capped at one connection for `sqlite::memory:` URLs.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    if !database_url.starts_with("sqlite:") {
        return Err(AppError::Config(format!(
            "store URL must start with sqlite: (got {})",
            database_url
        )));
    }

    let in_memory = database_url.contains(":memory:");
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| AppError::Config(format!("invalid store URL {}: {}", database_url, e)))?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(if in_memory { 1 } else { MAX_CONNECTIONS })
        // Keep the single in-memory connection (and its data) alive
        .idle_timeout(if in_memory { None } else { Some(Duration::from_secs(600)) })
        .connect_with(options)
        .await
        .map_err(|e| AppError::PersistenceFailure(format!("store connection failed: {}", e)))?;

    info!(database_url = %database_url, "Document store pool ready");
    Ok(pool)
}
