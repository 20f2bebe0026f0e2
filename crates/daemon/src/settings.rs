//! Process settings
//!
//! Read once at startup from an optional TOML file and `PYRON_*`
//! environment variables (env wins). Immutable afterwards.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use pyron_core::application::consumer::constants::{DEFAULT_BACKOFF, DEFAULT_SHUTDOWN_GRACE};
use pyron_core::domain::{DeliveryPolicy, QueueChannel};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "pyron.toml";
const ENV_PREFIX: &str = "PYRON";

/// Shared by every worker that keeps the default; give each worker its own name
pub const DEFAULT_CONSUMER_NAME: &str = "worker-0";

const SQLITE_SCHEME: &str = "sqlite:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub redis_url: String,
    /// SQLite file (or `sqlite::memory:`); `~` is expanded
    pub store_url: String,
    pub collection: String,
    pub channel: String,
    pub consumer_name: String,
    pub delivery_policy: DeliveryPolicy,
    pub backoff_ms: u64,
    pub host: String,
    pub port: u16,
    pub api_prefix: String,
    pub request_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
    /// Serve ingress even if the queue could not be reached at startup
    pub degraded_ingress: bool,
    pub log_format: LogFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379/0".to_string(),
            store_url: "~/.pyron/pyron_db.sqlite".to_string(),
            collection: "signals".to_string(),
            channel: pyron_core::domain::DEFAULT_CHANNEL.to_string(),
            consumer_name: DEFAULT_CONSUMER_NAME.to_string(),
            delivery_policy: DeliveryPolicy::default(),
            backoff_ms: DEFAULT_BACKOFF.as_millis() as u64,
            host: "0.0.0.0".to_string(),
            port: 8000,
            api_prefix: "/api/v1".to_string(),
            request_timeout_secs: 15,
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE.as_secs(),
            degraded_ingress: false,
            log_format: LogFormat::default(),
        }
    }
}

impl Settings {
    /// Load from `path` (missing file is fine) plus the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let config = Config::builder()
            .add_source(File::from(path.as_path()).format(FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        Self::from_config(config)
    }

    /// Parse TOML text only (no environment)
    pub fn from_toml(text: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()
            .context("Failed to parse configuration")?;
        Self::from_config(config)
    }

    fn from_config(config: Config) -> Result<Self> {
        let settings: Settings = config
            .try_deserialize()
            .context("Invalid configuration")?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        QueueChannel::new(self.channel.as_str())
            .with_context(|| format!("Invalid channel name {:?}", self.channel))?;
        if self.collection.trim().is_empty() {
            anyhow::bail!("collection must not be empty");
        }
        if self.consumer_name.trim().is_empty() {
            anyhow::bail!("consumer_name must not be empty");
        }
        Ok(())
    }

    pub fn queue_channel(&self) -> Result<QueueChannel> {
        QueueChannel::new(self.channel.as_str())
            .with_context(|| format!("Invalid channel name {:?}", self.channel))
    }

    /// Store URL with the `sqlite://` scheme added to bare paths and `~` expanded
    pub fn store_url_expanded(&self) -> String {
        if self.store_url.starts_with(SQLITE_SCHEME) {
            return self.store_url.clone();
        }
        format!("sqlite://{}", shellexpand::tilde(&self.store_url))
    }

    /// Filesystem path of a file-backed store, `None` for in-memory databases
    pub fn store_file(&self) -> Option<PathBuf> {
        let url = self.store_url_expanded();
        if url.contains(":memory:") {
            return None;
        }
        let path = url
            .trim_start_matches("sqlite://")
            .trim_start_matches(SQLITE_SCHEME);
        let path = path.split('?').next().unwrap_or(path);
        Some(PathBuf::from(path))
    }

    pub fn uses_default_consumer_name(&self) -> bool {
        self.consumer_name == DEFAULT_CONSUMER_NAME
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.channel, "trading_signals");
        assert_eq!(settings.delivery_policy, DeliveryPolicy::AtLeastOnce);
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.backoff(), Duration::from_secs(1));
        assert!(!settings.degraded_ingress);
        assert_eq!(settings.shutdown_grace(), DEFAULT_SHUTDOWN_GRACE);
        assert!(settings.uses_default_consumer_name());
    }

    #[test]
    fn test_named_consumer_is_not_default() {
        let settings = Settings::from_toml(r#"consumer_name = "worker-eu-1""#).unwrap();
        assert!(!settings.uses_default_consumer_name());
    }

    #[test]
    fn test_toml_overrides() {
        let settings = Settings::from_toml(
            r#"
            redis_url = "redis://cache:6379/2"
            delivery_policy = "at_most_once"
            port = 9000
            log_format = "json"
            degraded_ingress = true
            "#,
        )
        .unwrap();

        assert_eq!(settings.redis_url, "redis://cache:6379/2");
        assert_eq!(settings.delivery_policy, DeliveryPolicy::AtMostOnce);
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.log_format, LogFormat::Json);
        assert!(settings.degraded_ingress);
        // Untouched keys keep their defaults
        assert_eq!(settings.collection, "signals");
    }

    #[test]
    fn test_invalid_channel_is_rejected() {
        assert!(Settings::from_toml(r#"channel = "has space""#).is_err());
        assert!(Settings::from_toml(r#"delivery_policy = "exactly_once""#).is_err());
    }

    #[test]
    fn test_store_url_tilde_expansion() {
        let settings = Settings::default();
        let url = settings.store_url_expanded();
        assert!(url.starts_with("sqlite://"));
        assert!(!url.contains('~'));
        let file = settings.store_file().unwrap();
        assert!(file.ends_with(".pyron/pyron_db.sqlite"));

        let memory = Settings {
            store_url: "sqlite::memory:".into(),
            ..Settings::default()
        };
        assert_eq!(memory.store_url_expanded(), "sqlite::memory:");
        assert!(memory.store_file().is_none());

        let explicit = Settings {
            store_url: "sqlite:///var/lib/pyron/db.sqlite?mode=rwc".into(),
            ..Settings::default()
        };
        assert_eq!(
            explicit.store_file().unwrap(),
            PathBuf::from("/var/lib/pyron/db.sqlite")
        );
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let settings = Settings::load(Some(Path::new("/nonexistent/pyron.toml"))).unwrap();
        assert_eq!(settings.collection, Settings::default().collection);
    }
}
