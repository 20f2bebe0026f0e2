// Queue Channel Domain Model

use super::error::{DomainError, Result};
use std::fmt;

/// Channel the ingress path appends to and the consumer pops from
pub const DEFAULT_CHANNEL: &str = "trading_signals";

const MAX_CHANNEL_NAME_LEN: usize = 128;

/// A single named FIFO list in the queue backend.
///
/// Derived keys hold reserved entries (one list per consumer) and
/// dead-lettered entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueChannel {
    name: String,
}

impl QueueChannel {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(DomainError::InvalidChannel("name cannot be empty".to_string()));
        }
        if name.len() > MAX_CHANNEL_NAME_LEN {
            return Err(DomainError::InvalidChannel(format!(
                "name too long ({} > {})",
                name.len(),
                MAX_CHANNEL_NAME_LEN
            )));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidChannel(format!(
                "name contains whitespace: {:?}",
                name
            )));
        }
        Ok(Self { name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// List holding entries reserved by `consumer` but not yet acknowledged
    pub fn processing_key(&self, consumer: &str) -> String {
        format!("{}:processing:{}", self.name, consumer)
    }

    pub fn dead_letter_key(&self) -> String {
        format!("{}:dead", self.name)
    }
}

impl Default for QueueChannel {
    fn default() -> Self {
        Self {
            name: DEFAULT_CHANNEL.to_string(),
        }
    }
}

impl fmt::Display for QueueChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_channel() {
        let channel = QueueChannel::default();
        assert_eq!(channel.name(), "trading_signals");
        assert_eq!(channel.dead_letter_key(), "trading_signals:dead");
        assert_eq!(
            channel.processing_key("worker-0"),
            "trading_signals:processing:worker-0"
        );
    }

    #[test]
    fn test_channel_name_empty() {
        let err = QueueChannel::new("").unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_channel_name_too_long() {
        let err = QueueChannel::new("a".repeat(129)).unwrap_err();
        assert!(err.to_string().contains("too long"));
    }

    #[test]
    fn test_channel_name_whitespace() {
        assert!(QueueChannel::new("trading signals").is_err());
    }
}
