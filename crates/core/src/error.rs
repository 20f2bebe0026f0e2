// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    /// Queue backend unreachable or rejected the command (ingress and consumer side)
    #[error("Queue unavailable: {0}")]
    QueueUnavailable(String),

    /// Queue client was closed; blocking waits return this as a stop signal
    #[error("Queue connection closed")]
    QueueClosed,

    /// Entry could not be decoded into a payload (never retried)
    #[error("Malformed queue entry: {0}")]
    MalformedEntry(String),

    /// Document store insert or lookup failed
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// True for the controlled-stop signal raised by a closed queue
    pub fn is_queue_closed(&self) -> bool {
        matches!(self, AppError::QueueClosed)
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
