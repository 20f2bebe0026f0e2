// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("Entry is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Invalid channel name: {0}")]
    InvalidChannel(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
