// Domain Layer - Pure business logic and entities

pub mod channel;
pub mod error;
pub mod payload;
pub mod policy;

// Re-exports
pub use channel::{QueueChannel, DEFAULT_CHANNEL};
pub use error::DomainError;
pub use payload::{Acknowledgment, DeadLetter, DocumentId, Payload, QueueEntry, StoredDocument};
pub use policy::DeliveryPolicy;
