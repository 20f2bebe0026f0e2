// Application Layer - Use Cases and Pipeline Logic

pub mod consumer;
pub mod lifecycle;
pub mod producer;
pub mod recovery;

// Re-exports
pub use consumer::{
    shutdown_channel, Consumer, ConsumerState, ConsumerStats, Outcome, ShutdownSender,
    ShutdownToken,
};
pub use lifecycle::Connections;
pub use producer::SignalProducer;
pub use recovery::RecoveryService;
