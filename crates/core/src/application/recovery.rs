// In-flight recovery (at-least-once delivery)
use crate::domain::QueueChannel;
use crate::error::Result;
use crate::port::SignalQueue;
use std::sync::Arc;
use tracing::{info, warn};

/// Startup recovery for reserved entries.
///
/// A consumer that crashed between reserving an entry and acknowledging it
/// leaves the entry in its processing list. Before the first reservation,
/// those entries go back to the channel head so they are persisted (again).
pub struct RecoveryService {
    queue: Arc<dyn SignalQueue>,
    channel: QueueChannel,
}

impl RecoveryService {
    pub fn new(queue: Arc<dyn SignalQueue>, channel: QueueChannel) -> Self {
        Self { queue, channel }
    }

    /// Returns the number of entries moved back to the channel
    pub async fn recover_in_flight(&self) -> Result<usize> {
        info!(channel = %self.channel, "Starting in-flight entry recovery");

        let recovered = self.queue.recover_in_flight().await?;
        if recovered > 0 {
            warn!(
                channel = %self.channel,
                recovered,
                "Re-queued entries left unacknowledged by a previous run"
            );
        } else {
            info!(channel = %self.channel, "No in-flight entries to recover");
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::signal_queue::mocks::InMemorySignalQueue;

    #[tokio::test]
    async fn test_recover_moves_reserved_entries_back() {
        let queue = Arc::new(InMemorySignalQueue::new());
        queue.push_raw(r#"{"n":1}"#);
        queue.push_raw(r#"{"n":2}"#);
        queue.reserve_blocking().await.unwrap();

        let service = RecoveryService::new(queue.clone(), QueueChannel::default());
        assert_eq!(service.recover_in_flight().await.unwrap(), 1);
        assert_eq!(queue.ready_entries(), vec![r#"{"n":1}"#, r#"{"n":2}"#]);

        // Nothing left the second time
        assert_eq!(service.recover_in_flight().await.unwrap(), 0);
    }
}
