// Producer Adapter - ingress side of the pipeline

use crate::application::lifecycle::Connections;
use crate::domain::{Acknowledgment, Payload, QueueChannel, QueueEntry};
use crate::error::{AppError, Result};
use crate::port::SignalQueue;
use std::sync::Arc;
use tracing::{debug, warn};

/// Appends validated payloads to the channel tail.
///
/// The producer never waits for persistence. Its acknowledgment means
/// "accepted for asynchronous processing", not "stored".
pub struct SignalProducer {
    queue: Option<Arc<dyn SignalQueue>>,
    channel: QueueChannel,
}

impl SignalProducer {
    pub fn new(queue: Arc<dyn SignalQueue>, channel: QueueChannel) -> Self {
        Self {
            queue: Some(queue),
            channel,
        }
    }

    /// Producer without a queue handle (degraded ingress)
    pub fn unqueued(channel: QueueChannel) -> Self {
        Self {
            queue: None,
            channel,
        }
    }

    /// Producer bound to whatever queue handle the process established
    pub fn from_connections(connections: &Connections, channel: QueueChannel) -> Self {
        Self {
            queue: connections.queue(),
            channel,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.queue.is_none()
    }

    pub fn channel(&self) -> &QueueChannel {
        &self.channel
    }

    /// Serialize `payload` and append it to the channel tail.
    ///
    /// Returns as soon as the queue backend acknowledged the append:
    /// - `Acknowledgment::Buffered`: the queue grew by one entry
    /// - `Acknowledgment::Unqueued`: no queue handle exists; nothing was
    ///   appended and a warning is logged for every call
    ///
    /// # Errors
    /// - `AppError::QueueUnavailable` if the backend rejected or could not
    ///   receive the append. No retry is attempted here.
    pub async fn enqueue(&self, payload: &Payload) -> Result<Acknowledgment> {
        let Some(queue) = &self.queue else {
            warn!(
                channel = %self.channel,
                "No queue connection: payload acknowledged but NOT queued"
            );
            return Ok(Acknowledgment::Unqueued);
        };

        let entry = QueueEntry::encode(payload)?;
        queue.push(&entry).await.map_err(|e| match e {
            AppError::QueueUnavailable(_) => e,
            other => AppError::QueueUnavailable(other.to_string()),
        })?;

        debug!(
            channel = %self.channel,
            bytes = entry.as_str().len(),
            "Payload buffered"
        );
        Ok(Acknowledgment::Buffered)
    }
}
