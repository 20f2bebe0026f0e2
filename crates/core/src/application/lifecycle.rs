// Connection Lifecycle - process-wide queue and store handles

use crate::error::{AppError, Result};
use crate::port::{DocumentStore, SignalQueue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Queue and store handles shared by the ingress path and the consumer.
///
/// Built once by the process entry point after the connections are
/// established, then only read. `close` is the single teardown routine.
/// Either handle may be absent (a process that only serves ingress has no
/// store, a degraded ingress has no queue).
pub struct Connections {
    queue: Option<Arc<dyn SignalQueue>>,
    store: Option<Arc<dyn DocumentStore>>,
    closed: AtomicBool,
}

impl Connections {
    pub fn new(
        queue: Option<Arc<dyn SignalQueue>>,
        store: Option<Arc<dyn DocumentStore>>,
    ) -> Self {
        Self {
            queue,
            store,
            closed: AtomicBool::new(false),
        }
    }

    pub fn queue(&self) -> Option<Arc<dyn SignalQueue>> {
        self.queue.clone()
    }

    pub fn store(&self) -> Option<Arc<dyn DocumentStore>> {
        self.store.clone()
    }

    pub fn require_queue(&self) -> Result<Arc<dyn SignalQueue>> {
        self.queue()
            .ok_or_else(|| AppError::Config("queue connection was not established".to_string()))
    }

    pub fn require_store(&self) -> Result<Arc<dyn DocumentStore>> {
        self.store()
            .ok_or_else(|| AppError::Config("store connection was not established".to_string()))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Release both handles. Safe to call more than once and after a
    /// partial startup; absent handles are skipped.
    ///
    /// Closing the queue forces any blocking pop to return `QueueClosed`.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("Connections already closed");
            return;
        }

        if let Some(queue) = &self.queue {
            queue.close().await;
            info!("Queue connection closed");
        }
        if let Some(store) = &self.store {
            store.close().await;
            info!("Store connection closed");
        }
    }
}
