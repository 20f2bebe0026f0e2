// Signal Queue Port (Interface)
// Durable FIFO list keyed by a fixed channel name, with a blocking pop

use crate::domain::{DeadLetter, QueueEntry};
use crate::error::Result;
use async_trait::async_trait;

/// Queue client for a single channel.
///
/// Appends are atomic and become visible to the next blocking pop in append
/// order. Blocking operations wait without timeout until an entry arrives or
/// the client is closed, in which case they return `AppError::QueueClosed`.
#[async_trait]
pub trait SignalQueue: Send + Sync {
    /// Append an entry to the channel tail (RPUSH)
    async fn push(&self, entry: &QueueEntry) -> Result<()>;

    /// Remove and return the channel head, waiting while it is empty (BLPOP).
    /// The entry is gone from the backend once this returns.
    async fn pop_blocking(&self) -> Result<QueueEntry>;

    /// Move the channel head into this consumer's processing list, waiting
    /// while the channel is empty (BLMOVE). The entry stays reserved until
    /// `ack`, `requeue` or `dead_letter`.
    async fn reserve_blocking(&self) -> Result<QueueEntry>;

    /// Drop a reserved entry after it was persisted
    async fn ack(&self, entry: &QueueEntry) -> Result<()>;

    /// Move a reserved entry back to the channel head
    async fn requeue(&self, entry: &QueueEntry) -> Result<()>;

    /// Release a reservation (if any) and append the letter to the dead-letter list
    async fn dead_letter(&self, letter: &DeadLetter) -> Result<()>;

    /// Move every entry left in this consumer's processing list back to the
    /// channel head, oldest first. Returns the number moved.
    async fn recover_in_flight(&self) -> Result<usize>;

    /// Number of entries waiting in the channel
    async fn len(&self) -> Result<usize>;

    /// Close the client. Pending blocking waits return `QueueClosed`.
    /// Calling it more than once is a no-op.
    async fn close(&self);
}

// ============================================================================
// In-memory implementation for tests
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Mutex, MutexGuard, PoisonError};
    use tokio::sync::{watch, Notify};

    #[derive(Default)]
    struct Lists {
        ready: VecDeque<String>,
        processing: Vec<String>,
        dead: Vec<String>,
    }

    /// Single-process stand-in for the Redis list
    pub struct InMemorySignalQueue {
        lists: Mutex<Lists>,
        available: Notify,
        closed: watch::Sender<bool>,
        unavailable: AtomicBool,
    }

    impl Default for InMemorySignalQueue {
        fn default() -> Self {
            Self::new()
        }
    }

    impl InMemorySignalQueue {
        pub fn new() -> Self {
            let (closed, _) = watch::channel(false);
            Self {
                lists: Mutex::new(Lists::default()),
                available: Notify::new(),
                closed,
                unavailable: AtomicBool::new(false),
            }
        }

        /// Simulate an unreachable backend for push/pop
        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        /// Append raw text, bypassing payload encoding
        pub fn push_raw(&self, raw: impl Into<String>) {
            self.lists().ready.push_back(raw.into());
            self.available.notify_one();
        }

        pub fn ready_entries(&self) -> Vec<String> {
            self.lists().ready.iter().cloned().collect()
        }

        pub fn processing_entries(&self) -> Vec<String> {
            self.lists().processing.clone()
        }

        pub fn dead_letters(&self) -> Vec<DeadLetter> {
            self.lists()
                .dead
                .iter()
                .filter_map(|raw| serde_json::from_str(raw).ok())
                .collect()
        }

        pub fn is_closed(&self) -> bool {
            *self.closed.borrow()
        }

        fn lists(&self) -> MutexGuard<'_, Lists> {
            self.lists.lock().unwrap_or_else(PoisonError::into_inner)
        }

        fn check_available(&self) -> Result<()> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(AppError::QueueUnavailable(
                    "simulated backend outage".to_string(),
                ));
            }
            Ok(())
        }

        async fn take(&self, reserve: bool) -> Result<QueueEntry> {
            let mut closed = self.closed.subscribe();
            loop {
                if *closed.borrow_and_update() {
                    return Err(AppError::QueueClosed);
                }
                self.check_available()?;

                {
                    let mut lists = self.lists();
                    if let Some(raw) = lists.ready.pop_front() {
                        if reserve {
                            lists.processing.push(raw.clone());
                        }
                        // Pass the wakeup on to the next waiter
                        if !lists.ready.is_empty() {
                            self.available.notify_one();
                        }
                        return Ok(QueueEntry::new(raw));
                    }
                }

                tokio::select! {
                    _ = self.available.notified() => {}
                    _ = closed.changed() => {}
                }
            }
        }

        fn release(lists: &mut Lists, entry: &str) -> bool {
            match lists.processing.iter().position(|raw| raw == entry) {
                Some(idx) => {
                    lists.processing.remove(idx);
                    true
                }
                None => false,
            }
        }
    }

    #[async_trait]
    impl SignalQueue for InMemorySignalQueue {
        async fn push(&self, entry: &QueueEntry) -> Result<()> {
            if self.is_closed() {
                return Err(AppError::QueueUnavailable("queue client closed".to_string()));
            }
            self.check_available()?;
            self.push_raw(entry.as_str());
            Ok(())
        }

        async fn pop_blocking(&self) -> Result<QueueEntry> {
            self.take(false).await
        }

        async fn reserve_blocking(&self) -> Result<QueueEntry> {
            self.take(true).await
        }

        async fn ack(&self, entry: &QueueEntry) -> Result<()> {
            Self::release(&mut self.lists(), entry.as_str());
            Ok(())
        }

        async fn requeue(&self, entry: &QueueEntry) -> Result<()> {
            {
                let mut lists = self.lists();
                Self::release(&mut lists, entry.as_str());
                lists.ready.push_front(entry.as_str().to_string());
            }
            self.available.notify_one();
            Ok(())
        }

        async fn dead_letter(&self, letter: &DeadLetter) -> Result<()> {
            let raw = serde_json::to_string(letter)?;
            let mut lists = self.lists();
            Self::release(&mut lists, &letter.entry);
            lists.dead.push(raw);
            Ok(())
        }

        async fn recover_in_flight(&self) -> Result<usize> {
            self.check_available()?;
            let moved = {
                let mut lists = self.lists();
                let in_flight: Vec<String> = lists.processing.drain(..).collect();
                for raw in in_flight.iter().rev() {
                    lists.ready.push_front(raw.clone());
                }
                in_flight.len()
            };
            if moved > 0 {
                self.available.notify_one();
            }
            Ok(moved)
        }

        async fn len(&self) -> Result<usize> {
            Ok(self.lists().ready.len())
        }

        async fn close(&self) {
            self.closed.send_replace(true);
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use tokio_test::{assert_pending, assert_ready, task};

        #[tokio::test]
        async fn test_pop_is_fifo() {
            let queue = InMemorySignalQueue::new();
            for raw in ["a", "b", "c"] {
                queue.push(&QueueEntry::new(raw)).await.unwrap();
            }
            assert_eq!(queue.len().await.unwrap(), 3);

            for expected in ["a", "b", "c"] {
                assert_eq!(queue.pop_blocking().await.unwrap().as_str(), expected);
            }
            assert_eq!(queue.len().await.unwrap(), 0);
        }

        #[test]
        fn test_pop_waits_until_push() {
            let queue = InMemorySignalQueue::new();
            let mut pop = task::spawn(queue.pop_blocking());

            assert_pending!(pop.poll());
            queue.push_raw("late");
            assert!(pop.is_woken());

            let entry = assert_ready!(pop.poll()).unwrap();
            assert_eq!(entry.as_str(), "late");
        }

        #[test]
        fn test_close_releases_waiter() {
            let queue = InMemorySignalQueue::new();
            let mut pop = task::spawn(queue.reserve_blocking());

            assert_pending!(pop.poll());
            close_now(&queue);
            assert!(pop.is_woken());

            let err = assert_ready!(pop.poll()).unwrap_err();
            assert!(err.is_queue_closed());
        }

        fn close_now(queue: &InMemorySignalQueue) {
            // close() never awaits anything, so polling it once completes it
            let mut close = task::spawn(queue.close());
            assert_ready!(close.poll());
        }

        #[tokio::test]
        async fn test_reserve_ack_requeue() {
            let queue = InMemorySignalQueue::new();
            queue.push_raw("one");
            queue.push_raw("two");

            let first = queue.reserve_blocking().await.unwrap();
            assert_eq!(queue.processing_entries(), vec!["one".to_string()]);

            queue.requeue(&first).await.unwrap();
            assert!(queue.processing_entries().is_empty());
            assert_eq!(queue.ready_entries(), vec!["one", "two"]);

            let again = queue.reserve_blocking().await.unwrap();
            queue.ack(&again).await.unwrap();
            assert!(queue.processing_entries().is_empty());
            assert_eq!(queue.ready_entries(), vec!["two"]);
        }

        #[tokio::test]
        async fn test_recover_in_flight_keeps_order() {
            let queue = InMemorySignalQueue::new();
            for raw in ["a", "b", "c"] {
                queue.push_raw(raw);
            }
            queue.reserve_blocking().await.unwrap();
            queue.reserve_blocking().await.unwrap();

            assert_eq!(queue.recover_in_flight().await.unwrap(), 2);
            assert_eq!(queue.ready_entries(), vec!["a", "b", "c"]);
        }

        #[tokio::test]
        async fn test_dead_letter_releases_reservation() {
            let queue = InMemorySignalQueue::new();
            queue.push_raw("{broken");
            let entry = queue.reserve_blocking().await.unwrap();

            queue
                .dead_letter(&DeadLetter::new(&entry, "bad json", 7))
                .await
                .unwrap();

            assert!(queue.processing_entries().is_empty());
            let letters = queue.dead_letters();
            assert_eq!(letters.len(), 1);
            assert_eq!(letters[0].entry, "{broken");
            assert_eq!(letters[0].failed_at, 7);
        }

        #[tokio::test]
        async fn test_push_fails_when_unavailable() {
            let queue = InMemorySignalQueue::new();
            queue.set_unavailable(true);
            let err = queue.push(&QueueEntry::new("{}")).await.unwrap_err();
            assert!(matches!(err, AppError::QueueUnavailable(_)));
        }
    }
}
