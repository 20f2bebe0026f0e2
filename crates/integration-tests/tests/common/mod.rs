//! Shared fixtures: in-memory queue + SQLite store wired into a consumer

#![allow(dead_code)]

use async_trait::async_trait;
use pyron_core::application::{shutdown_channel, Consumer, ConsumerStats, ShutdownSender};
use pyron_core::domain::{
    DeadLetter, DeliveryPolicy, DocumentId, Payload, QueueChannel, QueueEntry, StoredDocument,
};
use pyron_core::error::{AppError, Result};
use pyron_core::port::signal_queue::mocks::InMemorySignalQueue;
use pyron_core::port::{DocumentStore, SignalQueue};
use pyron_infra_sqlite::{create_pool, run_migrations, SqliteDocumentStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const TEST_BACKOFF: Duration = Duration::from_millis(20);

pub async fn sqlite_store() -> Arc<SqliteDocumentStore> {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    Arc::new(SqliteDocumentStore::new(pool, "signals"))
}

pub fn payload(value: serde_json::Value) -> Payload {
    Payload::from_value(value).unwrap()
}

/// SQLite store whose first `n` inserts fail like a dropped connection
pub struct FlakyStore {
    inner: Arc<SqliteDocumentStore>,
    failures_remaining: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<SqliteDocumentStore>, failures: usize) -> Self {
        Self {
            inner,
            failures_remaining: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn insert(&self, payload: &Payload) -> Result<DocumentId> {
        let fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(AppError::PersistenceFailure("connection reset".into()));
        }
        self.inner.insert(payload).await
    }

    async fn find_by_id(&self, id: &DocumentId) -> Result<Option<StoredDocument>> {
        self.inner.find_by_id(id).await
    }

    async fn count(&self) -> Result<u64> {
        self.inner.count().await
    }

    async fn close(&self) {
        self.inner.close().await
    }
}

/// In-memory queue whose first `n` requeues fail like a dropped connection
pub struct FlakyRequeueQueue {
    pub inner: Arc<InMemorySignalQueue>,
    failures_remaining: AtomicUsize,
}

impl FlakyRequeueQueue {
    pub fn new(inner: Arc<InMemorySignalQueue>, failures: usize) -> Self {
        Self {
            inner,
            failures_remaining: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl SignalQueue for FlakyRequeueQueue {
    async fn push(&self, entry: &QueueEntry) -> Result<()> {
        self.inner.push(entry).await
    }

    async fn pop_blocking(&self) -> Result<QueueEntry> {
        self.inner.pop_blocking().await
    }

    async fn reserve_blocking(&self) -> Result<QueueEntry> {
        self.inner.reserve_blocking().await
    }

    async fn ack(&self, entry: &QueueEntry) -> Result<()> {
        self.inner.ack(entry).await
    }

    async fn requeue(&self, entry: &QueueEntry) -> Result<()> {
        let fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(AppError::QueueUnavailable("connection reset".into()));
        }
        self.inner.requeue(entry).await
    }

    async fn dead_letter(&self, letter: &DeadLetter) -> Result<()> {
        self.inner.dead_letter(letter).await
    }

    async fn recover_in_flight(&self) -> Result<usize> {
        self.inner.recover_in_flight().await
    }

    async fn len(&self) -> Result<usize> {
        self.inner.len().await
    }

    async fn close(&self) {
        self.inner.close().await
    }
}

/// Consumer running on a background task
pub struct RunningConsumer {
    pub shutdown: ShutdownSender,
    pub handle: JoinHandle<Result<ConsumerStats>>,
}

impl RunningConsumer {
    pub fn spawn(
        queue: Arc<dyn SignalQueue>,
        store: Arc<dyn DocumentStore>,
        policy: DeliveryPolicy,
    ) -> Self {
        let consumer = Consumer::new(QueueChannel::default(), queue, store, policy)
            .with_backoff(TEST_BACKOFF);
        let (shutdown, token) = shutdown_channel();
        let handle = tokio::spawn(async move { consumer.run(token).await });
        Self { shutdown, handle }
    }

    pub async fn stop(self) -> ConsumerStats {
        self.shutdown.shutdown();
        tokio::time::timeout(Duration::from_secs(2), self.handle)
            .await
            .expect("consumer did not stop in time")
            .unwrap()
            .unwrap()
    }
}

/// Poll until the store holds `expected` documents
pub async fn wait_for_count(store: &dyn DocumentStore, expected: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let count = store.count().await.unwrap();
        if count >= expected {
            assert_eq!(count, expected, "more documents than expected");
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {} documents (have {})",
            expected,
            count
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
