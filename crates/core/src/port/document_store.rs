// Document Store Port (Interface)

use crate::domain::{DocumentId, Payload, StoredDocument};
use crate::error::Result;
use async_trait::async_trait;

/// Persistence sink: append-only document collection.
///
/// No upsert, no deduplication, no schema enforcement beyond "valid
/// document". Every failure surfaces as `AppError::PersistenceFailure`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert one document, returning the store-assigned identifier
    async fn insert(&self, payload: &Payload) -> Result<DocumentId>;

    /// Find a stored document by identifier
    async fn find_by_id(&self, id: &DocumentId) -> Result<Option<StoredDocument>>;

    /// Number of documents in the collection
    async fn count(&self) -> Result<u64>;

    /// Release the underlying connection(s). Idempotent.
    async fn close(&self);
}

// ============================================================================
// In-memory implementation for tests
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use crate::port::id_provider::{IdProvider, UuidProvider};
    use crate::port::time_provider::{SystemTimeProvider, TimeProvider};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Mutex, MutexGuard, PoisonError};

    /// Vec-backed collection with failure injection
    pub struct InMemoryDocumentStore {
        collection: String,
        documents: Mutex<Vec<StoredDocument>>,
        failures_remaining: AtomicUsize,
        insert_calls: AtomicUsize,
        closed: AtomicBool,
    }

    impl InMemoryDocumentStore {
        pub fn new(collection: impl Into<String>) -> Self {
            Self {
                collection: collection.into(),
                documents: Mutex::new(Vec::new()),
                failures_remaining: AtomicUsize::new(0),
                insert_calls: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }
        }

        /// Make the next `n` inserts fail with `PersistenceFailure`
        pub fn fail_next(&self, n: usize) {
            self.failures_remaining.store(n, Ordering::SeqCst);
        }

        pub fn documents(&self) -> Vec<StoredDocument> {
            self.lock().clone()
        }

        pub fn insert_calls(&self) -> usize {
            self.insert_calls.load(Ordering::SeqCst)
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        fn lock(&self) -> MutexGuard<'_, Vec<StoredDocument>> {
            self.documents.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    #[async_trait]
    impl DocumentStore for InMemoryDocumentStore {
        async fn insert(&self, payload: &Payload) -> Result<DocumentId> {
            self.insert_calls.fetch_add(1, Ordering::SeqCst);
            if self.is_closed() {
                return Err(AppError::PersistenceFailure("store client closed".to_string()));
            }
            let injected = self
                .failures_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if injected {
                return Err(AppError::PersistenceFailure(
                    "simulated network error".to_string(),
                ));
            }

            let document = StoredDocument {
                id: UuidProvider.generate_id(),
                collection: self.collection.clone(),
                body: payload.clone(),
                inserted_at: SystemTimeProvider.now_millis(),
            };
            let id = document.id.clone();
            self.lock().push(document);
            Ok(id)
        }

        async fn find_by_id(&self, id: &DocumentId) -> Result<Option<StoredDocument>> {
            Ok(self.lock().iter().find(|doc| &doc.id == id).cloned())
        }

        async fn count(&self) -> Result<u64> {
            Ok(self.lock().len() as u64)
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }
}
