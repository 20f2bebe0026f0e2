// SQLite DocumentStore Implementation

use async_trait::async_trait;
use pyron_core::domain::{DocumentId, Payload, StoredDocument};
use pyron_core::error::{AppError, Result};
use pyron_core::port::id_provider::UuidProvider;
use pyron_core::port::time_provider::SystemTimeProvider;
use pyron_core::port::{DocumentStore, IdProvider, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Helper to convert sqlx::Error to AppError
fn map_sqlx_error(err: sqlx::Error) -> AppError {
    AppError::PersistenceFailure(err.to_string())
}

/// One named collection inside the `documents` table
pub struct SqliteDocumentStore {
    pool: SqlitePool,
    collection: String,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
            id_provider: Arc::new(UuidProvider),
            time_provider: Arc::new(SystemTimeProvider),
        }
    }

    /// Deterministic ids and timestamps (tests)
    pub fn with_providers(
        mut self,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        self.id_provider = id_provider;
        self.time_provider = time_provider;
        self
    }
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: String,
    collection: String,
    body: String,
    inserted_at: i64,
}

impl TryFrom<DocumentRow> for StoredDocument {
    type Error = AppError;

    fn try_from(row: DocumentRow) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(&row.body)?;
        let body = Payload::from_value(value)?;
        Ok(StoredDocument {
            id: row.id,
            collection: row.collection,
            body,
            inserted_at: row.inserted_at,
        })
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    #[instrument(skip(self, payload), fields(collection = %self.collection))]
    async fn insert(&self, payload: &Payload) -> Result<DocumentId> {
        let id = self.id_provider.generate_id();
        let body = serde_json::to_string(payload)?;
        let inserted_at = self.time_provider.now_millis();

        sqlx::query(
            r#"
            INSERT INTO documents (id, collection, body, inserted_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&self.collection)
        .bind(&body)
        .bind(inserted_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(document_id = %id, "Document inserted");
        Ok(id)
    }

    async fn find_by_id(&self, id: &DocumentId) -> Result<Option<StoredDocument>> {
        let row: Option<DocumentRow> = sqlx::query_as(
            "SELECT id, collection, body, inserted_at FROM documents \
             WHERE id = ? AND collection = ?",
        )
        .bind(id)
        .bind(&self.collection)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(StoredDocument::try_from).transpose()
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(count.max(0) as u64)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
