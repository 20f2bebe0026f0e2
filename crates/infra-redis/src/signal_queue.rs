// Redis SignalQueue Implementation

use async_trait::async_trait;
use pyron_core::domain::{DeadLetter, QueueChannel, QueueEntry};
use pyron_core::error::{AppError, Result};
use pyron_core::port::SignalQueue;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Direction};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// Block until an entry arrives (no server-side timeout)
const BLOCK_FOREVER: f64 = 0.0;

/// Helper to convert redis::RedisError to AppError
fn map_redis_error(err: redis::RedisError) -> AppError {
    AppError::QueueUnavailable(err.to_string())
}

/// Redis list keyed by the channel name.
///
/// Two connections are held: one for short commands and a dedicated one for
/// blocking pops, so a consumer parked in BLPOP/BLMOVE never stalls appends.
/// Closing drops both; a parked waiter observes the close flag and returns
/// `QueueClosed`.
pub struct RedisSignalQueue {
    channel: QueueChannel,
    processing_key: String,
    dead_letter_key: String,
    commands: Mutex<Option<ConnectionManager>>,
    blocking: Mutex<Option<ConnectionManager>>,
    closed: watch::Sender<bool>,
}

impl RedisSignalQueue {
    /// Connect to `url` and verify the server answers PING.
    ///
    /// `consumer_name` scopes the processing list used by `reserve_blocking`.
    pub async fn connect(url: &str, channel: QueueChannel, consumer_name: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| AppError::Config(format!("invalid queue URL {}: {}", url, e)))?;

        let mut commands = ConnectionManager::new(client.clone())
            .await
            .map_err(map_redis_error)?;
        let blocking = ConnectionManager::new(client)
            .await
            .map_err(map_redis_error)?;

        let _: String = redis::cmd("PING")
            .query_async(&mut commands)
            .await
            .map_err(map_redis_error)?;

        let (closed, _) = watch::channel(false);
        info!(channel = %channel, consumer = %consumer_name, "Queue connection established");

        Ok(Self {
            processing_key: channel.processing_key(consumer_name),
            dead_letter_key: channel.dead_letter_key(),
            channel,
            commands: Mutex::new(Some(commands)),
            blocking: Mutex::new(Some(blocking)),
            closed,
        })
    }

    pub fn channel(&self) -> &QueueChannel {
        &self.channel
    }

    pub fn processing_key(&self) -> &str {
        &self.processing_key
    }

    pub fn dead_letter_key(&self) -> &str {
        &self.dead_letter_key
    }

    fn lock(
        slot: &Mutex<Option<ConnectionManager>>,
    ) -> MutexGuard<'_, Option<ConnectionManager>> {
        slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clone of the command connection (ConnectionManager is a cheap handle)
    fn commands(&self) -> Result<ConnectionManager> {
        Self::lock(&self.commands)
            .clone()
            .ok_or_else(|| AppError::QueueUnavailable("queue client closed".to_string()))
    }

    fn blocking(&self) -> Result<ConnectionManager> {
        Self::lock(&self.blocking).clone().ok_or(AppError::QueueClosed)
    }

    /// Run a blocking command until it yields or the client is closed.
    ///
    /// A BLMOVE dropped here may still complete server-side; the entry then
    /// sits in the processing list until the next recovery.
    async fn until_closed<F>(&self, command: F) -> Result<Option<String>>
    where
        F: std::future::Future<Output = redis::RedisResult<Option<String>>>,
    {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(AppError::QueueClosed);
        }

        tokio::select! {
            result = command => {
                match result {
                    Ok(value) => Ok(value),
                    Err(_) if *self.closed.borrow() => Err(AppError::QueueClosed),
                    Err(e) => Err(map_redis_error(e)),
                }
            }
            _ = closed.wait_for(|closed| *closed) => Err(AppError::QueueClosed),
        }
    }
}

#[async_trait]
impl SignalQueue for RedisSignalQueue {
    #[instrument(skip(self, entry), fields(channel = %self.channel))]
    async fn push(&self, entry: &QueueEntry) -> Result<()> {
        let mut conn = self.commands()?;
        let _: () = conn
            .rpush(self.channel.name(), entry.as_str())
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn pop_blocking(&self) -> Result<QueueEntry> {
        loop {
            let mut conn = self.blocking()?;
            let key = self.channel.name().to_string();
            let popped = self
                .until_closed(async move {
                    let reply: Option<(String, String)> = conn.blpop(&key, BLOCK_FOREVER).await?;
                    Ok::<_, redis::RedisError>(reply.map(|(_, value)| value))
                })
                .await?;

            if let Some(raw) = popped {
                return Ok(QueueEntry::new(raw));
            }
            // Nil reply only on a server-side timeout; wait again
            debug!(channel = %self.channel, "BLPOP returned nil, waiting again");
        }
    }

    async fn reserve_blocking(&self) -> Result<QueueEntry> {
        loop {
            let mut conn = self.blocking()?;
            let source = self.channel.name().to_string();
            let destination = self.processing_key.clone();
            let reserved = self
                .until_closed(async move {
                    conn.blmove::<_, _, Option<String>>(
                        &source,
                        &destination,
                        Direction::Left,
                        Direction::Right,
                        BLOCK_FOREVER,
                    )
                    .await
                })
                .await?;

            if let Some(raw) = reserved {
                return Ok(QueueEntry::new(raw));
            }
            debug!(channel = %self.channel, "BLMOVE returned nil, waiting again");
        }
    }

    async fn ack(&self, entry: &QueueEntry) -> Result<()> {
        let mut conn = self.commands()?;
        let removed: i64 = conn
            .lrem(&self.processing_key, 1, entry.as_str())
            .await
            .map_err(map_redis_error)?;
        if removed == 0 {
            warn!(key = %self.processing_key, "Acked entry was not in the processing list");
        }
        Ok(())
    }

    async fn requeue(&self, entry: &QueueEntry) -> Result<()> {
        let mut conn = self.commands()?;
        let _: () = redis::pipe()
            .atomic()
            .lrem(&self.processing_key, 1, entry.as_str())
            .ignore()
            .lpush(self.channel.name(), entry.as_str())
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn dead_letter(&self, letter: &DeadLetter) -> Result<()> {
        let raw = serde_json::to_string(letter)?;
        let mut conn = self.commands()?;
        let _: () = redis::pipe()
            .atomic()
            .lrem(&self.processing_key, 1, &letter.entry)
            .ignore()
            .rpush(&self.dead_letter_key, raw)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn recover_in_flight(&self) -> Result<usize> {
        let mut conn = self.commands()?;
        let mut moved = 0usize;
        // Newest first onto the head, so the oldest ends up in front
        loop {
            let entry: Option<String> = conn
                .lmove(
                    &self.processing_key,
                    self.channel.name(),
                    Direction::Right,
                    Direction::Left,
                )
                .await
                .map_err(map_redis_error)?;
            match entry {
                Some(_) => moved += 1,
                None => break,
            }
        }
        Ok(moved)
    }

    async fn len(&self) -> Result<usize> {
        let mut conn = self.commands()?;
        conn.llen(self.channel.name()).await.map_err(map_redis_error)
    }

    async fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        Self::lock(&self.blocking).take();
        Self::lock(&self.commands).take();
        info!(channel = %self.channel, "Queue client closed");
    }
}
