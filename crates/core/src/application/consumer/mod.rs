// Consumer - consume, decode, persist loop

pub mod constants;
mod shutdown;

use constants::DEFAULT_BACKOFF;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::recovery::RecoveryService;
use crate::domain::{DeadLetter, DeliveryPolicy, DocumentId, QueueChannel, QueueEntry};
use crate::error::{AppError, Result};
use crate::port::time_provider::SystemTimeProvider;
use crate::port::{DocumentStore, SignalQueue, TimeProvider};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Consumer loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    /// Blocked on the queue; the only suspension point of the loop
    Waiting,
    Processing,
    /// Controlled stop (shutdown signal or queue closed)
    Stopped,
    /// Setup failed; the loop never started
    Faulted,
}

/// What happened to one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Persisted(DocumentId),
    /// Malformed entry moved to the dead-letter list
    DeadLettered,
    /// Malformed entry dropped because dead-lettering failed too
    Discarded,
    /// Insert failed; entry is back at the channel head
    Requeued,
    /// Insert failed after the entry was already popped
    Lost,
    /// Insert and requeue both failed; the entry stays reserved and is
    /// reclaimed before the next reservation
    Stranded,
}

impl Outcome {
    fn needs_backoff(&self) -> bool {
        matches!(self, Outcome::Requeued | Outcome::Lost | Outcome::Stranded)
    }
}

/// Counters returned when the loop stops
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConsumerStats {
    pub persisted: u64,
    pub malformed: u64,
    pub requeued: u64,
    pub lost: u64,
    pub stranded: u64,
    pub queue_errors: u64,
}

impl ConsumerStats {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Persisted(_) => self.persisted += 1,
            Outcome::DeadLettered | Outcome::Discarded => self.malformed += 1,
            Outcome::Requeued => self.requeued += 1,
            Outcome::Lost => self.lost += 1,
            Outcome::Stranded => self.stranded += 1,
        }
    }
}

/// Consumer moves entries from the channel into the document store
pub struct Consumer {
    channel: QueueChannel,
    queue: Arc<dyn SignalQueue>,
    store: Arc<dyn DocumentStore>,
    policy: DeliveryPolicy,
    backoff: Duration,
    time_provider: Arc<dyn TimeProvider>,
    state: watch::Sender<ConsumerState>,
    /// Set while this consumer's processing list holds an entry it failed to requeue
    stranded: AtomicBool,
}

impl Consumer {
    pub fn new(
        channel: QueueChannel,
        queue: Arc<dyn SignalQueue>,
        store: Arc<dyn DocumentStore>,
        policy: DeliveryPolicy,
    ) -> Self {
        let (state, _) = watch::channel(ConsumerState::Idle);
        Self {
            channel,
            queue,
            store,
            policy,
            backoff: DEFAULT_BACKOFF,
            time_provider: Arc::new(SystemTimeProvider),
            state,
            stranded: AtomicBool::new(false),
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = time_provider;
        self
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    /// Run until shutdown is signalled or the queue is closed.
    ///
    /// Persistence failures and queue errors are logged and followed by one
    /// backoff pause; they never end the loop. Only a setup failure does
    /// (state `Faulted`).
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<ConsumerStats> {
        info!(
            channel = %self.channel,
            policy = %self.policy,
            "Consumer started. Listening for signals..."
        );

        if let Err(e) = self.prepare().await {
            self.set_state(ConsumerState::Faulted);
            error!(channel = %self.channel, error = %e, "Consumer setup failed");
            return Err(e);
        }

        let mut stats = ConsumerStats::default();
        loop {
            if shutdown.is_shutdown() {
                info!(channel = %self.channel, "Consumer shutting down");
                break;
            }

            self.set_state(ConsumerState::Waiting);
            let next = tokio::select! {
                next = self.next_entry() => next,
                _ = shutdown.wait() => {
                    info!("Consumer interrupted while waiting");
                    break;
                }
            };

            match next {
                Ok(entry) => {
                    let outcome = self.handle_entry(entry).await;
                    stats.record(&outcome);
                    self.set_state(ConsumerState::Idle);
                    if outcome.needs_backoff() && !self.pause(&mut shutdown).await {
                        break;
                    }
                }
                Err(e) if e.is_queue_closed() => {
                    info!(channel = %self.channel, "Queue closed, consumer stopping");
                    break;
                }
                Err(e) => {
                    stats.queue_errors += 1;
                    self.set_state(ConsumerState::Idle);
                    error!(
                        channel = %self.channel,
                        error = %e,
                        "Consumer error while waiting for entries"
                    );
                    if !self.pause(&mut shutdown).await {
                        break;
                    }
                }
            }
        }

        self.set_state(ConsumerState::Stopped);
        info!(
            channel = %self.channel,
            persisted = stats.persisted,
            malformed = stats.malformed,
            requeued = stats.requeued,
            lost = stats.lost,
            stranded = stats.stranded,
            queue_errors = stats.queue_errors,
            "Consumer stopped"
        );
        Ok(stats)
    }

    /// One iteration: wait for the next entry and process it
    pub async fn process_next(&self) -> Result<Outcome> {
        self.set_state(ConsumerState::Waiting);
        let entry = match self.next_entry().await {
            Ok(entry) => entry,
            Err(e) => {
                self.set_state(ConsumerState::Idle);
                return Err(e);
            }
        };
        let outcome = self.handle_entry(entry).await;
        self.set_state(ConsumerState::Idle);
        Ok(outcome)
    }

    async fn prepare(&self) -> Result<()> {
        if self.policy == DeliveryPolicy::AtLeastOnce {
            RecoveryService::new(Arc::clone(&self.queue), self.channel.clone())
                .recover_in_flight()
                .await?;
        }
        Ok(())
    }

    async fn next_entry(&self) -> Result<QueueEntry> {
        match self.policy {
            DeliveryPolicy::AtMostOnce => self.queue.pop_blocking().await,
            DeliveryPolicy::AtLeastOnce => {
                self.reclaim_stranded().await?;
                self.queue.reserve_blocking().await
            }
        }
    }

    /// Move an entry left behind by a failed requeue back to the channel head.
    /// The flag stays set until the move succeeds.
    async fn reclaim_stranded(&self) -> Result<()> {
        if !self.stranded.load(Ordering::SeqCst) {
            return Ok(());
        }
        let moved = self.queue.recover_in_flight().await?;
        self.stranded.store(false, Ordering::SeqCst);
        info!(channel = %self.channel, moved, "Reclaimed stranded entries");
        Ok(())
    }

    async fn handle_entry(&self, entry: QueueEntry) -> Outcome {
        self.set_state(ConsumerState::Processing);

        let payload = match entry.decode() {
            Ok(payload) => payload,
            Err(e) => {
                let err = AppError::MalformedEntry(e.to_string());
                return self.set_aside(&entry, err).await;
            }
        };

        match self.store.insert(&payload).await {
            Ok(id) => {
                if self.policy == DeliveryPolicy::AtLeastOnce {
                    if let Err(e) = self.queue.ack(&entry).await {
                        // Stays in the processing list; recovery delivers it again
                        warn!(
                            document_id = %id,
                            error = %e,
                            "Persisted but could not acknowledge reservation"
                        );
                    }
                }
                info!(channel = %self.channel, document_id = %id, "Saved signal");
                Outcome::Persisted(id)
            }
            Err(e) => self.on_persistence_failure(&entry, e).await,
        }
    }

    /// Malformed entries are never retried
    async fn set_aside(&self, entry: &QueueEntry, err: AppError) -> Outcome {
        warn!(
            channel = %self.channel,
            error = %err,
            entry_len = entry.as_str().len(),
            "Dropping malformed entry to dead-letter list"
        );

        let letter = DeadLetter::new(entry, err.to_string(), self.time_provider.now_millis());
        match self.queue.dead_letter(&letter).await {
            Ok(()) => Outcome::DeadLettered,
            Err(e) => {
                error!(
                    channel = %self.channel,
                    error = %e,
                    entry = %entry.as_str(),
                    "Dead-lettering failed, malformed entry discarded"
                );
                Outcome::Discarded
            }
        }
    }

    async fn on_persistence_failure(&self, entry: &QueueEntry, err: AppError) -> Outcome {
        match self.policy {
            DeliveryPolicy::AtMostOnce => {
                error!(
                    channel = %self.channel,
                    error = %err,
                    entry = %entry.as_str(),
                    "Insert failed after pop, payload lost"
                );
                Outcome::Lost
            }
            DeliveryPolicy::AtLeastOnce => {
                if let Err(e) = self.queue.requeue(entry).await {
                    self.stranded.store(true, Ordering::SeqCst);
                    error!(
                        channel = %self.channel,
                        error = %e,
                        insert_error = %err,
                        "Insert failed and requeue failed; entry reclaimed before next reservation"
                    );
                    return Outcome::Stranded;
                }
                warn!(
                    channel = %self.channel,
                    error = %err,
                    backoff_ms = self.backoff.as_millis() as u64,
                    "Insert failed, entry returned to channel head"
                );
                Outcome::Requeued
            }
        }
    }

    /// Backoff pause; false if shutdown arrived first
    async fn pause(&self, shutdown: &mut ShutdownToken) -> bool {
        tokio::select! {
            _ = sleep(self.backoff) => true,
            _ = shutdown.wait() => {
                info!("Consumer interrupted during backoff");
                false
            }
        }
    }

    fn set_state(&self, state: ConsumerState) {
        self.state.send_replace(state);
    }
}
