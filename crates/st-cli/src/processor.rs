//! Upload queue processor.
//!
//! A single loop owns the retry state and drains the queue one record at a
//! time, so there is never more than one delivery in flight. Each tick
//! looks at the oldest record:
//!
//! - unreadable records are dropped,
//! - delivered records are deleted,
//! - failed deliveries stay queued and the next tick is pushed back by a
//!   jittered exponential backoff.
//!
//! The attempt counter follows the head of the queue and starts over
//! whenever the head changes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use st_core::BackoffPolicy;
use st_net::Deliver;
use st_store::{QueueId, Storage, StoreError, UploadQueue};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::blocking;

const PURGE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Settings for the upload processor.
#[derive(Debug, Clone, Copy)]
pub struct ProcessorSettings {
    pub tick: Duration,
    pub purge_interval: Duration,
    pub retention_days: u32,
    pub backoff: BackoffPolicy,
}

impl From<&crate::Config> for ProcessorSettings {
    fn from(config: &crate::Config) -> Self {
        Self {
            tick: config.queue_tick(),
            purge_interval: PURGE_INTERVAL,
            retention_days: config.queue_retention_days,
            backoff: BackoffPolicy::delivery(),
        }
    }
}

/// Result of one processing tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing queued.
    Idle,
    /// The head record was delivered and deleted.
    Delivered(QueueId),
    /// The head record was unreadable and has been dropped.
    Dropped(QueueId),
    /// Delivery failed; try again after `delay`.
    Retry {
        id: QueueId,
        attempt: u32,
        delay: Duration,
    },
    /// The queue itself could not be read.
    Failed,
}

#[derive(Debug, Default)]
struct RetryState {
    current: Option<QueueId>,
    attempts: u32,
}

impl RetryState {
    fn reset(&mut self) {
        self.current = None;
        self.attempts = 0;
    }
}

/// Totals from draining the queue once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub delivered: usize,
    pub dropped: usize,
    pub remaining: usize,
}

/// Single-flight delivery loop over the upload queue.
pub struct UploadProcessor<D> {
    storage: Arc<Storage>,
    delivery: D,
    settings: ProcessorSettings,
    retry: RetryState,
}

impl<D: Deliver> UploadProcessor<D> {
    pub fn new(storage: Arc<Storage>, delivery: D, settings: ProcessorSettings) -> Self {
        Self {
            storage,
            delivery,
            settings,
            retry: RetryState::default(),
        }
    }

    /// Attempts the oldest queued record once.
    pub async fn process_next(&mut self) -> TickOutcome {
        let head = match self.on_queue(UploadQueue::peek_oldest).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                self.retry.reset();
                return TickOutcome::Idle;
            }
            Err(err) => {
                tracing::error!(error = format!("{err:#}"), "failed to list upload queue");
                return TickOutcome::Failed;
            }
        };

        if self.retry.current.as_ref() != Some(&head) {
            self.retry = RetryState {
                current: Some(head.clone()),
                attempts: 0,
            };
        }

        let id = head.clone();
        let record = match self.on_queue(move |queue| Ok(queue.read(&id))).await {
            Ok(record) => record,
            Err(err) => {
                tracing::error!(id = %head, error = format!("{err:#}"), "failed to read upload");
                return TickOutcome::Failed;
            }
        };
        let Some(record) = record else {
            tracing::warn!(id = %head, "dropping unreadable upload");
            if let Err(err) = self.delete(&head).await {
                tracing::error!(id = %head, error = format!("{err:#}"), "failed to drop unreadable upload");
            }
            self.retry.reset();
            return TickOutcome::Dropped(head);
        };

        if self.delivery.deliver(&record).await {
            // A failed delete means the record is delivered again later.
            if let Err(err) = self.delete(&head).await {
                tracing::error!(id = %head, error = format!("{err:#}"), "failed to delete delivered upload");
            }
            self.retry.reset();
            return TickOutcome::Delivered(head);
        }

        self.retry.attempts = self.retry.attempts.saturating_add(1);
        let attempt = self.retry.attempts;
        let delay = self.settings.backoff.delay(attempt);
        tracing::warn!(
            id = %head,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "upload failed, backing off"
        );
        TickOutcome::Retry {
            id: head,
            attempt,
            delay,
        }
    }

    /// Deletes records past the retention period.
    pub async fn purge(&self) {
        let retention_days = self.settings.retention_days;
        match self
            .on_queue(move |queue| queue.purge_older_than(retention_days, Utc::now()))
            .await
        {
            Ok(0) => tracing::debug!("no expired uploads"),
            Ok(purged) => tracing::info!(purged, "purged expired uploads"),
            Err(err) => tracing::warn!(error = format!("{err:#}"), "failed to purge upload queue"),
        }
    }

    /// Drains the queue until it is empty or a delivery fails.
    pub async fn flush(&mut self) -> FlushReport {
        let mut report = FlushReport::default();
        loop {
            match self.process_next().await {
                TickOutcome::Delivered(_) => report.delivered += 1,
                TickOutcome::Dropped(_) => report.dropped += 1,
                TickOutcome::Idle | TickOutcome::Retry { .. } | TickOutcome::Failed => break,
            }
        }
        report.remaining = self.pending_count().await;
        report
    }

    async fn pending_count(&self) -> usize {
        self.on_queue(|queue| Ok(queue.pending_count()))
            .await
            .unwrap_or_default()
    }

    async fn delete(&self, id: &QueueId) -> Result<()> {
        let id = id.clone();
        self.on_queue(move |queue| queue.delete(&id)).await
    }

    async fn on_queue<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&UploadQueue) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        blocking::run(move || op(storage.queue())).await
    }

    /// Runs until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut purge = tokio::time::interval(self.settings.purge_interval);
        purge.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let next_attempt = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(next_attempt);

        let pending = self.pending_count().await;
        tracing::info!(pending, "upload processor started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("upload processor shutting down");
                    break;
                }
                _ = purge.tick() => self.purge().await,
                () = &mut next_attempt => {
                    let delay = match self.process_next().await {
                        TickOutcome::Retry { delay, .. } => delay,
                        _ => self.settings.tick,
                    };
                    next_attempt.as_mut().reset(Instant::now() + delay);
                }
            }
        }
    }
}
