//! Queue consumer task: drains a provider's queue directory and dispatches
//! each entry through the idempotency gate.
//!
//! One consumer runs per provider directory. Multiple consumers on the same
//! directory are safe for correctness (the event store suppresses duplicate
//! effects) but not deployed, since the claim marker is not an atomic lease.

use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::queue::{
    self, QueuedEntry, cleanup_acked_entries, cleanup_interrupted_processing, count_pending,
    drain_pending, mark_acked, mark_processing,
};
use crate::store::EventStore;
use crate::types::Provider;

use super::{InboundEvent, Outcome, ProcessorRegistry, process_event};

/// Default interval between queue scans.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Default grace period before acked entries are removed (1 hour).
const DEFAULT_ACK_GRACE_SECS: u64 = 3600;

/// Tuning for a consumer's drain loop.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Interval between scans of the queue directory.
    pub poll_interval: Duration,

    /// How long acked entries are kept before removal. Long enough that an
    /// operator can inspect recently processed entries.
    pub ack_grace: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        ConsumerConfig {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            ack_grace: Duration::from_secs(DEFAULT_ACK_GRACE_SECS),
        }
    }
}

/// Drains one provider's queue directory.
pub struct QueueConsumer {
    provider: Provider,
    queue_dir: PathBuf,
    store: EventStore,
    registry: ProcessorRegistry,
    config: ConsumerConfig,
}

impl QueueConsumer {
    pub fn new(
        provider: Provider,
        queue_dir: impl Into<PathBuf>,
        store: EventStore,
        registry: ProcessorRegistry,
        config: ConsumerConfig,
    ) -> Self {
        QueueConsumer {
            provider,
            queue_dir: queue_dir.into(),
            store,
            registry,
            config,
        }
    }

    /// Re-pends entries orphaned by a crash.
    ///
    /// Must be called before [`run`](Self::run), and never while a consumer
    /// on the same directory is active.
    pub fn recover(&self) -> queue::Result<()> {
        cleanup_interrupted_processing(&self.queue_dir)
    }

    /// Runs the drain loop until the token is cancelled.
    #[instrument(skip(self, shutdown), fields(provider = %self.provider))]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(queue_dir = %self.queue_dir.display(), "consumer started");

        match count_pending(&self.queue_dir) {
            Ok(0) => {}
            Ok(n) => info!(pending = n, "processing startup backlog"),
            Err(e) => warn!(error = %e, "failed to count pending entries"),
        }

        let mut interval = tokio::time::interval(self.config.poll_interval);
        // A slow drain pass should not cause a burst of immediate re-ticks.
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown signal received, stopping consumer");
                    break;
                }

                _ = interval.tick() => {
                    match self.drain_once().await {
                        Ok(0) => {}
                        Ok(n) => debug!(processed = n, "drain pass complete"),
                        Err(e) => error!(error = %e, "drain pass failed"),
                    }

                    match cleanup_acked_entries(&self.queue_dir, self.config.ack_grace) {
                        Ok(0) => {}
                        Ok(n) => debug!(removed = n, "removed acked entries"),
                        Err(e) => warn!(error = %e, "acked-entry cleanup failed"),
                    }
                }
            }
        }

        info!("consumer stopped");
    }

    /// Processes every currently pending entry once.
    ///
    /// Per entry: claim, dispatch, ack. An entry whose dispatch fails stays
    /// claimed; startup recovery re-pends it, so the retry cadence for
    /// persistent failures is one attempt per process lifetime rather than a
    /// hot retry loop against a failing downstream.
    pub async fn drain_once(&self) -> queue::Result<usize> {
        let pending = drain_pending(&self.queue_dir)?;
        let mut processed = 0;

        for entry in pending {
            if self.process_entry(&entry).await {
                processed += 1;
            }
        }

        Ok(processed)
    }

    /// Handles one entry. Returns whether it was acked.
    async fn process_entry(&self, entry: &QueuedEntry) -> bool {
        if let Err(e) = mark_processing(entry) {
            error!(entry_id = %entry.entry_id, error = %e, "failed to claim entry");
            return false;
        }

        let message = match entry.read_message() {
            Ok(m) => m,
            Err(e) => {
                // Unreadable envelope: nothing to retry. Ack it out of the
                // way rather than wedging the queue on a corrupt file.
                error!(entry_id = %entry.entry_id, error = %e, "corrupt queue entry, discarding");
                if let Err(e) = mark_acked(entry) {
                    error!(entry_id = %entry.entry_id, error = %e, "failed to ack corrupt entry");
                }
                return false;
            }
        };

        let event = InboundEvent::from_message(&message);

        match process_event(&self.store, &self.registry, &event).await {
            Ok(outcome) => {
                if outcome == Outcome::Duplicate {
                    debug!(
                        entry_id = %entry.entry_id,
                        event_id = %event.event_id,
                        "duplicate delivery acked without effect"
                    );
                }
                if let Err(e) = mark_acked(entry) {
                    // The effect is recorded in the store, so redelivery of
                    // this entry after restart is suppressed there.
                    error!(entry_id = %entry.entry_id, error = %e, "failed to ack entry");
                    return false;
                }
                true
            }
            Err(e) => {
                warn!(
                    entry_id = %entry.entry_id,
                    event_id = %event.event_id,
                    error = %e,
                    "processing failed, entry left claimed for restart retry"
                );
                false
            }
        }
    }
}
