//! Retention sweeper for the processed-event store.
//!
//! Storage hygiene only: removes processed-event records past the retention
//! window so the dedup store does not grow forever. Losing a record past the
//! window re-opens a redelivery to processing, which is why the window is
//! much longer than any provider's retry horizon.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::store::{CLEANUP_BATCH_SIZE, EventStore, Result};

/// How long processed-event records are retained (7 days).
pub const RETENTION_WINDOW: chrono::Duration = chrono::Duration::days(7);

/// Default interval between sweep runs (6 hours).
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 6 * 3600;

/// Tuning for the sweep schedule.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Interval between sweeps.
    pub sweep_interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        SweeperConfig {
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

/// Runs one full sweep, deleting all records older than the retention window.
///
/// Loops `cleanup_older_than` in batches until a batch comes back short,
/// which means the store has no more eligible records. A record exactly at
/// the window boundary is kept.
pub fn run_sweep(store: &EventStore) -> Result<usize> {
    let cutoff = Utc::now() - RETENTION_WINDOW;
    let mut total = 0;

    loop {
        let removed = store.cleanup_older_than(cutoff, CLEANUP_BATCH_SIZE)?;
        total += removed;

        if removed < CLEANUP_BATCH_SIZE {
            break;
        }
    }

    Ok(total)
}

/// Runs sweeps on a schedule until the token is cancelled.
///
/// A failed sweep is logged and retried at the next tick, never escalated;
/// stale dedup records are harmless beyond the disk they occupy.
#[instrument(skip_all)]
pub async fn run(store: EventStore, config: SweeperConfig, shutdown: CancellationToken) {
    info!(interval_secs = config.sweep_interval.as_secs(), "sweeper started");

    let mut interval = tokio::time::interval(config.sweep_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("shutdown signal received, stopping sweeper");
                break;
            }

            _ = interval.tick() => {
                match run_sweep(&store) {
                    Ok(0) => debug!("sweep complete, nothing to remove"),
                    Ok(n) => info!(removed = n, "sweep complete"),
                    Err(e) => warn!(error = %e, "sweep failed, will retry next run"),
                }
            }
        }
    }
}
