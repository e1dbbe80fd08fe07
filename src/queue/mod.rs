//! Durable at-least-once webhook queue.
//!
//! Entries live as files under a per-provider subdirectory of the queue root
//! (`<root>/stripe/`, `<root>/google_calendar/`). The queue guarantees that
//! an entry acknowledged as enqueued survives a crash; it deliberately does
//! NOT deduplicate — redeliveries become distinct entries, and the
//! processed-event store suppresses their side effects at processing time.

pub mod drain;
pub mod message;
pub mod spool;

use std::path::PathBuf;

pub use drain::{cleanup_acked_entries, cleanup_interrupted_processing, count_pending, drain_pending};
pub use message::QueuedWebhookMessage;
pub use spool::{QueueError, QueuedEntry, Result, enqueue, mark_acked, mark_processing, remove_entry};

use crate::types::Provider;

/// Handle to the queue root, cheap to clone.
///
/// Intake handlers enqueue through this; consumers resolve their provider's
/// directory from it and use the free functions in [`drain`] and [`spool`].
#[derive(Debug, Clone)]
pub struct WebhookQueue {
    root: PathBuf,
}

impl WebhookQueue {
    /// Creates a queue handle rooted at `root`. Directories are created
    /// lazily on first enqueue.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        WebhookQueue { root: root.into() }
    }

    /// The directory holding a provider's entries.
    pub fn provider_dir(&self, provider: Provider) -> PathBuf {
        self.root.join(provider.as_str())
    }

    /// Durably enqueues a message into its provider's directory.
    pub fn enqueue(&self, message: &QueuedWebhookMessage) -> Result<QueuedEntry> {
        spool::enqueue(&self.provider_dir(message.provider), message)
    }
}
