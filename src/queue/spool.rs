//! Crash-safe enqueue and per-entry state transitions.
//!
//! Each queue entry is one JSON file plus marker files tracking its state:
//!
//! - `<entry-id>.json` — the serialized [`QueuedWebhookMessage`]
//! - `<entry-id>.json.proc` — a consumer has claimed the entry
//! - `<entry-id>.json.done` — processing finished and its effects are durable
//!
//! Markers are only ever added (never flipped back) during normal operation;
//! the sole exception is startup crash recovery in [`super::drain`].

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::durable::{create_marker, fsync_dir, write_atomic};
use crate::types::EntryId;

use super::message::QueuedWebhookMessage;

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Entry ID contains path separators or other unsafe characters.
    #[error("invalid entry ID: contains unsafe characters: {0}")]
    InvalidEntryId(EntryId),
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Validates that an entry ID is safe to use in filenames.
///
/// IDs we mint are UUIDs and always pass; IDs reconstructed from directory
/// listings or handed in by tests go through the same gate. Rejected:
/// empty, path separators, null bytes, leading dot.
pub(super) fn validate_entry_id(entry_id: &EntryId) -> Result<()> {
    let id = entry_id.as_str();

    if id.is_empty()
        || id.contains('/')
        || id.contains('\\')
        || id.contains('\0')
        || id.starts_with('.')
    {
        return Err(QueueError::InvalidEntryId(entry_id.clone()));
    }

    Ok(())
}

/// A single entry in the queue directory.
///
/// State is derived entirely from which files exist, so a process restart
/// loses nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedEntry {
    /// Unique claim ticket for this enqueue. Distinct per enqueue even when
    /// the same provider event arrives twice.
    pub entry_id: EntryId,

    /// Path to the envelope file (`<entry-id>.json`).
    pub payload_path: PathBuf,

    /// Path to the queue directory this entry lives in.
    pub queue_dir: PathBuf,
}

impl QueuedEntry {
    /// Creates a `QueuedEntry` handle for a given entry ID.
    pub fn new(queue_dir: &Path, entry_id: EntryId) -> Self {
        let payload_path = queue_dir.join(format!("{}.json", entry_id.as_str()));
        QueuedEntry {
            entry_id,
            payload_path,
            queue_dir: queue_dir.to_path_buf(),
        }
    }

    /// Returns the path to the processing marker file.
    pub fn proc_marker_path(&self) -> PathBuf {
        self.payload_path.with_extension("json.proc")
    }

    /// Returns the path to the ack marker file.
    pub fn done_marker_path(&self) -> PathBuf {
        self.payload_path.with_extension("json.done")
    }

    /// Returns the path to the temp file used during atomic writes.
    pub fn temp_path(&self) -> PathBuf {
        self.payload_path.with_extension("json.tmp")
    }

    /// Entry awaits processing: envelope exists, not claimed, not acked.
    pub fn is_pending(&self) -> bool {
        self.payload_path.exists()
            && !self.proc_marker_path().exists()
            && !self.done_marker_path().exists()
    }

    /// Entry is claimed by a consumer but not yet acked.
    pub fn is_processing(&self) -> bool {
        self.proc_marker_path().exists() && !self.done_marker_path().exists()
    }

    /// Entry has been acked.
    pub fn is_acked(&self) -> bool {
        self.done_marker_path().exists()
    }

    /// Reads and deserializes the message envelope.
    pub fn read_message(&self) -> Result<QueuedWebhookMessage> {
        let bytes = std::fs::read(&self.payload_path)?;
        let message = serde_json::from_slice(&bytes)?;
        Ok(message)
    }
}

/// Enqueues a message durably, returning its freshly minted entry.
///
/// Every call produces a new entry with a unique entry ID, so redelivery of
/// the same provider event yields multiple entries; deduplication happens at
/// processing time against the processed-event store, never here.
///
/// Write sequence: serialize, write to `<entry-id>.json.tmp`, fsync, rename
/// to `<entry-id>.json`, fsync the directory. Once this returns `Ok`, the
/// entry survives a crash.
pub fn enqueue(queue_dir: &Path, message: &QueuedWebhookMessage) -> Result<QueuedEntry> {
    std::fs::create_dir_all(queue_dir)?;

    let entry = QueuedEntry::new(queue_dir, EntryId::generate());
    let bytes = serde_json::to_vec(message)?;

    write_atomic(&entry.payload_path, &entry.temp_path(), &bytes)?;

    Ok(entry)
}

/// Marks an entry as claimed by creating the `.proc` marker.
///
/// Idempotent. A claimed entry is skipped by subsequent drains until either
/// it is acked or startup recovery re-pends it.
pub fn mark_processing(entry: &QueuedEntry) -> Result<()> {
    validate_entry_id(&entry.entry_id)?;
    create_marker(&entry.proc_marker_path(), &entry.queue_dir)?;
    Ok(())
}

/// Marks an entry as acked by creating the `.done` marker.
///
/// Must only be called after the entry's effects (including the processed
/// event record) are durably persisted. Idempotent.
pub fn mark_acked(entry: &QueuedEntry) -> Result<()> {
    validate_entry_id(&entry.entry_id)?;
    create_marker(&entry.done_marker_path(), &entry.queue_dir)?;
    Ok(())
}

/// Removes an entry and all its marker files.
///
/// Called for acked entries past the retention grace period. Missing files
/// are fine; partial cleanup just finishes on a later pass.
pub fn remove_entry(entry: &QueuedEntry) -> Result<()> {
    let _ = std::fs::remove_file(entry.done_marker_path());
    let _ = std::fs::remove_file(entry.proc_marker_path());
    let _ = std::fs::remove_file(&entry.payload_path);
    let _ = std::fs::remove_file(entry.temp_path());

    fsync_dir(&entry.queue_dir)?;

    Ok(())
}
