//! Listing pending entries and recovering from crashes.

use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::durable::fsync_dir;
use crate::types::EntryId;

use super::spool::{QueuedEntry, Result, remove_entry};

/// Lists all pending entries in a queue directory.
///
/// Returns entries whose envelope exists with neither a `.proc` nor a `.done`
/// marker, sorted by entry ID for reproducible behavior. Claimed entries are
/// never returned, so this is safe to call while consumers are active;
/// orphaned claims from a crash are only re-pended by
/// [`cleanup_interrupted_processing`] at startup.
///
/// # Errors
///
/// Returns an error if the queue directory cannot be read. A missing
/// directory means no entries.
pub fn drain_pending(queue_dir: &Path) -> Result<Vec<QueuedEntry>> {
    if !queue_dir.exists() {
        return Ok(Vec::new());
    }

    let mut pending = Vec::new();

    for entry in std::fs::read_dir(queue_dir)? {
        let entry = entry?;
        let path = entry.path();

        // Only envelope files; .tmp/.proc/.done are never picked up directly.
        if path.extension().is_some_and(|e| e == "json")
            && let Some(entry_id) = extract_entry_id(&path)
        {
            let queued = QueuedEntry::new(queue_dir, entry_id);
            if queued.is_pending() {
                pending.push(queued);
            }
        }
    }

    pending.sort_by(|a, b| a.entry_id.as_str().cmp(b.entry_id.as_str()));

    Ok(pending)
}

/// Re-pends entries whose processing was interrupted by a crash.
///
/// A `.proc` marker without a `.done` marker means a consumer claimed the
/// entry and died before acking. Removing the `.proc` marker makes the entry
/// pending again, so it gets redelivered (at-least-once).
///
/// Must only be called at startup, before any consumer runs. While consumers
/// are active, a `.proc` without `.done` is live work, and removing the
/// marker would hand the same entry to a second consumer.
pub fn cleanup_interrupted_processing(queue_dir: &Path) -> Result<()> {
    if !queue_dir.exists() {
        return Ok(());
    }

    let mut removed_any = false;

    for entry in std::fs::read_dir(queue_dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.extension().is_some_and(|e| e == "proc") {
            let done_path = path.with_extension("done");
            if !done_path.exists() && std::fs::remove_file(&path).is_ok() {
                removed_any = true;
            }
        }
    }

    // Without this fsync a power loss could resurrect the deleted markers,
    // leaving the entries stuck claimed again.
    if removed_any {
        fsync_dir(queue_dir)?;
    }

    Ok(())
}

/// Returns the number of pending entries without loading any payloads.
pub fn count_pending(queue_dir: &Path) -> Result<usize> {
    if !queue_dir.exists() {
        return Ok(0);
    }

    let mut count = 0;

    for entry in std::fs::read_dir(queue_dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.extension().is_some_and(|e| e == "json")
            && let Some(entry_id) = extract_entry_id(&path)
        {
            let queued = QueuedEntry::new(queue_dir, entry_id);
            if queued.is_pending() {
                count += 1;
            }
        }
    }

    Ok(count)
}

/// Removes acked entries older than the grace period.
///
/// An entry is eligible when its `.done` marker exists and is older than
/// `grace_period`. Returns the number of entries removed. Called periodically
/// to keep the queue directory from growing without bound.
pub fn cleanup_acked_entries(queue_dir: &Path, grace_period: Duration) -> Result<usize> {
    if !queue_dir.exists() {
        return Ok(0);
    }

    // checked_sub guards against very large grace periods or clock skew; on
    // underflow nothing is old enough to remove.
    let cutoff = SystemTime::now()
        .checked_sub(grace_period)
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let mut removed = 0;

    for entry in std::fs::read_dir(queue_dir)? {
        let entry = entry?;
        let path = entry.path();

        // The path is <id>.json.done; strip both extensions to get <id>.
        if path.extension().is_some_and(|e| e == "done")
            && let Ok(metadata) = path.metadata()
            && let Ok(modified) = metadata.modified()
            && modified < cutoff
            && let Some(json_path) = path.file_stem()
            && let Some(entry_id) = Path::new(json_path).file_stem()
            && let Some(id_str) = entry_id.to_str()
        {
            let queued = QueuedEntry::new(queue_dir, EntryId::new(id_str));
            remove_entry(&queued)?;
            removed += 1;
        }
    }

    Ok(removed)
}

/// Extracts the entry ID from an envelope path (`<queue_dir>/<entry-id>.json`).
fn extract_entry_id(path: &Path) -> Option<EntryId> {
    let file_name = path.file_stem()?.to_str()?;
    Some(EntryId::new(file_name))
}
