//! Durable record of every event already processed.
//!
//! One JSON file per record, named by the (sanitized) idempotency key.
//! Presence of a record is the idempotency guarantee: the processor checks
//! `exists` before running any business effect and writes the record only
//! after the effect succeeds. Records are purged by the retention sweeper
//! once `processed_at` falls outside the retention window.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::durable::{fsync_dir, write_atomic};
use crate::types::IdempotencyKey;

/// Maximum records removed by a single `cleanup_older_than` call.
pub const CLEANUP_BATCH_SIZE: usize = 500;

/// Errors from event store operations.
///
/// IO failures are retryable (the store directory may be on flaky storage);
/// callers must not assume success.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying storage unavailable or failing.
    #[error("storage error: {0}")]
    Io(#[from] io::Error),

    /// Record serialization/deserialization failed.
    #[error("record encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// Key contains characters unsafe for use as a filename.
    #[error("invalid idempotency key: contains unsafe characters: {0}")]
    InvalidKey(IdempotencyKey),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// A fully processed event.
///
/// Created exactly once, at the end of successful processing — never at
/// receipt. Never updated. Deleted only by the retention sweeper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedEvent {
    /// Provider-qualified idempotency key.
    pub id: IdempotencyKey,

    /// Provider or event-type tag (e.g., `invoice.paid`).
    #[serde(rename = "type")]
    pub event_type: String,

    /// Time the event finished processing (not receipt time).
    pub processed_at: DateTime<Utc>,
}

/// Validates that an idempotency key is safe to use as a filename.
///
/// Provider event ids are attacker-influenced, so keys containing path
/// separators, null bytes, or leading dots are rejected rather than written
/// to disk.
fn validate_key(key: &IdempotencyKey) -> Result<()> {
    let s = key.as_str();

    if s.is_empty()
        || s.contains('/')
        || s.contains('\\')
        || s.contains('\0')
        || s.starts_with('.')
    {
        return Err(StoreError::InvalidKey(key.clone()));
    }

    Ok(())
}

/// Handle to the processed-event store.
///
/// Cheap to clone; safe to share across intake handlers, consumers, and the
/// sweeper concurrently. No local locking: the filesystem's atomic rename is
/// the only synchronization, and a racing duplicate `create` is a harmless
/// overwrite with identical semantic content.
#[derive(Debug, Clone)]
pub struct EventStore {
    data_dir: PathBuf,
}

impl EventStore {
    /// Creates a store handle over the given data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        EventStore {
            data_dir: data_dir.into(),
        }
    }

    /// Returns the store's data directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn record_path(&self, key: &IdempotencyKey) -> PathBuf {
        self.data_dir.join(format!("{}.json", key.as_str()))
    }

    /// Point lookup: has this event already been processed?
    ///
    /// Only a definitive "no such record" maps to `false`. Any other IO
    /// failure propagates: answering `false` on a flaky store would send an
    /// already-processed event back through its business effect.
    pub fn exists(&self, key: &IdempotencyKey) -> Result<bool> {
        validate_key(key)?;

        match std::fs::metadata(self.record_path(key)) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the full record for a key, or `None` if absent.
    pub fn find(&self, key: &IdempotencyKey) -> Result<Option<ProcessedEvent>> {
        validate_key(key)?;

        let bytes = match std::fs::read(self.record_path(key)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Inserts a record, durably.
    ///
    /// If two callers race to insert the same key, the second write is an
    /// overwrite with identical semantic content; the key itself is the
    /// uniqueness guarantee.
    pub fn create(&self, event: &ProcessedEvent) -> Result<()> {
        validate_key(&event.id)?;
        std::fs::create_dir_all(&self.data_dir)?;

        let path = self.record_path(&event.id);
        let temp_path = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(event)?;

        write_atomic(&path, &temp_path, &bytes)?;
        Ok(())
    }

    /// Deletes records whose `processed_at` is strictly before `cutoff`.
    ///
    /// Removes at most `limit` records per invocation so a single call has
    /// bounded cost; returns the number removed. Callers loop until a call
    /// returns fewer than `limit`.
    ///
    /// A record with `processed_at` exactly equal to `cutoff` is kept.
    pub fn cleanup_older_than(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<usize> {
        let read_dir = match std::fs::read_dir(&self.data_dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;

        for entry in read_dir {
            if removed >= limit {
                break;
            }

            let entry = entry?;
            let path = entry.path();

            if path.extension().is_none_or(|e| e != "json") {
                continue;
            }

            // Unreadable or corrupt records are skipped, not deleted: the
            // sweeper is a hygiene job and must never destroy evidence.
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(_) => continue,
            };
            let record: ProcessedEvent = match serde_json::from_slice(&bytes) {
                Ok(record) => record,
                Err(_) => continue,
            };

            if record.processed_at < cutoff {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }

        if removed > 0 {
            fsync_dir(&self.data_dir)?;
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventId, Provider};
    use chrono::Duration;
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn key(id: &str) -> IdempotencyKey {
        IdempotencyKey::from_parts(Provider::Stripe, &EventId::new(id))
    }

    fn record(id: &str, processed_at: DateTime<Utc>) -> ProcessedEvent {
        ProcessedEvent {
            id: key(id),
            event_type: "invoice.paid".to_string(),
            processed_at,
        }
    }

    #[test]
    fn exists_is_false_for_unknown_key() {
        let dir = tempdir().unwrap();
        let store = EventStore::new(dir.path());
        assert!(!store.exists(&key("evt_unknown")).unwrap());
    }

    #[test]
    fn create_then_exists_and_find() {
        let dir = tempdir().unwrap();
        let store = EventStore::new(dir.path());

        let event = record("evt_123", Utc::now());
        store.create(&event).unwrap();

        assert!(store.exists(&event.id).unwrap());
        assert_eq!(store.find(&event.id).unwrap(), Some(event));
    }

    #[test]
    fn exists_propagates_storage_failure() {
        let dir = tempdir().unwrap();

        // A regular file where the data directory should be makes every
        // record lookup fail with something other than NotFound.
        let blocker = dir.path().join("not-a-directory");
        std::fs::write(&blocker, b"occupied").unwrap();

        let store = EventStore::new(blocker.join("events"));

        // An unreachable store must never report "not processed".
        assert!(matches!(
            store.exists(&key("evt_123")),
            Err(StoreError::Io(_))
        ));
        assert!(matches!(store.find(&key("evt_123")), Err(StoreError::Io(_))));
    }

    #[test]
    fn find_absent_returns_none() {
        let dir = tempdir().unwrap();
        let store = EventStore::new(dir.path());
        assert_eq!(store.find(&key("evt_absent")).unwrap(), None);
    }

    #[test]
    fn duplicate_create_is_harmless() {
        let dir = tempdir().unwrap();
        let store = EventStore::new(dir.path());

        let event = record("evt_dup", Utc::now());
        store.create(&event).unwrap();
        store.create(&event).unwrap();

        assert_eq!(store.find(&event.id).unwrap(), Some(event));
    }

    #[test]
    fn create_works_without_preexisting_directory() {
        let dir = tempdir().unwrap();
        let store = EventStore::new(dir.path().join("nested").join("events"));

        store.create(&record("evt_nested", Utc::now())).unwrap();
        assert!(store.exists(&key("evt_nested")).unwrap());
    }

    #[test]
    fn rejects_key_with_path_separator() {
        let dir = tempdir().unwrap();
        let store = EventStore::new(dir.path());

        let bad = IdempotencyKey::from("stripe:../../etc/passwd".to_string());
        assert!(matches!(
            store.exists(&bad),
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[test]
    fn rejects_key_with_null_byte() {
        let dir = tempdir().unwrap();
        let store = EventStore::new(dir.path());

        let bad = IdempotencyKey::from("stripe:evt\0123".to_string());
        assert!(matches!(store.find(&bad), Err(StoreError::InvalidKey(_))));
    }

    #[test]
    fn rejects_empty_and_dot_keys() {
        let dir = tempdir().unwrap();
        let store = EventStore::new(dir.path());

        for raw in ["", ".", "..", ".hidden"] {
            let bad = IdempotencyKey::from(raw.to_string());
            assert!(matches!(
                store.exists(&bad),
                Err(StoreError::InvalidKey(_))
            ));
        }
    }

    // ─── Retention boundary ───

    #[test]
    fn cleanup_keeps_record_exactly_at_cutoff() {
        let dir = tempdir().unwrap();
        let store = EventStore::new(dir.path());

        let cutoff = Utc::now() - Duration::days(7);
        store.create(&record("evt_boundary", cutoff)).unwrap();

        let removed = store.cleanup_older_than(cutoff, CLEANUP_BATCH_SIZE).unwrap();
        assert_eq!(removed, 0);
        assert!(store.exists(&key("evt_boundary")).unwrap());
    }

    #[test]
    fn cleanup_removes_record_one_second_past_cutoff() {
        let dir = tempdir().unwrap();
        let store = EventStore::new(dir.path());

        let cutoff = Utc::now() - Duration::days(7);
        store
            .create(&record("evt_expired", cutoff - Duration::seconds(1)))
            .unwrap();

        let removed = store.cleanup_older_than(cutoff, CLEANUP_BATCH_SIZE).unwrap();
        assert_eq!(removed, 1);
        assert!(!store.exists(&key("evt_expired")).unwrap());
    }

    #[test]
    fn cleanup_respects_batch_limit() {
        let dir = tempdir().unwrap();
        let store = EventStore::new(dir.path());

        let old = Utc::now() - Duration::days(30);
        for i in 0..7 {
            store.create(&record(&format!("evt_{}", i), old)).unwrap();
        }

        let cutoff = Utc::now() - Duration::days(7);
        let removed = store.cleanup_older_than(cutoff, 3).unwrap();
        assert_eq!(removed, 3);

        // Looping until exhaustion removes the rest.
        let removed = store.cleanup_older_than(cutoff, 3).unwrap();
        assert_eq!(removed, 3);
        let removed = store.cleanup_older_than(cutoff, 3).unwrap();
        assert_eq!(removed, 1);
        let removed = store.cleanup_older_than(cutoff, 3).unwrap();
        assert_eq!(removed, 0);
    }

    #[test]
    fn cleanup_on_missing_directory_is_zero() {
        let dir = tempdir().unwrap();
        let store = EventStore::new(dir.path().join("never-created"));
        let removed = store
            .cleanup_older_than(Utc::now(), CLEANUP_BATCH_SIZE)
            .unwrap();
        assert_eq!(removed, 0);
    }

    #[test]
    fn cleanup_skips_corrupt_records() {
        let dir = tempdir().unwrap();
        let store = EventStore::new(dir.path());

        std::fs::write(dir.path().join("corrupt.json"), b"not json").unwrap();
        store
            .create(&record("evt_old", Utc::now() - Duration::days(30)))
            .unwrap();

        let cutoff = Utc::now() - Duration::days(7);
        let removed = store.cleanup_older_than(cutoff, CLEANUP_BATCH_SIZE).unwrap();

        assert_eq!(removed, 1);
        // Corrupt file is left in place for inspection.
        assert!(dir.path().join("corrupt.json").exists());
    }

    #[test]
    fn record_serializes_type_field_name() {
        let event = record("evt_ser", Utc::now());
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"invoice.paid\""));
    }

    proptest! {
        /// Created records always round-trip through the store.
        #[test]
        fn prop_create_find_roundtrip(id in "[a-zA-Z0-9_-]{1,40}", event_type in "[a-z.]{1,30}") {
            let dir = tempdir().unwrap();
            let store = EventStore::new(dir.path());

            let event = ProcessedEvent {
                id: key(&id),
                event_type,
                processed_at: Utc::now(),
            };
            store.create(&event).unwrap();

            prop_assert!(store.exists(&event.id).unwrap());
            prop_assert_eq!(store.find(&event.id).unwrap(), Some(event));
        }

        /// Cleanup never removes records newer than the cutoff.
        #[test]
        fn prop_cleanup_spares_fresh_records(
            fresh_ids in prop::collection::hash_set("[a-z0-9]{6,12}", 1..5),
        ) {
            let dir = tempdir().unwrap();
            let store = EventStore::new(dir.path());

            for id in &fresh_ids {
                store.create(&record(id, Utc::now())).unwrap();
            }

            let cutoff = Utc::now() - Duration::days(7);
            let removed = store.cleanup_older_than(cutoff, CLEANUP_BATCH_SIZE).unwrap();
            prop_assert_eq!(removed, 0);

            for id in &fresh_ids {
                prop_assert!(store.exists(&key(id)).unwrap());
            }
        }
    }
}
