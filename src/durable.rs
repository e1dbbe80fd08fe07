//! Low-level durable write primitives.
//!
//! Both the event store and the queue persist one record per file using the
//! write-to-temp-then-rename pattern, with fsyncs on the file and on the
//! containing directory. On POSIX systems a rename updates the directory
//! entry; without the directory fsync that entry may not survive a power loss
//! even when the file contents were synced.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Syncs a file's contents and metadata to disk (`fsync(2)`).
pub fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Syncs a directory, making entry creations/renames/deletions durable.
pub fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}

/// Writes `bytes` to `path` atomically and durably.
///
/// Sequence: write to `temp_path`, fsync the temp file, rename over `path`,
/// fsync the containing directory. A crash at any point leaves either the old
/// state or the complete new file, never a torn write. Orphaned temp files
/// from a crash mid-write are ignored by readers (they never match the final
/// filename pattern).
pub fn write_atomic(path: &Path, temp_path: &Path, bytes: &[u8]) -> io::Result<()> {
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(temp_path)?;
        file.write_all(bytes)?;
        fsync_file(&file)?;
    }

    std::fs::rename(temp_path, path)?;

    if let Some(parent) = path.parent() {
        fsync_dir(parent)?;
    }

    Ok(())
}

/// Creates an empty marker file and makes it durable.
///
/// Idempotent: an existing marker is a no-op. The marker being empty means
/// any partial state is equivalent to complete, so no temp-rename dance is
/// needed here.
pub fn create_marker(path: &Path, dir: &Path) -> io::Result<()> {
    if path.exists() {
        return Ok(());
    }

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    drop(file);

    fsync_dir(dir)
}
