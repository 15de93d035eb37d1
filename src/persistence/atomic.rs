//! Durable file primitives used by the session store.
//!
//! - [`write_json_atomic`]: write-to-temp, fsync, rename, fsync directory.
//!   Readers see either the old or the new record, never a partial write.
//! - [`create_exclusive`]: atomic create-if-absent, the basis of advisory locks.
//!
//! Creating, renaming or deleting a file changes the directory entry, so the
//! parent directory is fsynced too; otherwise the change may not survive a
//! power loss even though the file contents did.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Syncs a directory so that entry creation, rename and removal are durable.
pub fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}

/// Serializes `value` as pretty JSON and atomically replaces `path` with it.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), AtomicWriteError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(value)?;

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }

    std::fs::rename(&tmp_path, path)?;

    if let Some(parent) = path.parent() {
        fsync_dir(parent)?;
    }

    Ok(())
}

/// Reads and deserializes a JSON file. Returns `None` if it does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, AtomicWriteError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Creates `path` only if it does not already exist, writing `contents`.
///
/// Returns `Ok(false)` if the file already exists. The existence check and the
/// creation are one `open(O_CREAT | O_EXCL)` call, so two callers cannot both
/// succeed.
pub fn create_exclusive(path: &Path, contents: &[u8]) -> io::Result<bool> {
    let mut file: File = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(e),
    };
    file.write_all(contents)?;
    file.sync_all()?;
    if let Some(parent) = path.parent() {
        fsync_dir(parent)?;
    }
    Ok(true)
}

/// Removes `path`, treating "already gone" as success.
///
/// Returns whether a file was actually removed.
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            if let Some(parent) = path.parent() {
                fsync_dir(parent)?;
            }
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Errors from [`write_json_atomic`] and [`read_json`].
#[derive(Debug, thiserror::Error)]
pub enum AtomicWriteError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
