//! Crash-safe writes and tolerant reads for cache artifacts.
//!
//! A write lands in a temporary file inside the destination directory and is
//! renamed over the final name, so concurrent readers either see no file or a
//! complete one. The temporary file is deleted when the guard drops on any
//! failure path.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{CacheError, Result};

/// Atomically replace `path` with `contents`
///
/// The parent directory must already exist.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        CacheError::io(
            std::io::Error::new(ErrorKind::InvalidInput, "path has no parent directory"),
            path,
            "create temp file",
        )
    })?;

    let mut tmp =
        NamedTempFile::new_in(dir).map_err(|e| CacheError::io(e, dir, "create temp file"))?;
    tmp.write_all(contents)
        .map_err(|e| CacheError::io(e, tmp.path(), "write"))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| CacheError::io(e, tmp.path(), "sync"))?;

    tmp.persist(path)
        .map_err(|e| CacheError::io(e.error, path, "rename"))?;

    debug!("Wrote {} bytes to {:?}", contents.len(), path);
    Ok(())
}

/// Create `dir` and its parents if missing
pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| CacheError::io(e, dir, "create directory"))
}

/// Read a UTF-8 artifact, returning `None` when it is missing or unreadable
pub fn read_to_string_opt(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) => {
            if e.kind() != ErrorKind::NotFound {
                debug!("Failed to read cache artifact {:?}: {}", path, e);
            }
            None
        }
    }
}
