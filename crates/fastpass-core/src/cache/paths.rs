use std::path::{Path, PathBuf};

use crate::error::{CacheError, Result};

use super::{CODE_EXTENSION, SOURCE_MAP_EXTENSION};

/// On-disk locations of one cache entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPaths {
    /// Shard directory holding both files
    pub shard_dir: PathBuf,

    /// Compiled code file
    pub code_path: PathBuf,

    /// Source map file (may never be written)
    pub source_map_path: PathBuf,
}

/// Maps (file, content hash) to cache file locations under a root directory
///
/// Entries are sharded into `<root>/<hash[0..2]>/` to bound directory fan-out.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve the code and source map paths for `file_path` compiled at `hash`
    pub fn resolve(&self, file_path: &Path, hash: &str) -> Result<EntryPaths> {
        validate_hash(hash)?;

        let shard_dir = self.root.join(&hash[..2]);
        let stem = format!("{}_{}", sanitized_stem(file_path), hash);

        Ok(EntryPaths {
            code_path: shard_dir.join(format!("{stem}.{CODE_EXTENSION}")),
            source_map_path: shard_dir.join(format!("{stem}.{SOURCE_MAP_EXTENSION}")),
            shard_dir,
        })
    }
}

/// File name without its extension, keeping only word characters
fn sanitized_stem(file_path: &Path) -> String {
    file_path
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

fn validate_hash(hash: &str) -> Result<()> {
    let valid = hash.len() >= 2
        && hash
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidHash {
            hash: hash.to_string(),
        })
    }
}
