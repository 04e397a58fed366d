use serde::Serialize;
use std::path::Path;

use crate::error::{CacheError, Result};

/// Compute the content hash of a source file as it will be transformed
///
/// The file path takes part in the digest because transformers may emit
/// path-dependent output (module ids, source map `sources`). `salt` carries
/// anything else that changes the output, typically [`hash_config`] of the
/// transformer options.
pub fn hash_source(file_path: &Path, content: &[u8], salt: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(salt.as_bytes());
    hasher.update(&[0]);
    hasher.update(file_path.to_string_lossy().as_bytes());
    hasher.update(&[0]);
    hasher.update(content);
    hasher.finalize().to_hex().to_string()
}

/// Read `path` and compute its [`hash_source`] digest
pub fn hash_file(path: &Path, salt: &str) -> Result<String> {
    let content = std::fs::read(path).map_err(|e| CacheError::io(e, path, "read"))?;
    Ok(hash_source(path, &content, salt))
}

/// Hash transformer configuration so that option changes produce new cache keys
pub fn hash_config<T: Serialize>(config: &T) -> Result<String> {
    // Serialize config to JSON for stable hashing
    let json = serde_json::to_string(config)?;
    Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
}
