use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A successfully compiled file known to this process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Location of the compiled code
    pub code_path: PathBuf,

    /// Location of the source map; the file may not exist
    pub source_map_path: PathBuf,

    /// Runtime-visible module identifier, when the loader supplied one
    #[serde(default)]
    pub module_url: Option<String>,
}

impl CacheEntry {
    pub fn new(code_path: PathBuf, source_map_path: PathBuf, module_url: Option<String>) -> Self {
        Self {
            code_path,
            source_map_path,
            module_url,
        }
    }

    /// Key under which this entry's source map is registered
    pub fn source_map_key(&self, file_path: &Path) -> String {
        match self.module_url {
            Some(ref url) => url.clone(),
            None => crate::sourcemap::file_key(file_path),
        }
    }
}
