//! Source map registry consulted when errors are rendered.
//!
//! Compiled entries register their source map file under the runtime module
//! identifier (or the original file path). Resolution is lazy and best
//! effort: an unregistered key, a deleted file or a malformed document all
//! resolve to `None` and the caller shows compiled-code coordinates instead.

use rustc_hash::FxBuildHasher;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

use crate::cache::atomic::read_to_string_opt;

type Registrations = indexmap::IndexMap<String, PathBuf, FxBuildHasher>;

/// The JSON structure of a Source Map v3 document
/// https://sourcemaps.info/spec.html
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSourceMap {
    pub version: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,
    /// Original sources; generators may leave `null` holes
    #[serde(default)]
    pub sources: Vec<Option<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources_content: Vec<Option<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
    #[serde(default)]
    pub mappings: String,
    /// Sub-maps of an index map; empty for a regular map
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<SourceMapSection>,
}

/// One section of an index source map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMapSection {
    pub offset: SectionOffset,
    pub map: RawSourceMap,
}

/// Generated-code position where a section starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionOffset {
    pub line: u32,
    pub column: u32,
}

impl RawSourceMap {
    /// Parse a document, rejecting anything that is not a version 3 map
    pub fn parse(content: &str) -> Option<Self> {
        let map: RawSourceMap = serde_json::from_str(content).ok()?;
        (map.version == 3).then_some(map)
    }
}

/// Supplies original-source mappings to an error formatter
pub trait SourceMapProvider: Send + Sync {
    /// Source map JSON for the module identified by `key`, if available
    fn retrieve_source_map(&self, key: &str) -> Option<String>;
}

/// Registry of source map locations keyed by module identifier
///
/// Cloning yields another handle onto the same registrations, which is how
/// the registry is handed to [`install_source_map_provider`] while the owning
/// cache keeps registering new entries.
#[derive(Debug, Clone, Default)]
pub struct SourceMapRegistry {
    entries: Arc<RwLock<Registrations>>,
}

impl SourceMapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the source map location for `key`
    pub fn register(&self, key: impl Into<String>, source_map_path: impl Into<PathBuf>) {
        let key = key.into();
        let path = source_map_path.into();
        debug!("Registering source map for {}: {:?}", key, path);
        self.write().insert(key, path);
    }

    /// Registered location for `key`, without touching disk
    pub fn path_for(&self, key: &str) -> Option<PathBuf> {
        self.read().get(key).cloned()
    }

    /// Source map content for `key`
    ///
    /// Returns `None` if the key is unknown, the file is gone, or the content
    /// is not a valid source map.
    pub fn resolve(&self, key: &str) -> Option<String> {
        let path = self.path_for(key)?;
        let content = read_to_string_opt(&path)?;
        if RawSourceMap::parse(&content).is_none() {
            warn!("Ignoring malformed source map {:?} for {}", path, key);
            return None;
        }
        Some(content)
    }

    /// Decoded source map for `key`
    pub fn resolve_parsed(&self, key: &str) -> Option<RawSourceMap> {
        let path = self.path_for(key)?;
        RawSourceMap::parse(&read_to_string_opt(&path)?)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drop every registration
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Registrations in insertion order
    pub fn entries(&self) -> Vec<(String, PathBuf)> {
        self.read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Registrations> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Registrations> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SourceMapProvider for SourceMapRegistry {
    fn retrieve_source_map(&self, key: &str) -> Option<String> {
        self.resolve(key)
    }
}

static PROVIDER: RwLock<Option<Arc<dyn SourceMapProvider>>> = RwLock::new(None);

/// Install the process-wide provider used by [`retrieve_source_map`]
///
/// Replaces any previously installed provider.
pub fn install_source_map_provider(provider: Arc<dyn SourceMapProvider>) {
    *PROVIDER.write().unwrap_or_else(PoisonError::into_inner) = Some(provider);
}

/// Remove the process-wide provider
pub fn uninstall_source_map_provider() {
    *PROVIDER.write().unwrap_or_else(PoisonError::into_inner) = None;
}

/// Ask the installed provider for the source map of `key`
///
/// This is the entry point for stack-trace rendering; it returns `None` when
/// no provider is installed.
pub fn retrieve_source_map(key: &str) -> Option<String> {
    let provider = PROVIDER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()?;
    provider.retrieve_source_map(key)
}

/// Key used for a file that was registered without a module identifier
pub fn file_key(file_path: &Path) -> String {
    file_path.to_string_lossy().into_owned()
}
