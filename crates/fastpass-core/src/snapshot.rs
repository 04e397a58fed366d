//! Transfer of cache and dependency state between processes.
//!
//! A snapshot is a plain structure of ordered `[key, value]` entry lists that
//! serializes to JSON (for IPC channels that carry JSON messages) or bincode.
//! Merging overwrites local entries that share a key.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

use crate::cache::{CacheEntry, CompileCache};
use crate::deps::DependencySet;
use crate::error::Result;

/// Serialized form of a [`CompileCache`]'s state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    /// Source map registrations: lookup key -> source map path
    #[serde(default)]
    pub source_maps: Vec<(String, PathBuf)>,

    /// In-memory index: original file path -> cache entry
    #[serde(default)]
    pub memory_cache: Vec<(PathBuf, CacheEntry)>,

    /// Internal dependency records
    #[serde(default)]
    pub file_dependencies: Vec<(PathBuf, Vec<PathBuf>)>,

    /// External (bundler-reported) dependency records
    #[serde(default)]
    pub external_dependencies: Vec<(PathBuf, Vec<PathBuf>)>,
}

impl StateSnapshot {
    pub fn is_empty(&self) -> bool {
        self.source_maps.is_empty()
            && self.memory_cache.is_empty()
            && self.file_dependencies.is_empty()
            && self.external_dependencies.is_empty()
    }

    /// Append the entries of `other`, e.g. to batch several deltas
    pub fn extend(&mut self, other: StateSnapshot) {
        self.source_maps.extend(other.source_maps);
        self.memory_cache.extend(other.memory_cache);
        self.file_dependencies.extend(other.file_dependencies);
        self.external_dependencies.extend(other.external_dependencies);
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to binary format
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from binary format
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

fn dependency_entries<'a>(
    map: impl IntoIterator<Item = (&'a PathBuf, &'a DependencySet)>,
) -> Vec<(PathBuf, Vec<PathBuf>)> {
    map.into_iter()
        .map(|(file, deps)| (file.clone(), deps.iter().cloned().collect()))
        .collect()
}

impl CompileCache {
    /// Snapshot every registration, entry and dependency record
    pub fn serialize(&self) -> StateSnapshot {
        StateSnapshot {
            source_maps: self.source_maps().entries(),
            memory_cache: self
                .entries()
                .map(|(file, entry)| (file.clone(), entry.clone()))
                .collect(),
            file_dependencies: dependency_entries(self.deps().internal()),
            external_dependencies: dependency_entries(self.deps().external()),
        }
    }

    /// Apply a snapshot received from another process
    ///
    /// Entries replace local ones with the same key. The snapshot is trusted:
    /// dependency lists are stored as received, without re-filtering.
    pub fn merge(&mut self, snapshot: StateSnapshot) {
        info!(
            "Merging cache state: {} entries, {} source maps, {} dependency records",
            snapshot.memory_cache.len(),
            snapshot.source_maps.len(),
            snapshot.file_dependencies.len() + snapshot.external_dependencies.len()
        );

        let StateSnapshot {
            source_maps,
            memory_cache,
            file_dependencies,
            external_dependencies,
        } = snapshot;

        for (key, path) in source_maps {
            self.source_maps().register(key, path);
        }
        for (file, entry) in memory_cache {
            self.insert_entry(file, entry);
        }
        for (file, deps) in file_dependencies {
            self.deps_mut()
                .insert_internal(file, deps.into_iter().collect());
        }
        for (file, deps) in external_dependencies {
            self.deps_mut()
                .insert_external(file, deps.into_iter().collect());
        }
    }
}
