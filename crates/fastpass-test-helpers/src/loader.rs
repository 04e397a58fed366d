//! A stand-in for the module loader that drives the cache

use std::fs;
use std::path::{Path, PathBuf};

use fastpass_core::{hash_file, CompileCache, Lookup};

use crate::fixtures::{source_map_for, transpile};

/// How a [`FakeLoader::load`] call was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    MemoryHit,
    DiskHit,
    Compiled,
}

/// Loads files through a [`CompileCache`] the way an import hook would
///
/// On a miss the file is "transpiled" with [`transpile`], the listed imports
/// are fed into the dependency collector, and the result is stored.
#[derive(Debug, Default)]
pub struct FakeLoader {
    /// Mixed into every content hash, like transformer options would be
    pub salt: String,

    /// Number of files actually compiled
    pub compiled: usize,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(
        &mut self,
        cache: &mut CompileCache,
        file: &Path,
        imports: &[PathBuf],
    ) -> LoadOutcome {
        let hash = hash_file(file, &self.salt).expect("Failed to hash source");

        let pending = match cache.lookup(file, &hash, None).expect("Lookup failed") {
            Lookup::Hit(cached) if cached.delta.is_some() => return LoadOutcome::DiskHit,
            Lookup::Hit(_) => return LoadOutcome::MemoryHit,
            Lookup::Miss(pending) => pending,
        };

        cache.deps_mut().begin_collecting();
        if let Some(collector) = cache.deps_mut().current_collector() {
            collector.extend(imports.iter().cloned());
        }

        let source = fs::read_to_string(file).expect("Failed to read source");
        let name = file.file_name().unwrap_or_default().to_string_lossy();
        cache
            .populate(pending, &transpile(&source), Some(&source_map_for(&name)))
            .expect("Populate failed");
        cache.deps_mut().end_collecting(file);

        self.compiled += 1;
        LoadOutcome::Compiled
    }
}
