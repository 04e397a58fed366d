use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::deps::{DependencyGraph, ImmutableFilter};
use crate::error::Result;
use crate::snapshot::StateSnapshot;
use crate::sourcemap::SourceMapRegistry;

use super::atomic::{ensure_dir, read_to_string_opt, write_atomic};
use super::{CacheEntry, EntryPaths, PathResolver};

/// Compiled entries known to this process, keyed by original file path
pub(crate) type EntryIndex = IndexMap<PathBuf, CacheEntry, FxBuildHasher>;

/// Outcome of [`CompileCache::lookup`]
#[derive(Debug)]
pub enum Lookup {
    /// Compiled output is available
    Hit(CachedCode),

    /// Nothing cached; compile the file and hand the token to
    /// [`CompileCache::populate`]
    Miss(PendingEntry),
}

/// Compiled code returned by a cache hit
#[derive(Debug)]
pub struct CachedCode {
    pub code: String,

    /// State newly recorded by this lookup, for forwarding to other
    /// processes; `None` when the hit came from the in-memory index
    pub delta: Option<StateSnapshot>,
}

/// Token for a cache miss, redeemed once compilation succeeds
#[derive(Debug, Clone)]
pub struct PendingEntry {
    file_path: PathBuf,
    module_url: Option<String>,
    paths: EntryPaths,
}

impl PendingEntry {
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Where the entry will be written
    pub fn paths(&self) -> &EntryPaths {
        &self.paths
    }
}

/// Per-process compilation cache state
///
/// Owns the in-memory entry index, the source map registry and the
/// dependency graph. Disk is authoritative across processes; the index only
/// accelerates repeated lookups within one process.
#[derive(Debug)]
pub struct CompileCache {
    resolver: PathResolver,
    index: EntryIndex,
    source_maps: SourceMapRegistry,
    deps: DependencyGraph,
}

impl CompileCache {
    /// Create a cache rooted at `cache_dir` with the default immutable filter
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self::with_filter(cache_dir, ImmutableFilter::default())
    }

    /// Create a cache rooted at `cache_dir` using `filter` for dependency tracking
    pub fn with_filter(cache_dir: impl Into<PathBuf>, filter: ImmutableFilter) -> Self {
        Self {
            resolver: PathResolver::new(cache_dir),
            index: EntryIndex::default(),
            source_maps: SourceMapRegistry::new(),
            deps: DependencyGraph::new(filter),
        }
    }

    /// Create a cache from resolved configuration
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::with_filter(config.resolve_cache_dir(), config.immutable_filter())
    }

    pub fn cache_dir(&self) -> &Path {
        self.resolver.root()
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Look up compiled output for `file_path` at content `hash`
    ///
    /// The in-memory index is consulted by file path alone: anything this
    /// process already compiled is reused. Otherwise the on-disk entry for
    /// `hash` is used if present and promoted into the index.
    pub fn lookup(
        &mut self,
        file_path: &Path,
        hash: &str,
        module_url: Option<&str>,
    ) -> Result<Lookup> {
        if let Some(entry) = self.index.get(file_path) {
            match read_to_string_opt(&entry.code_path) {
                Some(code) => {
                    debug!("Memory cache hit: {:?}", file_path);
                    return Ok(Lookup::Hit(CachedCode { code, delta: None }));
                }
                None => warn!(
                    "Cached code for {:?} is unreadable at {:?}, probing disk",
                    file_path, entry.code_path
                ),
            }
        }

        let paths = self.resolver.resolve(file_path, hash)?;
        let module_url = module_url.map(str::to_string);

        if let Some(code) = read_to_string_opt(&paths.code_path) {
            debug!("Disk cache hit: {:?} -> {:?}", file_path, paths.code_path);
            let entry = CacheEntry::new(paths.code_path, paths.source_map_path, module_url);
            let delta = self.record(file_path.to_path_buf(), entry);
            return Ok(Lookup::Hit(CachedCode {
                code,
                delta: Some(delta),
            }));
        }

        debug!("Cache miss: {:?} (hash {})", file_path, hash);
        Ok(Lookup::Miss(PendingEntry {
            file_path: file_path.to_path_buf(),
            module_url,
            paths,
        }))
    }

    /// Persist compiled output for a previous miss
    ///
    /// Writes the source map (if any) and then the code atomically, records
    /// the entry and registers its source map. Returns the state delta.
    pub fn populate(
        &mut self,
        pending: PendingEntry,
        code: &str,
        source_map: Option<&str>,
    ) -> Result<StateSnapshot> {
        let PendingEntry {
            file_path,
            module_url,
            paths,
        } = pending;

        ensure_dir(&paths.shard_dir)?;
        if let Some(map) = source_map {
            write_atomic(&paths.source_map_path, map.as_bytes())?;
        }
        write_atomic(&paths.code_path, code.as_bytes())?;

        debug!("Cached {:?} at {:?}", file_path, paths.code_path);
        let entry = CacheEntry::new(paths.code_path, paths.source_map_path, module_url);
        Ok(self.record(file_path, entry))
    }

    /// Drop the in-memory index and source map registrations
    ///
    /// Disk entries and dependency records are kept.
    pub fn clear(&mut self) {
        info!(
            "Clearing {} in-memory cache entries and {} source maps",
            self.index.len(),
            self.source_maps.len()
        );
        self.index.clear();
        self.source_maps.clear();
    }

    pub fn entry(&self, file_path: &Path) -> Option<&CacheEntry> {
        self.index.get(file_path)
    }

    /// In-memory entries in insertion order
    pub fn entries(&self) -> impl Iterator<Item = (&PathBuf, &CacheEntry)> {
        self.index.iter()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn source_maps(&self) -> &SourceMapRegistry {
        &self.source_maps
    }

    pub fn deps(&self) -> &DependencyGraph {
        &self.deps
    }

    pub fn deps_mut(&mut self) -> &mut DependencyGraph {
        &mut self.deps
    }

    /// Insert an entry verbatim; its source map is registered separately
    pub(crate) fn insert_entry(&mut self, file_path: PathBuf, entry: CacheEntry) {
        self.index.insert(file_path, entry);
    }

    fn record(&mut self, file_path: PathBuf, entry: CacheEntry) -> StateSnapshot {
        let key = entry.source_map_key(&file_path);
        self.source_maps
            .register(key.clone(), entry.source_map_path.clone());
        self.index.insert(file_path.clone(), entry.clone());

        StateSnapshot {
            source_maps: vec![(key, entry.source_map_path.clone())],
            memory_cache: vec![(file_path, entry)],
            ..StateSnapshot::default()
        }
    }
}
