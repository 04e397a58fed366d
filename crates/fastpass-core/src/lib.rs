//! Compilation result cache for test runners.
//!
//! Transpiled code and source maps are stored on disk under a content hash
//! and indexed in memory per process. Dependency records map an edited file
//! back to the compiled files that must be rebuilt, and the whole state can
//! be exported to and merged from other worker processes.

pub mod cache;
pub mod config;
pub mod deps;
pub mod error;
pub mod hash;
pub mod snapshot;
pub mod sourcemap;

pub use cache::{
    CacheEntry, CachedCode, CompileCache, EntryPaths, Lookup, PathResolver, PendingEntry,
};
pub use config::{CacheConfig, ConfigOverrides};
pub use deps::{DependencyGraph, DependencySet, ImmutableFilter};
pub use error::{CacheError, Result};
pub use hash::{hash_config, hash_file, hash_source};
pub use snapshot::StateSnapshot;
pub use sourcemap::{
    install_source_map_provider, retrieve_source_map, uninstall_source_map_provider, RawSourceMap,
    SectionOffset, SourceMapProvider, SourceMapRegistry, SourceMapSection,
};
