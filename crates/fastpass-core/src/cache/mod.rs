//! On-disk compilation cache with a per-process in-memory index.
//!
//! Compiled code and source maps are stored under a root directory keyed by
//! a caller-supplied content hash, so entries survive process restarts and
//! are shared between worker processes. The in-memory index avoids repeated
//! disk probes within one process.

pub(crate) mod atomic;
mod entry;
mod paths;
mod store;

pub use atomic::write_atomic;
pub use entry::CacheEntry;
pub use paths::{EntryPaths, PathResolver};
pub use store::{CachedCode, CompileCache, Lookup, PendingEntry};

/// Extension of compiled code files
pub const CODE_EXTENSION: &str = "js";

/// Extension of source map files
pub const SOURCE_MAP_EXTENSION: &str = "map";
