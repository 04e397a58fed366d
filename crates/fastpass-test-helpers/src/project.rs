//! Temporary project trees with a private cache root

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use fastpass_core::CompileCache;

/// A temporary directory holding a source tree and a cache root
///
/// Both live under the same [`TempDir`] and are removed on drop.
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir_all(dir.path().join("src")).expect("Failed to create src dir");
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Cache root used by [`TestProject::cache`]
    pub fn cache_dir(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    /// Absolute path of `rel` inside the source tree
    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join("src").join(rel)
    }

    /// Write a source file and return its absolute path
    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        fs::write(&path, content).expect("Failed to write source file");
        path
    }

    /// A fresh cache over this project's cache root, as a new process would see it
    pub fn cache(&self) -> CompileCache {
        CompileCache::new(self.cache_dir())
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}
