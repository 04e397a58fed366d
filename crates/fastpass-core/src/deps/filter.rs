use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Decides which dependency paths are immutable and never tracked
///
/// Installed packages only change through a version bump, which invalidates
/// the whole cache key upstream, so per-file tracking of them is skipped.
#[derive(Debug, Clone)]
pub struct ImmutableFilter {
    /// Path components that mark a package-manager install directory
    installed_dirs: Vec<OsString>,

    /// Framework-internal trees (development mode only)
    internal_roots: Vec<PathBuf>,
}

impl Default for ImmutableFilter {
    fn default() -> Self {
        Self::new(["node_modules"])
    }
}

impl ImmutableFilter {
    pub fn new<I, S>(installed_dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            installed_dirs: installed_dirs.into_iter().map(Into::into).collect(),
            internal_roots: Vec::new(),
        }
    }

    /// Also treat everything under `root` (or `root` itself) as immutable
    pub fn with_internal_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.internal_roots.push(root.into());
        self
    }

    pub fn is_immutable(&self, path: &Path) -> bool {
        let installed = path.components().any(|c| match c {
            Component::Normal(name) => self.installed_dirs.iter().any(|d| d == name),
            _ => false,
        });
        installed || self.internal_roots.iter().any(|root| path.starts_with(root))
    }
}
