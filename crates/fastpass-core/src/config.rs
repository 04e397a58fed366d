use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::deps::ImmutableFilter;
use crate::error::{CacheError, Result};

/// Environment variable that overrides the cache root directory
pub const CACHE_DIR_ENV: &str = "FASTPASS_CACHE_DIR";

/// Environment variable that enables framework development mode
pub const FRAMEWORK_DEV_ENV: &str = "FASTPASS_FRAMEWORK_DEV";

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "fastpass.yaml";

/// Directory name used under the OS temp dir when no override is set
pub const CACHE_DIR_PREFIX: &str = "fastpass-transform-cache";

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// Root directory for cache entries (default: per-user temp location)
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Track framework-internal files as immutable (default: false)
    #[serde(default)]
    pub framework_dev_mode: bool,

    /// Framework source tree, filtered out in development mode
    #[serde(default)]
    pub framework_root: Option<PathBuf>,

    /// Coverage instrumentation shim, filtered out in development mode
    #[serde(default)]
    pub coverage_shim: Option<PathBuf>,

    /// Directory names that hold installed packages (default: node_modules)
    #[serde(default = "default_installed_package_dirs")]
    pub installed_package_dirs: Vec<String>,
}

fn default_installed_package_dirs() -> Vec<String> {
    vec!["node_modules".to_string()]
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            framework_dev_mode: false,
            framework_root: None,
            coverage_shim: None,
            installed_package_dirs: default_installed_package_dirs(),
        }
    }
}

/// Overrides collected from the command line; `None` leaves the value untouched
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub cache_dir: Option<PathBuf>,
    pub framework_dev_mode: Option<bool>,
    pub framework_root: Option<PathBuf>,
    pub coverage_shim: Option<PathBuf>,
}

impl CacheConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| CacheError::io(e, path, "read"))?;
        let config: CacheConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Apply `FASTPASS_CACHE_DIR` / `FASTPASS_FRAMEWORK_DEV` from the process environment
    pub fn with_env(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides read through `lookup`
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(CACHE_DIR_ENV).filter(|s| !s.trim().is_empty()) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(flag) = lookup(FRAMEWORK_DEV_ENV) {
            self.framework_dev_mode = matches!(flag.trim(), "1" | "true" | "yes");
        }
        self
    }

    /// Merge command line overrides into this configuration
    pub fn merge(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref dir) = overrides.cache_dir {
            self.cache_dir = Some(dir.clone());
        }
        if let Some(dev) = overrides.framework_dev_mode {
            self.framework_dev_mode = dev;
        }
        if let Some(ref root) = overrides.framework_root {
            self.framework_root = Some(root.clone());
        }
        if let Some(ref shim) = overrides.coverage_shim {
            self.coverage_shim = Some(shim.clone());
        }
    }

    /// Effective cache root: the configured directory or the per-user default
    pub fn resolve_cache_dir(&self) -> PathBuf {
        match self.cache_dir {
            Some(ref dir) => dir.clone(),
            None => default_cache_dir(&std::env::temp_dir()),
        }
    }

    /// Build the immutable-dependency filter described by this configuration
    pub fn immutable_filter(&self) -> ImmutableFilter {
        let mut filter = ImmutableFilter::new(self.installed_package_dirs.iter().cloned());
        if self.framework_dev_mode {
            if let Some(ref root) = self.framework_root {
                filter = filter.with_internal_root(root.clone());
            }
            if let Some(ref shim) = self.coverage_shim {
                filter = filter.with_internal_root(shim.clone());
            }
        }
        filter
    }
}

/// Per-user cache root under `temp_dir`
///
/// Non-Windows roots carry the effective user id so that users sharing a
/// machine never write into each other's cache.
pub fn default_cache_dir(temp_dir: &Path) -> PathBuf {
    #[cfg(unix)]
    {
        // SAFETY: geteuid has no preconditions and cannot fail.
        let euid = unsafe { libc::geteuid() };
        temp_dir.join(format!("{CACHE_DIR_PREFIX}-{euid}"))
    }
    #[cfg(not(unix))]
    {
        temp_dir.join(CACHE_DIR_PREFIX)
    }
}
