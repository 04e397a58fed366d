use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxBuildHasher;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::ImmutableFilter;

/// Set of dependency paths, in the order they were first seen
pub type DependencySet = IndexSet<PathBuf, FxBuildHasher>;

/// Dependency records keyed by the compiled file
pub type DependencyMap = IndexMap<PathBuf, DependencySet, FxBuildHasher>;

/// Records which files each compiled file depends on
///
/// Two namespaces are kept apart: *internal* dependencies observed while the
/// loader compiled a file, and *external* dependencies reported by a bundler
/// that resolves modules on its own. Both are consulted by [`affected_by`].
///
/// Collection is single-slot: only one file's dependencies are recorded at a
/// time, and [`begin_collecting`] abandons any collection in progress.
///
/// [`affected_by`]: DependencyGraph::affected_by
/// [`begin_collecting`]: DependencyGraph::begin_collecting
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    filter: ImmutableFilter,
    internal: DependencyMap,
    external: DependencyMap,
    collector: Option<DependencySet>,
}

impl DependencyGraph {
    pub fn new(filter: ImmutableFilter) -> Self {
        Self {
            filter,
            internal: DependencyMap::default(),
            external: DependencyMap::default(),
            collector: None,
        }
    }

    pub fn filter(&self) -> &ImmutableFilter {
        &self.filter
    }

    /// Open the collector slot, discarding any uncommitted collection
    pub fn begin_collecting(&mut self) {
        if let Some(ref abandoned) = self.collector {
            debug!(
                "Abandoning dependency collection with {} entries",
                abandoned.len()
            );
        }
        self.collector = Some(DependencySet::default());
    }

    /// The live collector, if a collection is active
    pub fn current_collector(&mut self) -> Option<&mut DependencySet> {
        self.collector.as_mut()
    }

    /// Add `path` to the live collector; does nothing when none is active
    pub fn record_dependency(&mut self, path: impl Into<PathBuf>) {
        if let Some(collector) = self.collector.as_mut() {
            collector.insert(path.into());
        }
    }

    pub fn is_collecting(&self) -> bool {
        self.collector.is_some()
    }

    /// Close the collector slot and store its contents as the internal
    /// dependencies of `file_path`
    pub fn end_collecting(&mut self, file_path: &Path) {
        let Some(collected) = self.collector.take() else {
            return;
        };
        let deps = self.filtered(file_path, collected);
        debug!("Recorded {} dependencies for {:?}", deps.len(), file_path);
        self.internal.insert(file_path.to_path_buf(), deps);
    }

    /// Store dependencies reported by a bundler for `file_path`
    pub fn set_external_dependencies<I, P>(&mut self, file_path: &Path, deps: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let deps = self.filtered(file_path, deps.into_iter().map(Into::into));
        self.external.insert(file_path.to_path_buf(), deps);
    }

    /// `changed_file` plus every file that directly depends on it
    ///
    /// Only direct dependents are returned. Callers that need transitive
    /// invalidation re-query with the growing result until it stops changing.
    pub fn affected_by(&self, changed_file: &Path) -> DependencySet {
        let mut affected = DependencySet::default();
        affected.insert(changed_file.to_path_buf());
        self.collect_dependents(changed_file, &mut affected);
        affected
    }

    /// Union of [`affected_by`](Self::affected_by) over every changed file
    pub fn affected_by_all<'a, I>(&self, changes: I) -> DependencySet
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let mut affected = DependencySet::default();
        for changed in changes {
            affected.insert(changed.to_path_buf());
            self.collect_dependents(changed, &mut affected);
        }
        affected
    }

    /// Internal dependencies recorded for `file_path`
    pub fn dependencies_of(&self, file_path: &Path) -> DependencySet {
        self.internal.get(file_path).cloned().unwrap_or_default()
    }

    /// Every file a change to which should retrigger `file_path`
    ///
    /// Internal dependencies, the external dependencies of each of them, and
    /// the external dependencies of `file_path` itself.
    pub fn all_dependencies_of(&self, file_path: &Path) -> DependencySet {
        let mut result = DependencySet::default();
        for dep in self.internal.get(file_path).into_iter().flatten() {
            result.insert(dep.clone());
            if let Some(external) = self.external.get(dep) {
                result.extend(external.iter().cloned());
            }
        }
        if let Some(external) = self.external.get(file_path) {
            result.extend(external.iter().cloned());
        }
        result
    }

    pub fn internal(&self) -> &DependencyMap {
        &self.internal
    }

    pub fn external(&self) -> &DependencyMap {
        &self.external
    }

    /// Replace the internal record of `file_path` verbatim
    pub(crate) fn insert_internal(&mut self, file_path: PathBuf, deps: DependencySet) {
        self.internal.insert(file_path, deps);
    }

    /// Replace the external record of `file_path` verbatim
    pub(crate) fn insert_external(&mut self, file_path: PathBuf, deps: DependencySet) {
        self.external.insert(file_path, deps);
    }

    fn collect_dependents(&self, changed_file: &Path, out: &mut DependencySet) {
        for namespace in [&self.internal, &self.external] {
            for (file, deps) in namespace {
                if deps.contains(changed_file) {
                    out.insert(file.clone());
                }
            }
        }
    }

    fn filtered(
        &self,
        file_path: &Path,
        deps: impl IntoIterator<Item = PathBuf>,
    ) -> DependencySet {
        deps.into_iter()
            .filter(|dep| dep != file_path && !self.filter.is_immutable(dep))
            .collect()
    }
}
