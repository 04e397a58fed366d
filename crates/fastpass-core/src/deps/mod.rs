//! Dependency tracking between compiled files.
//!
//! The loader brackets each compilation with `begin_collecting` /
//! `end_collecting` and feeds every file it resolves into the live collector.
//! Bundler integrations report their own resolution through
//! `set_external_dependencies`. A changed file maps back to the files that
//! must be recompiled through `affected_by`.

mod filter;
mod graph;

pub use filter::ImmutableFilter;
pub use graph::{DependencyGraph, DependencyMap, DependencySet};
