//! Test utilities and fixtures for fastpass
//!
//! This crate provides shared test helpers for the integration tests of the
//! core library and the CLI.

pub mod fixtures;
pub mod loader;
pub mod project;

pub use loader::{FakeLoader, LoadOutcome};
pub use project::TestProject;
