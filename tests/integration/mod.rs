//! Integration test suite for cairn.
//!
//! These tests drive the public API against a task document on disk, the
//! way the command layer does: load, operate, persist.
//!
//! # Test Categories
//!
//! - `orchestration_flow`: readiness and the spawn lifecycle over a file
//! - `import_merge`: package import scenarios and export round-trips
//! - `properties`: generated-graph properties (proptest)

mod fixtures;

mod import_merge;
mod orchestration_flow;
mod properties;
