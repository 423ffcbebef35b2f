// src/dag/mod.rs

//! Dependency-graph validation and dependency-ordered execution.
//!
//! [`graph`] checks a compiler set for unresolved dependency names and
//! cycles, producing a deterministic report when the set is invalid.
//! [`topo`] runs a per-compiler action in waves, releasing each compiler
//! once all of its dependencies have completed.

pub mod graph;
pub(crate) mod topo;

pub use graph::{validate, ValidationReport};
