// src/proc/mod.rs

//! Process-backed compiler implementation.
//!
//! This is the built-in [`crate::unit::Compiler`] used by the `multic`
//! binary: one build is one shell command.
//!
//! - [`command`] owns the compiler itself and its watch loop.
//! - [`watch`] feeds the loop filesystem-change triggers via `notify`.
//! - [`patterns`] compiles the per-compiler glob sets those triggers are
//!   filtered through.

pub mod command;
pub mod patterns;
pub mod watch;

pub use command::ProcessCompiler;
pub use patterns::ChangePatterns;
