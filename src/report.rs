// src/report.rs

//! Per-compiler build reports and the ordered aggregate.

use std::time::Duration;

/// Result of one successful compiler build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Name of the compiler that produced this report.
    pub compiler: String,
    /// Wall-clock duration of the build.
    pub duration: Duration,
    /// Optional human-readable summary (e.g. the process exit line).
    pub summary: Option<String>,
}

impl BuildReport {
    /// Report with zero duration and no summary, for compilers that have
    /// nothing more to say than "done".
    pub fn bare(compiler: impl Into<String>) -> Self {
        Self {
            compiler: compiler.into(),
            duration: Duration::ZERO,
            summary: None,
        }
    }
}

/// Ordered collection of per-compiler reports.
///
/// For one-shot runs the order is the compiler-list order, regardless of
/// completion order. For watch aggregates it is the subset of compilers
/// that rebuilt since the previous aggregate, in compiler-list order.
/// Merging report contents beyond this ordering is the caller's concern.
#[derive(Debug, Clone, Default)]
pub struct MultiReport {
    reports: Vec<BuildReport>,
}

impl MultiReport {
    pub fn new(reports: Vec<BuildReport>) -> Self {
        Self { reports }
    }

    pub fn reports(&self) -> &[BuildReport] {
        &self.reports
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Compiler names in report order.
    pub fn compiler_names(&self) -> impl Iterator<Item = &str> {
        self.reports.iter().map(|r| r.compiler.as_str())
    }
}
