// src/proc/patterns.rs

use std::fmt;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Compiled watch/exclude globs for one compiler.
///
/// Patterns are relative to the compiler's working directory; the change
/// watcher passes relative paths (e.g. `"src/main.rs"`) into `matches`.
#[derive(Clone)]
pub struct ChangePatterns {
    watch_set: GlobSet,
    exclude_set: Option<GlobSet>,
}

impl Default for ChangePatterns {
    fn default() -> Self {
        Self {
            watch_set: GlobSet::empty(),
            exclude_set: None,
        }
    }
}

impl fmt::Debug for ChangePatterns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangePatterns")
            .field("watch", &self.watch_set.len())
            .field(
                "exclude",
                &self.exclude_set.as_ref().map(GlobSet::len).unwrap_or(0),
            )
            .finish()
    }
}

impl ChangePatterns {
    pub fn compile(watch: &[String], exclude: &[String]) -> Result<Self> {
        let watch_set = build_globset(watch).context("building watch globset")?;
        let exclude_set = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(exclude).context("building exclude globset")?)
        };
        Ok(Self {
            watch_set,
            exclude_set,
        })
    }

    /// True when there are no watch patterns at all (nothing to watch).
    pub fn is_empty(&self) -> bool {
        self.watch_set.is_empty()
    }

    /// Whether this compiler cares about the given path (relative to its
    /// working directory).
    pub fn matches(&self, rel_path: &str) -> bool {
        if !self.watch_set.is_match(rel_path) {
            return false;
        }
        if let Some(exclude) = &self.exclude_set {
            if exclude.is_match(rel_path) {
                return false;
            }
        }
        true
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::ChangePatterns;

    fn strings(patterns: &[&str]) -> Vec<String> {
        patterns.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn matches_watch_minus_exclude() {
        let patterns = ChangePatterns::compile(
            &strings(&["src/**/*.rs"]),
            &strings(&["src/**/*.tmp.rs"]),
        )
        .unwrap();

        assert!(patterns.matches("src/main.rs"));
        assert!(patterns.matches("src/a/b/mod.rs"));
        assert!(!patterns.matches("src/a/scratch.tmp.rs"));
        assert!(!patterns.matches("docs/readme.md"));
    }

    #[test]
    fn empty_watch_list_matches_nothing() {
        let patterns = ChangePatterns::compile(&[], &[]).unwrap();
        assert!(patterns.is_empty());
        assert!(!patterns.matches("src/main.rs"));
    }

    #[test]
    fn invalid_glob_is_an_error() {
        assert!(ChangePatterns::compile(&strings(&["src/["]), &[]).is_err());
    }
}
