// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::unit::WatchOptions;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [watch]
/// debounce_ms = 200
///
/// [compiler.lib]
/// cmd = "cargo build -p lib"
/// output = "target/lib"
///
/// [compiler.app]
/// cmd = "cargo build -p app"
/// output = "target/app"
/// after = ["lib"]
/// watch = ["app/src/**/*.rs"]
/// ```
///
/// Both sections are optional in TOML terms, but the loader rejects a
/// config with no compilers.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    /// Watch defaults from `[watch]`, applied to every compiler.
    #[serde(default)]
    pub watch: WatchOptions,

    /// All compilers from `[compiler.<name>]`.
    ///
    /// Keys are the compiler names; `BTreeMap` keeps the set order
    /// deterministic.
    #[serde(default)]
    pub compiler: BTreeMap<String, CompilerSection>,
}

/// `[compiler.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CompilerSection {
    /// Shell command that performs one build.
    pub cmd: String,

    /// Directory the command runs in, relative to the config file's
    /// directory. Defaults to the config file's directory itself.
    #[serde(default)]
    pub workdir: Option<PathBuf>,

    /// Where this compiler writes its output (used for aggregate
    /// reporting).
    #[serde(default)]
    pub output: Option<PathBuf>,

    /// Names of compilers that must build before this one.
    #[serde(default)]
    pub after: Vec<String>,

    /// Glob patterns (relative to `workdir`) whose changes trigger a
    /// rebuild in watch mode.
    #[serde(default)]
    pub watch: Vec<String>,

    /// Glob patterns excluded from `watch`.
    #[serde(default)]
    pub exclude: Vec<String>,
}
