// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::config::model::ConfigFile;

/// Load a configuration file from a path.
///
/// Performs TOML deserialization plus the local sanity checks in
/// [`parse_config`]. Dependency-graph validation (unresolved names,
/// cycles) is the orchestrator's job and is not duplicated here.
pub fn load_config(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading config file {:?}", path))?;
    parse_config(&contents).with_context(|| format!("in config file {:?}", path))
}

/// Parse and sanity-check a TOML config string.
pub fn parse_config(contents: &str) -> Result<ConfigFile> {
    let config: ConfigFile = toml::from_str(contents).context("parsing TOML config")?;

    if config.compiler.is_empty() {
        return Err(anyhow!(
            "config must contain at least one [compiler.<name>] section"
        ));
    }
    for (name, section) in config.compiler.iter() {
        if section.cmd.trim().is_empty() {
            return Err(anyhow!("compiler '{}' has an empty `cmd`", name));
        }
    }

    Ok(config)
}

/// Default config path: `Multic.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Multic.toml")
}
