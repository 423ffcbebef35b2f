// src/config/mod.rs

//! TOML configuration for the `multic` binary.

pub mod loader;
pub mod model;

pub use loader::{default_config_path, load_config};
pub use model::{CompilerSection, ConfigFile};
