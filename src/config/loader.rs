// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{DevloopError, Result};

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Load the raw config the CLI should start from.
///
/// - An explicit path must exist.
/// - Otherwise [`default_config_path`] is used when present.
/// - Otherwise every section takes its defaults.
pub fn load_optional(explicit: Option<&Path>) -> Result<RawConfigFile> {
    match explicit {
        Some(path) => load_from_path(path).map_err(|e| match e {
            DevloopError::IoError(io) => DevloopError::ConfigError(format!(
                "cannot read config file {}: {io}",
                path.display()
            )),
            other => other,
        }),
        None => {
            let default = default_config_path();
            if default.is_file() {
                load_from_path(default)
            } else {
                Ok(RawConfigFile::default())
            }
        }
    }
}

/// Helper to resolve a default config path.
///
/// Currently this just returns `Devloop.toml` in the current working
/// directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Devloop.toml")
}

/// Canonicalise configured source roots so they compare against the
/// canonical paths the watcher reports.
pub fn canonical_source_roots(roots: &[PathBuf]) -> Result<Vec<PathBuf>> {
    roots
        .iter()
        .map(|root| {
            fs::canonicalize(root).map_err(|e| {
                DevloopError::ConfigError(format!(
                    "source root {} is not usable: {e}",
                    root.display()
                ))
            })
        })
        .collect()
}
