// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DevloopError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Watch root {0:?} is not a directory")]
    InvalidRoot(PathBuf),

    #[error("Failed to watch {path:?}: {source}")]
    WatchRegistration {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Command template error: {0}")]
    TemplateError(String),

    #[error("Failed to launch '{program}': {source}")]
    LaunchFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Shutdown did not complete within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("Supervisor halted: {0}")]
    SupervisorHalted(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DevloopError>;
