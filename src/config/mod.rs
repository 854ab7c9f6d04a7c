// src/config/mod.rs

//! Configuration loading and validation for devloop.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate values and parse durations (`validate.rs`, `duration.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::{format_duration, parse_duration};
pub use loader::{
    canonical_source_roots, default_config_path, load_and_validate, load_from_path, load_optional,
};
pub use model::{
    ConfigFile, RawConfigFile, RawScheduleSection, RawSuperviseSection, RawWatchSection,
    WatchSection,
};
