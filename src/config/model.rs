// src/config/model.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::schedule::SchedulerConfig;
use crate::supervise::SupervisorConfig;
use crate::types::ResolverKind;
use crate::watch::{KeyResolver, WatchConfig};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [watch]
/// root = "."
/// debounce = "500ms"
/// exclude = ["vendor"]
/// extensions = ["go"]
/// resolver = "relative"
///
/// [schedule]
/// cooldown = "4s"
///
/// [supervise]
/// cooldown = "1s"
/// kill_grace = "5s"
/// ```
///
/// All sections are optional and have reasonable defaults. Durations are
/// kept as strings here and parsed during validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub watch: RawWatchSection,

    #[serde(default)]
    pub schedule: RawScheduleSection,

    #[serde(default)]
    pub supervise: RawSuperviseSection,
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawWatchSection {
    /// Directory to watch. `None` means the current working directory.
    #[serde(default)]
    pub root: Option<PathBuf>,

    #[serde(default = "default_debounce")]
    pub debounce: String,

    /// Directory names skipped anywhere below the root. Dot-directories are
    /// always skipped.
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    /// File extensions (without the dot) that count as source changes.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    #[serde(default)]
    pub resolver: ResolverKind,

    /// Only meaningful with `resolver = "source-root"`.
    #[serde(default)]
    pub source_roots: Vec<PathBuf>,

    #[serde(default = "default_source_subdir")]
    pub source_subdir: String,
}

fn default_debounce() -> String {
    "500ms".to_string()
}

fn default_exclude() -> Vec<String> {
    crate::watch::DEFAULT_EXCLUDES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_extensions() -> Vec<String> {
    vec!["go".to_string()]
}

fn default_source_subdir() -> String {
    crate::watch::DEFAULT_SOURCE_SUBDIR.to_string()
}

impl Default for RawWatchSection {
    fn default() -> Self {
        Self {
            root: None,
            debounce: default_debounce(),
            exclude: default_exclude(),
            extensions: default_extensions(),
            resolver: ResolverKind::default(),
            source_roots: Vec::new(),
            source_subdir: default_source_subdir(),
        }
    }
}

/// `[schedule]` section (each-change workflow).
#[derive(Debug, Clone, Deserialize)]
pub struct RawScheduleSection {
    #[serde(default = "default_schedule_cooldown")]
    pub cooldown: String,
}

fn default_schedule_cooldown() -> String {
    "4s".to_string()
}

impl Default for RawScheduleSection {
    fn default() -> Self {
        Self {
            cooldown: default_schedule_cooldown(),
        }
    }
}

/// `[supervise]` section (rerun workflow).
#[derive(Debug, Clone, Deserialize)]
pub struct RawSuperviseSection {
    #[serde(default = "default_supervise_cooldown")]
    pub cooldown: String,

    /// How long a process gets to exit after the graceful signal before it
    /// is killed.
    #[serde(default = "default_kill_grace")]
    pub kill_grace: String,
}

fn default_supervise_cooldown() -> String {
    "1s".to_string()
}

fn default_kill_grace() -> String {
    "5s".to_string()
}

impl Default for RawSuperviseSection {
    fn default() -> Self {
        Self {
            cooldown: default_supervise_cooldown(),
            kill_grace: default_kill_grace(),
        }
    }
}

/// Validated configuration. Construct via `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub watch: WatchSection,
    pub schedule: SchedulerConfig,
    pub supervise: SupervisorConfig,
}

/// Validated `[watch]` section.
#[derive(Debug, Clone)]
pub struct WatchSection {
    pub root: PathBuf,
    pub debounce: Duration,
    pub exclude: Vec<String>,
    pub extensions: Vec<String>,
    pub resolver: ResolverKind,
    pub source_roots: Vec<PathBuf>,
    pub source_subdir: String,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        watch: WatchSection,
        schedule: SchedulerConfig,
        supervise: SupervisorConfig,
    ) -> Self {
        Self {
            watch,
            schedule,
            supervise,
        }
    }

    /// Watcher settings rooted at `root` (normally the canonical form of
    /// `watch.root`).
    pub fn watch_config(&self, root: &Path) -> WatchConfig {
        WatchConfig {
            root: root.to_path_buf(),
            debounce: self.watch.debounce,
            exclude: self.watch.exclude.clone(),
            extensions: self.watch.extensions.clone(),
        }
    }

    /// Key resolver for a watcher rooted at `root`.
    ///
    /// `source_roots` should already be in the same (canonical) form as
    /// `root`; see [`crate::config::canonical_source_roots`].
    pub fn key_resolver(&self, root: &Path, source_roots: &[PathBuf]) -> KeyResolver {
        KeyResolver::from_kind(
            self.watch.resolver,
            root,
            source_roots,
            &self.watch.source_subdir,
        )
    }
}
