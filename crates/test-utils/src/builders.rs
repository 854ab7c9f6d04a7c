#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use devloop::config::{ConfigFile, RawConfigFile};
use devloop::schedule::SchedulerConfig;
use devloop::supervise::SupervisorConfig;
use devloop::types::ResolverKind;
use devloop::watch::WatchConfig;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.watch.root = Some(root.into());
        self
    }

    pub fn debounce(mut self, value: &str) -> Self {
        self.config.watch.debounce = value.to_string();
        self
    }

    pub fn exclude(mut self, name: &str) -> Self {
        self.config.watch.exclude.push(name.to_string());
        self
    }

    pub fn extensions(mut self, exts: &[&str]) -> Self {
        self.config.watch.extensions = exts.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.watch.resolver = ResolverKind::SourceRoot;
        self.config.watch.source_roots.push(root.into());
        self
    }

    pub fn schedule_cooldown(mut self, value: &str) -> Self {
        self.config.schedule.cooldown = value.to_string();
        self
    }

    pub fn supervise_cooldown(mut self, value: &str) -> Self {
        self.config.supervise.cooldown = value.to_string();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Watcher settings for `root` with a short debounce and `.go` sources.
pub fn watch_config(root: &Path, debounce: Duration) -> WatchConfig {
    WatchConfig {
        root: root.to_path_buf(),
        debounce,
        exclude: vec!["vendor".to_string()],
        extensions: vec!["go".to_string()],
    }
}

pub fn scheduler_config(cooldown: Duration) -> SchedulerConfig {
    SchedulerConfig { cooldown }
}

/// Supervisor settings with test-friendly timings.
pub fn supervisor_config(cooldown: Duration, kill_grace: Duration) -> SupervisorConfig {
    SupervisorConfig {
        cooldown,
        kill_grace,
        shutdown_timeout: Duration::from_secs(2),
    }
}
