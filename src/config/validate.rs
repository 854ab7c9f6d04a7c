// src/config/validate.rs

use std::path::PathBuf;
use std::time::Duration;

use crate::config::duration::parse_duration;
use crate::config::model::{ConfigFile, RawConfigFile, RawWatchSection, WatchSection};
use crate::errors::{DevloopError, Result};
use crate::schedule::SchedulerConfig;
use crate::supervise::{SupervisorConfig, SHUTDOWN_TIMEOUT};
use crate::types::ResolverKind;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::DevloopError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let watch = validate_watch(raw.watch)?;

        let schedule = SchedulerConfig {
            cooldown: duration_field("schedule", "cooldown", &raw.schedule.cooldown)?,
        };

        let supervise = SupervisorConfig {
            cooldown: duration_field("supervise", "cooldown", &raw.supervise.cooldown)?,
            kill_grace: duration_field("supervise", "kill_grace", &raw.supervise.kill_grace)?,
            shutdown_timeout: SHUTDOWN_TIMEOUT,
        };

        Ok(ConfigFile::new_unchecked(watch, schedule, supervise))
    }
}

fn validate_watch(raw: RawWatchSection) -> Result<WatchSection> {
    let debounce = duration_field("watch", "debounce", &raw.debounce)?;
    if debounce.is_zero() {
        return Err(DevloopError::ConfigError(
            "[watch].debounce must be greater than zero".to_string(),
        ));
    }

    let extensions = validate_extensions(&raw.extensions)?;
    validate_exclude(&raw.exclude)?;
    validate_source_roots(raw.resolver, &raw.source_roots)?;
    validate_source_subdir(&raw.source_subdir)?;

    Ok(WatchSection {
        root: raw.root.unwrap_or_else(|| PathBuf::from(".")),
        debounce,
        exclude: raw.exclude,
        extensions,
        resolver: raw.resolver,
        source_roots: raw.source_roots,
        source_subdir: raw.source_subdir,
    })
}

fn duration_field(section: &str, field: &str, value: &str) -> Result<Duration> {
    parse_duration(value)
        .map_err(|e| DevloopError::ConfigError(format!("[{section}].{field}: {e}")))
}

/// Extensions are accepted with or without a leading dot and stored without.
fn validate_extensions(raw: &[String]) -> Result<Vec<String>> {
    if raw.is_empty() {
        return Err(DevloopError::ConfigError(
            "[watch].extensions must list at least one extension".to_string(),
        ));
    }

    raw.iter()
        .map(|ext| {
            let ext = ext.trim().trim_start_matches('.');
            if ext.is_empty() || ext.contains(['/', '\\', '.']) {
                Err(DevloopError::ConfigError(format!(
                    "[watch].extensions: invalid extension {ext:?}"
                )))
            } else {
                Ok(ext.to_string())
            }
        })
        .collect()
}

fn validate_exclude(names: &[String]) -> Result<()> {
    for name in names {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(DevloopError::ConfigError(format!(
                "[watch].exclude entries must be plain directory names (got {name:?})"
            )));
        }
    }
    Ok(())
}

fn validate_source_roots(resolver: ResolverKind, roots: &[PathBuf]) -> Result<()> {
    if resolver != ResolverKind::SourceRoot && !roots.is_empty() {
        return Err(DevloopError::ConfigError(
            "[watch].source_roots requires resolver = \"source-root\"".to_string(),
        ));
    }
    Ok(())
}

fn validate_source_subdir(subdir: &str) -> Result<()> {
    if subdir.trim().is_empty() || PathBuf::from(subdir).is_absolute() {
        return Err(DevloopError::ConfigError(format!(
            "[watch].source_subdir must be a non-empty relative path (got {subdir:?})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = ConfigFile::try_from(RawConfigFile::default()).unwrap();
        assert_eq!(cfg.watch.debounce, Duration::from_millis(500));
        assert_eq!(cfg.watch.extensions, vec!["go".to_string()]);
        assert_eq!(cfg.watch.exclude, vec!["vendor".to_string()]);
        assert_eq!(cfg.watch.root, PathBuf::from("."));
        assert_eq!(cfg.schedule.cooldown, Duration::from_secs(4));
        assert_eq!(cfg.supervise.cooldown, Duration::from_secs(1));
        assert_eq!(cfg.supervise.kill_grace, Duration::from_secs(5));
    }

    #[test]
    fn extensions_are_normalised() {
        let mut raw = RawConfigFile::default();
        raw.watch.extensions = vec![".rs".to_string(), "toml".to_string()];
        let cfg = ConfigFile::try_from(raw).unwrap();
        assert_eq!(cfg.watch.extensions, vec!["rs", "toml"]);
    }

    #[test]
    fn zero_debounce_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.watch.debounce = "0ms".to_string();
        let err = ConfigFile::try_from(raw).unwrap_err();
        assert!(err.to_string().contains("debounce"));
    }

    #[test]
    fn exclude_with_separator_is_rejected() {
        let mut raw = RawConfigFile::default();
        raw.watch.exclude = vec!["a/b".to_string()];
        assert!(matches!(
            ConfigFile::try_from(raw),
            Err(DevloopError::ConfigError(_))
        ));
    }

    #[test]
    fn source_roots_need_source_root_resolver() {
        let mut raw = RawConfigFile::default();
        raw.watch.source_roots = vec![PathBuf::from("/gopath")];
        assert!(ConfigFile::try_from(raw.clone()).is_err());

        raw.watch.resolver = ResolverKind::SourceRoot;
        assert!(ConfigFile::try_from(raw).is_ok());
    }
}
