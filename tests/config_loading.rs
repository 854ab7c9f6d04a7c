// tests/config_loading.rs

mod common;
use crate::common::builders::ConfigFileBuilder;

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::NamedTempFile;

use devloop::config::{load_and_validate, load_optional, ConfigFile};
use devloop::errors::DevloopError;
use devloop::types::ResolverKind;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn test_full_config_is_loaded() {
    let file = config_file(
        r#"
[watch]
root = "/work/go"
debounce = "250ms"
exclude = ["vendor", "testdata"]
extensions = ["go", ".s"]
resolver = "source-root"
source_roots = ["/work/go"]
source_subdir = "src"

[schedule]
cooldown = "2s"

[supervise]
cooldown = "500ms"
kill_grace = "1m"
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.watch.root, PathBuf::from("/work/go"));
    assert_eq!(cfg.watch.debounce, Duration::from_millis(250));
    assert_eq!(cfg.watch.exclude, vec!["vendor", "testdata"]);
    assert_eq!(cfg.watch.extensions, vec!["go", "s"]);
    assert_eq!(cfg.watch.resolver, ResolverKind::SourceRoot);
    assert_eq!(cfg.watch.source_roots, vec![PathBuf::from("/work/go")]);
    assert_eq!(cfg.schedule.cooldown, Duration::from_secs(2));
    assert_eq!(cfg.supervise.cooldown, Duration::from_millis(500));
    assert_eq!(cfg.supervise.kill_grace, Duration::from_secs(60));
}

#[test]
fn test_missing_sections_take_defaults() {
    let file = config_file(
        r#"
[schedule]
cooldown = "1s"
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.watch.debounce, Duration::from_millis(500));
    assert_eq!(cfg.watch.extensions, vec!["go"]);
    assert_eq!(cfg.watch.resolver, ResolverKind::Relative);
    assert_eq!(cfg.schedule.cooldown, Duration::from_secs(1));
    assert_eq!(cfg.supervise.cooldown, Duration::from_secs(1));
}

#[test]
fn test_bad_duration_returns_config_error() {
    let file = config_file(
        r#"
[watch]
debounce = "soon"
"#,
    );

    match load_and_validate(file.path()) {
        Err(DevloopError::ConfigError(msg)) => {
            assert!(msg.contains("[watch].debounce"));
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_unknown_resolver_is_a_toml_error() {
    let file = config_file(
        r#"
[watch]
resolver = "gopath-magic"
"#,
    );

    let result = load_and_validate(file.path());
    assert!(matches!(result, Err(DevloopError::TomlError(_))));
}

#[test]
fn test_empty_extensions_are_rejected() {
    let file = config_file(
        r#"
[watch]
extensions = []
"#,
    );

    match load_and_validate(file.path()) {
        Err(DevloopError::ConfigError(msg)) => assert!(msg.contains("extensions")),
        other => panic!("Expected ConfigError, got: {:?}", other),
    }
}

#[test]
fn test_missing_explicit_config_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("Devloop.toml");

    match load_optional(Some(missing.as_path())) {
        Err(DevloopError::ConfigError(msg)) => assert!(msg.contains("cannot read config file")),
        other => panic!("Expected ConfigError, got: {:?}", other),
    }
}

#[test]
fn test_builder_produces_validated_config() {
    let cfg = ConfigFileBuilder::new()
        .root("/src/project")
        .debounce("100ms")
        .extensions(&["rs"])
        .exclude("target")
        .schedule_cooldown("0s")
        .build();

    assert_eq!(cfg.watch.extensions, vec!["rs"]);
    assert!(cfg.watch.exclude.contains(&"target".to_string()));
    assert_eq!(cfg.schedule.cooldown, Duration::ZERO);

    let watch = cfg.watch_config(&PathBuf::from("/src/project"));
    assert_eq!(watch.debounce, Duration::from_millis(100));
}

#[test]
fn test_source_roots_require_source_root_resolver() {
    let mut raw = ConfigFileBuilder::new().raw();
    raw.watch.source_roots.push(PathBuf::from("/gopath"));

    assert!(matches!(
        ConfigFile::try_from(raw),
        Err(DevloopError::ConfigError(_))
    ));
}

#[test]
fn test_demo_config_is_valid() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/Devloop.toml");
    let cfg = load_and_validate(&path).unwrap();

    assert_eq!(cfg.watch.exclude, vec!["vendor", "testdata"]);
    assert_eq!(cfg.schedule.cooldown, Duration::from_secs(4));
    assert_eq!(cfg.supervise.kill_grace, Duration::from_secs(5));
}
