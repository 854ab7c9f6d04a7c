#![allow(dead_code)]

use std::path::{Path, PathBuf};

pub use devloop_test_utils::{builders, init_tracing, with_timeout};

/// Create `path` (and its parents) with some Go content.
pub fn write_go_file(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, "package main\n").unwrap();
}

/// Canonical temp dir root, so it matches what the watcher reports.
pub fn canonical(dir: &tempfile::TempDir) -> PathBuf {
    std::fs::canonicalize(dir.path()).unwrap()
}
