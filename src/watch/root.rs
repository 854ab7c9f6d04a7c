// src/watch/root.rs

//! The watched directory tree and its registration bookkeeping.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, trace};

use crate::errors::{DevloopError, Result};
use crate::fs::FileSystem;

/// Directory names that are never watched unless configured otherwise.
pub const DEFAULT_EXCLUDES: &[&str] = &["vendor"];

/// Something that can start native change notification for one directory.
///
/// Registration is non-recursive: the watcher registers every directory of
/// the tree itself so excluded subtrees never cost a watch descriptor.
pub trait DirRegistrar: Send {
    fn register(&mut self, dir: &Path) -> Result<()>;
}

impl DirRegistrar for RecommendedWatcher {
    fn register(&mut self, dir: &Path) -> Result<()> {
        self.watch(dir, RecursiveMode::NonRecursive)
            .map_err(|source| DevloopError::WatchRegistration {
                path: dir.to_path_buf(),
                source,
            })
    }
}

/// Absolute root directory plus the exclusion predicate and the set of
/// directories currently registered below it.
#[derive(Debug, Clone)]
pub struct WatchRoot {
    path: PathBuf,
    exclude: Vec<String>,
    registered: BTreeSet<PathBuf>,
}

impl WatchRoot {
    pub fn new(path: impl Into<PathBuf>, exclude: Vec<String>) -> Self {
        Self {
            path: path.into(),
            exclude,
            registered: BTreeSet::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directories currently registered for notification.
    pub fn registered(&self) -> &BTreeSet<PathBuf> {
        &self.registered
    }

    pub fn is_registered(&self, dir: &Path) -> bool {
        self.registered.contains(dir)
    }

    /// Hidden names and configured names (e.g. `vendor`) are excluded.
    pub fn is_excluded_name(&self, name: &str) -> bool {
        name.starts_with('.') || self.exclude.iter().any(|e| e == name)
    }

    /// Whether `path` lies in an excluded subtree (or outside the root).
    ///
    /// Only components below the root are checked; the root itself is always
    /// watched even if its own name would be excluded.
    pub fn is_excluded(&self, path: &Path) -> bool {
        let Ok(rel) = path.strip_prefix(&self.path) else {
            return true;
        };
        rel.components().any(|c| match c.as_os_str().to_str() {
            Some(name) => self.is_excluded_name(name),
            None => false,
        })
    }

    /// Register `dir` and every non-excluded directory below it.
    ///
    /// Returns the number of newly registered directories. The first
    /// registration error aborts the walk.
    pub fn register_tree(
        &mut self,
        fs: &dyn FileSystem,
        registrar: &mut dyn DirRegistrar,
        dir: &Path,
    ) -> Result<usize> {
        if self.is_excluded(dir) {
            debug!(?dir, "skipping excluded directory");
            return Ok(0);
        }

        let mut added = 0;
        let mut stack = vec![dir.to_path_buf()];

        while let Some(current) = stack.pop() {
            if !self.registered.contains(&current) {
                registrar.register(&current)?;
                trace!(dir = ?current, "registered directory");
                self.registered.insert(current.clone());
                added += 1;
            }

            for child in fs.read_dir(&current)? {
                if !fs.is_dir(&child) {
                    continue;
                }
                let excluded = child
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|name| self.is_excluded_name(name));
                if excluded {
                    debug!(dir = ?child, "skipping excluded subtree");
                    continue;
                }
                stack.push(child);
            }
        }

        Ok(added)
    }

    /// Drop `dir` and everything below it from the registered set.
    ///
    /// The OS drops its watch on removal, so this is bookkeeping only.
    pub fn forget_tree(&mut self, dir: &Path) -> usize {
        let before = self.registered.len();
        self.registered.retain(|p| !p.starts_with(dir));
        before - self.registered.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[derive(Default)]
    struct Recorder {
        dirs: Vec<PathBuf>,
        fail_on: Option<PathBuf>,
    }

    impl DirRegistrar for Recorder {
        fn register(&mut self, dir: &Path) -> Result<()> {
            if self.fail_on.as_deref() == Some(dir) {
                return Err(DevloopError::WatchRegistration {
                    path: dir.to_path_buf(),
                    source: notify::Error::generic("boom"),
                });
            }
            self.dirs.push(dir.to_path_buf());
            Ok(())
        }
    }

    fn tree() -> MockFileSystem {
        let fs = MockFileSystem::new();
        fs.add_file("/repo/a/a.go");
        fs.add_dir("/repo/a/inner");
        fs.add_file("/repo/.git/HEAD");
        fs.add_dir("/repo/.git/objects");
        fs.add_file("/repo/vendor/dep/dep.go");
        fs.add_file("/repo/b/b.go");
        fs
    }

    #[test]
    fn only_visible_non_vendor_directories_are_registered() {
        let fs = tree();
        let mut root = WatchRoot::new("/repo", vec!["vendor".to_string()]);
        let mut rec = Recorder::default();

        let added = root
            .register_tree(&fs, &mut rec, Path::new("/repo"))
            .unwrap();

        let expected: BTreeSet<PathBuf> = ["/repo", "/repo/a", "/repo/a/inner", "/repo/b"]
            .iter()
            .map(PathBuf::from)
            .collect();
        assert_eq!(added, 4);
        assert_eq!(root.registered(), &expected);
        assert_eq!(rec.dirs.len(), 4);
    }

    #[test]
    fn registration_failure_aborts_the_walk() {
        let fs = tree();
        let mut root = WatchRoot::new("/repo", vec!["vendor".to_string()]);
        let mut rec = Recorder {
            fail_on: Some(PathBuf::from("/repo/b")),
            ..Default::default()
        };

        let err = root
            .register_tree(&fs, &mut rec, Path::new("/repo"))
            .unwrap_err();
        assert!(matches!(err, DevloopError::WatchRegistration { .. }));
    }

    #[test]
    fn excluded_paths_are_detected_below_root_only() {
        let root = WatchRoot::new("/home/me/.work/repo", vec!["vendor".to_string()]);
        assert!(!root.is_excluded(Path::new("/home/me/.work/repo")));
        assert!(!root.is_excluded(Path::new("/home/me/.work/repo/pkg/x.go")));
        assert!(root.is_excluded(Path::new("/home/me/.work/repo/.git/x")));
        assert!(root.is_excluded(Path::new("/home/me/.work/repo/pkg/vendor/y")));
        assert!(root.is_excluded(Path::new("/tmp/other")));
    }

    #[test]
    fn reregistering_is_idempotent_and_forget_prunes_subtree() {
        let fs = tree();
        let mut root = WatchRoot::new("/repo", vec!["vendor".to_string()]);
        let mut rec = Recorder::default();

        root.register_tree(&fs, &mut rec, Path::new("/repo")).unwrap();
        let again = root
            .register_tree(&fs, &mut rec, Path::new("/repo/a"))
            .unwrap();
        assert_eq!(again, 0);

        assert_eq!(root.forget_tree(Path::new("/repo/a")), 2);
        assert!(!root.is_registered(Path::new("/repo/a/inner")));
        assert!(root.is_registered(Path::new("/repo/b")));
    }
}
