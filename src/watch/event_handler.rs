// src/watch/event_handler.rs

//! Turning raw `notify` events into registrations and pending keys.

use std::path::Path;
use std::sync::Arc;

use notify::event::{AccessKind, AccessMode, ModifyKind};
use notify::{Event, EventKind};
use tracing::{debug, warn};

use crate::fs::FileSystem;
use crate::watch::path_utils::has_source_extension;
use crate::watch::pending::PendingSet;
use crate::watch::resolver::KeyResolver;
use crate::watch::root::{DirRegistrar, WatchRoot};

/// State owned by the watcher's background task.
///
/// Synchronous: the event loop feeds it one event at a time and asks it for
/// the pending keys when the debounce timer fires.
pub struct EventProcessor<R: DirRegistrar> {
    root: WatchRoot,
    registrar: R,
    resolver: KeyResolver,
    extensions: Vec<String>,
    fs: Arc<dyn FileSystem>,
    pending: PendingSet,
}

impl<R: DirRegistrar> EventProcessor<R> {
    pub fn new(
        root: WatchRoot,
        registrar: R,
        resolver: KeyResolver,
        extensions: Vec<String>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            root,
            registrar,
            resolver,
            extensions,
            fs,
            pending: PendingSet::new(),
        }
    }

    pub fn root(&self) -> &WatchRoot {
        &self.root
    }

    pub fn pending(&self) -> &PendingSet {
        &self.pending
    }

    pub fn take_pending(&mut self) -> Vec<String> {
        self.pending.take()
    }

    /// Process a single event.
    ///
    /// Returns the number of source changes it resolved to a key (whether or
    /// not the key was already pending); the caller uses a non-zero value to
    /// (re)arm the debounce timer.
    pub fn process(&mut self, event: &Event) -> usize {
        let mut resolved = 0;

        match event.kind {
            EventKind::Create(_) => {
                for path in &event.paths {
                    if self.fs.is_dir(path) {
                        resolved += self.handle_new_dir(path);
                    } else {
                        resolved += self.handle_file_change(path);
                    }
                }
            }
            // Renames report the old path, the new path, or both. A directory
            // moved in arrives here rather than as a create.
            EventKind::Modify(ModifyKind::Name(_)) => {
                for path in &event.paths {
                    let is_dir = self.fs.is_dir(path);
                    let registered = self.root.is_registered(path);
                    if is_dir && !registered {
                        resolved += self.handle_new_dir(path);
                    } else if !is_dir && registered {
                        let n = self.root.forget_tree(path);
                        debug!(dir = ?path, forgotten = n, "watched directory moved away");
                    } else if !is_dir {
                        resolved += self.handle_file_change(path);
                    }
                }
            }
            EventKind::Remove(_) => {
                for path in &event.paths {
                    if self.root.is_registered(path) {
                        let n = self.root.forget_tree(path);
                        debug!(dir = ?path, forgotten = n, "watched directory removed");
                    } else {
                        resolved += self.handle_file_change(path);
                    }
                }
            }
            EventKind::Modify(_) | EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
                for path in &event.paths {
                    resolved += self.handle_file_change(path);
                }
            }
            _ => {}
        }

        resolved
    }

    /// Register a new subtree and queue the packages of any source files
    /// already inside it: they were written before the watch existed and
    /// will not produce events of their own.
    fn handle_new_dir(&mut self, dir: &Path) -> usize {
        if self.root.is_excluded(dir) {
            debug!(?dir, "new directory is excluded; not watching");
            return 0;
        }
        match self
            .root
            .register_tree(self.fs.as_ref(), &mut self.registrar, dir)
        {
            Ok(n) => debug!(?dir, registered = n, "watching new directory"),
            // The directory may already be gone again; keep going.
            Err(err) => {
                warn!(?dir, error = %err, "failed to watch new directory");
                return 0;
            }
        }

        let dirs: Vec<_> = self
            .root
            .registered()
            .iter()
            .filter(|d| d.starts_with(dir))
            .cloned()
            .collect();

        let mut resolved = 0;
        for d in dirs {
            let entries = match self.fs.read_dir(&d) {
                Ok(entries) => entries,
                Err(err) => {
                    debug!(dir = ?d, error = %err, "cannot scan new directory");
                    continue;
                }
            };
            for entry in entries {
                if !self.fs.is_dir(&entry) {
                    resolved += self.handle_file_change(&entry);
                }
            }
        }
        resolved
    }

    fn handle_file_change(&mut self, path: &Path) -> usize {
        if !has_source_extension(path, &self.extensions) || self.root.is_excluded(path) {
            return 0;
        }

        let Some(dir) = path.parent() else {
            return 0;
        };

        match self.resolver.resolve(dir) {
            Some(key) => {
                debug!(?path, pkg = %key, "source change");
                self.pending.insert(key);
                1
            }
            None => {
                warn!(?path, "couldn't resolve a package for changed file; ignoring");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Result;
    use crate::fs::mock::MockFileSystem;
    use notify::event::{CreateKind, DataChange, RenameMode};
    use std::path::PathBuf;

    struct NullRegistrar;

    impl DirRegistrar for NullRegistrar {
        fn register(&mut self, _dir: &Path) -> Result<()> {
            Ok(())
        }
    }

    fn processor(fs: MockFileSystem) -> EventProcessor<NullRegistrar> {
        let mut root = WatchRoot::new("/repo", vec!["vendor".to_string()]);
        root.register_tree(&fs, &mut NullRegistrar, Path::new("/repo"))
            .unwrap();
        EventProcessor::new(
            root,
            NullRegistrar,
            KeyResolver::relative("/repo"),
            vec!["go".to_string()],
            Arc::new(fs),
        )
    }

    fn modify(path: &str) -> Event {
        Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(PathBuf::from(path))
    }

    #[test]
    fn repeated_writes_collapse_into_one_pending_key() {
        let fs = MockFileSystem::new();
        fs.add_file("/repo/a/a.go");
        let mut p = processor(fs);

        assert_eq!(p.process(&modify("/repo/a/a.go")), 1);
        assert_eq!(p.process(&modify("/repo/a/a.go")), 1);
        assert_eq!(p.process(&modify("/repo/a/a_test.go")), 1);
        assert_eq!(p.pending().len(), 1);
        assert_eq!(p.take_pending(), vec!["a".to_string()]);
        assert!(p.pending().is_empty());
    }

    #[test]
    fn non_source_and_excluded_files_are_ignored() {
        let fs = MockFileSystem::new();
        fs.add_file("/repo/a/a.go");
        let mut p = processor(fs);

        assert_eq!(p.process(&modify("/repo/a/notes.txt")), 0);
        assert_eq!(p.process(&modify("/repo/vendor/dep/dep.go")), 0);
        assert_eq!(p.process(&modify("/repo/.cache/x.go")), 0);
        assert!(p.pending().is_empty());
    }

    #[test]
    fn created_directory_is_registered_unless_excluded() {
        let fs = MockFileSystem::new();
        fs.add_file("/repo/a/a.go");
        let mut p = processor(fs.clone());

        fs.add_file("/repo/c/deep/c.go");
        fs.add_dir("/repo/c/.hidden");
        let created = Event::new(EventKind::Create(CreateKind::Folder))
            .add_path(PathBuf::from("/repo/c"));
        // `c.go` was already there when the directory showed up.
        assert_eq!(p.process(&created), 1);
        assert_eq!(p.take_pending(), vec!["c/deep".to_string()]);
        assert!(p.root().is_registered(Path::new("/repo/c")));
        assert!(p.root().is_registered(Path::new("/repo/c/deep")));
        assert!(!p.root().is_registered(Path::new("/repo/c/.hidden")));

        fs.add_dir("/repo/vendor/lib");
        let vendored = Event::new(EventKind::Create(CreateKind::Folder))
            .add_path(PathBuf::from("/repo/vendor"));
        p.process(&vendored);
        assert!(!p.root().is_registered(Path::new("/repo/vendor")));
    }

    #[test]
    fn renamed_directories_are_registered_and_forgotten() {
        let fs = MockFileSystem::new();
        fs.add_file("/repo/a/a.go");
        let mut p = processor(fs.clone());

        fs.add_file("/repo/moved/m.go");
        let moved_in = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path(PathBuf::from("/repo/moved"));
        assert_eq!(p.process(&moved_in), 1);
        assert!(p.root().is_registered(Path::new("/repo/moved")));
        assert_eq!(p.take_pending(), vec!["moved".to_string()]);

        fs.remove("/repo/a");
        let moved_out = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(PathBuf::from("/repo/a"));
        assert_eq!(p.process(&moved_out), 0);
        assert!(!p.root().is_registered(Path::new("/repo/a")));
    }

    #[test]
    fn file_renamed_into_place_is_a_source_change() {
        let fs = MockFileSystem::new();
        fs.add_file("/repo/a/a.go");
        let mut p = processor(fs);

        let saved = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/repo/a/.a.go.swp"))
            .add_path(PathBuf::from("/repo/a/a.go"));
        assert_eq!(p.process(&saved), 1);
        assert_eq!(p.take_pending(), vec!["a".to_string()]);
    }

    #[test]
    fn unresolvable_paths_are_dropped() {
        let fs = MockFileSystem::new();
        fs.add_dir("/repo");
        let mut root = WatchRoot::new("/repo", vec![]);
        root.register_tree(&fs, &mut NullRegistrar, Path::new("/repo"))
            .unwrap();
        let mut p = EventProcessor::new(
            root,
            NullRegistrar,
            KeyResolver::source_root(vec![PathBuf::from("/repo")], "src"),
            vec!["go".to_string()],
            Arc::new(fs),
        );

        // Lives in the root but outside `/repo/src`.
        assert_eq!(p.process(&modify("/repo/tools/gen.go")), 0);
        assert_eq!(p.process(&modify("/repo/src/app/main.go")), 1);
        assert_eq!(p.take_pending(), vec!["app".to_string()]);
    }
}
