// src/watch/pending.rs

use std::collections::BTreeSet;

use crate::types::PackageKey;

/// Keys seen since the last emission.
///
/// Owned by the watcher's event loop; nothing else mutates it.
#[derive(Debug, Default)]
pub struct PendingSet {
    keys: BTreeSet<PackageKey>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the key was not pending yet.
    pub fn insert(&mut self, key: PackageKey) -> bool {
        self.keys.insert(key)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Take every pending key, leaving the set empty.
    pub fn take(&mut self) -> Vec<PackageKey> {
        std::mem::take(&mut self.keys).into_iter().collect()
    }
}
