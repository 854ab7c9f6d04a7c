// src/watch/resolver.rs

//! Mapping changed directories to package keys.

use std::path::{Path, PathBuf};

use crate::types::{PackageKey, ResolverKind};
use crate::watch::path_utils::relative_str;

/// Key used for files living directly in the watch root.
pub const ROOT_KEY: &str = ".";

/// Default source sub-directory for [`KeyResolver::SourceRoot`].
pub const DEFAULT_SOURCE_SUBDIR: &str = "src";

/// Pure mapping from an absolute directory to a [`PackageKey`].
///
/// The strategy is fixed at construction; every event goes through the same
/// one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResolver {
    /// Key is the directory relative to the watch root.
    Relative { root: PathBuf },
    /// Key is the directory relative to `<root>/<source_subdir>` of the
    /// nearest source root containing it.
    SourceRoot {
        roots: Vec<PathBuf>,
        source_subdir: String,
    },
}

impl KeyResolver {
    pub fn relative(root: impl Into<PathBuf>) -> Self {
        KeyResolver::Relative { root: root.into() }
    }

    pub fn source_root(roots: Vec<PathBuf>, source_subdir: impl Into<String>) -> Self {
        KeyResolver::SourceRoot {
            roots,
            source_subdir: source_subdir.into(),
        }
    }

    /// Build the resolver selected by configuration.
    ///
    /// With `SourceRoot` and no explicit roots, the watch root itself is the
    /// only source root (a project-local `src/` layout).
    pub fn from_kind(
        kind: ResolverKind,
        watch_root: &Path,
        source_roots: &[PathBuf],
        source_subdir: &str,
    ) -> Self {
        match kind {
            ResolverKind::Relative => Self::relative(watch_root),
            ResolverKind::SourceRoot => {
                let roots = if source_roots.is_empty() {
                    vec![watch_root.to_path_buf()]
                } else {
                    source_roots.to_vec()
                };
                Self::source_root(roots, source_subdir)
            }
        }
    }

    pub fn kind(&self) -> ResolverKind {
        match self {
            KeyResolver::Relative { .. } => ResolverKind::Relative,
            KeyResolver::SourceRoot { .. } => ResolverKind::SourceRoot,
        }
    }

    /// Resolve `dir` to a key, or `None` when it is outside every root this
    /// resolver knows about.
    pub fn resolve(&self, dir: &Path) -> Option<PackageKey> {
        match self {
            KeyResolver::Relative { root } => {
                let rel = relative_str(root, dir)?;
                if rel.is_empty() {
                    Some(ROOT_KEY.to_string())
                } else {
                    Some(rel)
                }
            }
            KeyResolver::SourceRoot {
                roots,
                source_subdir,
            } => {
                // Nearest root = the one whose source dir is the longest prefix.
                roots
                    .iter()
                    .map(|root| root.join(source_subdir))
                    .filter_map(|src| {
                        let rel = relative_str(&src, dir)?;
                        Some((src.components().count(), rel))
                    })
                    .filter(|(_, rel)| !rel.is_empty())
                    .max_by_key(|(depth, _)| *depth)
                    .map(|(_, rel)| rel)
            }
        }
    }
}
