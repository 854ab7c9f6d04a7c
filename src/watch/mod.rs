// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Registering every non-excluded directory under the watch root with a
//!   cross-platform filesystem watcher (`notify`).
//! - Mapping changed source files to package keys ([`KeyResolver`]).
//! - Debouncing bursts of changes into one key per quiet period.
//!
//! It does **not** know what happens with a changed package; consumers pull
//! keys from [`ChangeWatcher::changes`].

pub mod event_handler;
pub mod path_utils;
pub mod pending;
pub mod resolver;
pub mod root;
pub mod watcher;

pub use event_handler::EventProcessor;
pub use pending::PendingSet;
pub use resolver::{KeyResolver, DEFAULT_SOURCE_SUBDIR, ROOT_KEY};
pub use root::{DirRegistrar, WatchRoot, DEFAULT_EXCLUDES};
pub use watcher::{ChangeWatcher, Changes, RawEvents, WatchConfig};
