// src/watch/watcher.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, Watcher};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::errors::{DevloopError, Result};
use crate::fs::{FileSystem, RealFileSystem};
use crate::types::PackageKey;
use crate::watch::event_handler::EventProcessor;
use crate::watch::resolver::KeyResolver;
use crate::watch::root::{DirRegistrar, WatchRoot};

/// Stream of changed package keys produced by a [`ChangeWatcher`].
pub type Changes = mpsc::UnboundedReceiver<PackageKey>;

/// Raw events as delivered by the notify backend.
pub type RawEvents = mpsc::UnboundedReceiver<notify::Result<Event>>;

/// Settings for a [`ChangeWatcher`].
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Directory to watch (recursively).
    pub root: PathBuf,
    /// Quiet period after the last relevant change before keys are emitted.
    pub debounce: Duration,
    /// Directory names never descended into, in addition to dot-dirs.
    pub exclude: Vec<String>,
    /// File extensions (without dot) that count as source changes.
    pub extensions: Vec<String>,
}

/// Watches a directory tree and emits the package keys of changed sources.
///
/// Dropping the watcher without calling [`close`](Self::close) also stops
/// the background task, but nothing waits for it to finish.
#[derive(Debug)]
pub struct ChangeWatcher {
    root: PathBuf,
    changes: Option<Changes>,
    close_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ChangeWatcher {
    /// Register `config.root` and spawn the event loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: WatchConfig, resolver: KeyResolver) -> Result<Self> {
        Self::start_with_fs(config, resolver, Arc::new(RealFileSystem))
    }

    pub fn start_with_fs(
        config: WatchConfig,
        resolver: KeyResolver,
        fs: Arc<dyn FileSystem>,
    ) -> Result<Self> {
        if !fs.is_dir(&config.root) {
            return Err(DevloopError::InvalidRoot(config.root));
        }
        let root_path = fs.canonicalize(&config.root)?;

        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

        // Called synchronously on notify's own thread.
        let mut backend = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = raw_tx.send(res);
            },
            Config::default(),
        )
        .map_err(|source| DevloopError::WatchRegistration {
            path: root_path.clone(),
            source,
        })?;

        let mut root = WatchRoot::new(root_path.clone(), config.exclude.clone());
        let registered = root.register_tree(fs.as_ref(), &mut backend, &root_path)?;
        info!(root = ?root_path, directories = registered, "file watcher started");

        let processor = EventProcessor::new(root, backend, resolver, config.extensions, fs);
        Ok(Self::spawn(processor, raw_rx, config.debounce))
    }

    /// Spawn the event loop around an already-registered processor.
    ///
    /// `start` uses this with the real notify backend; tests can feed
    /// synthetic events through `raw_events` instead.
    pub fn spawn<R: DirRegistrar + 'static>(
        processor: EventProcessor<R>,
        raw_events: RawEvents,
        debounce: Duration,
    ) -> Self {
        let root = processor.root().path().to_path_buf();
        let (changes_tx, changes_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();

        let task = tokio::spawn(event_loop(
            processor, raw_events, close_rx, changes_tx, debounce,
        ));

        Self {
            root,
            changes: Some(changes_rx),
            close_tx: Some(close_tx),
            task: Some(task),
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Take the stream of changed keys. Only the first call returns `Some`.
    ///
    /// The stream ends once [`close`](Self::close) has been called and the
    /// event loop has flushed its last keys.
    pub fn changes(&mut self) -> Option<Changes> {
        self.changes.take()
    }

    /// Stop the event loop, wait for it to finish and release the
    /// notification handle. Later calls are no-ops.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| anyhow::anyhow!("watcher task failed: {e}"))?;
        }
        Ok(())
    }
}

async fn event_loop<R: DirRegistrar>(
    mut processor: EventProcessor<R>,
    mut raw_events: RawEvents,
    mut close_rx: oneshot::Receiver<()>,
    changes_tx: mpsc::UnboundedSender<PackageKey>,
    debounce: Duration,
) {
    let timer = sleep(debounce);
    tokio::pin!(timer);
    let mut armed = false;
    let mut raw_open = true;

    loop {
        tokio::select! {
            _ = &mut close_rx => {
                debug!("watcher close requested");
                break;
            }
            maybe = raw_events.recv(), if raw_open => match maybe {
                Some(Ok(event)) => {
                    if processor.process(&event) > 0 {
                        timer.as_mut().reset(Instant::now() + debounce);
                        armed = true;
                    }
                }
                Some(Err(err)) => warn!(error = %err, "file watch error"),
                None => {
                    debug!("raw event channel closed");
                    raw_open = false;
                }
            },
            _ = &mut timer, if armed => {
                armed = false;
                emit(&mut processor, &changes_tx);
            }
        }
    }

    // Anything already settled is still reported before the stream ends.
    emit(&mut processor, &changes_tx);
    drop(processor);
    info!("closed package watcher");
}

fn emit<R: DirRegistrar>(
    processor: &mut EventProcessor<R>,
    changes_tx: &mpsc::UnboundedSender<PackageKey>,
) {
    for key in processor.take_pending() {
        debug!(pkg = %key, "emitting change");
        if changes_tx.send(key).is_err() {
            debug!("change stream receiver dropped");
            return;
        }
    }
}
