use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use devloop::errors::{DevloopError, Result};
use devloop::exec::{Action, ActionFuture};
use devloop::watch::DirRegistrar;

/// An action that records every invocation instead of running a command.
///
/// - optional delay per call, to keep a key "running" for a while
/// - optional failure, to exercise the error path
/// - tracks the highest number of concurrently running calls
///
/// Configure it before cloning; clones share the recorded calls.
#[derive(Clone, Default)]
pub struct RecordingAction {
    inner: Arc<Inner>,
    delay: Duration,
    fail: bool,
}

#[derive(Default)]
struct Inner {
    calls: Mutex<Vec<(String, Instant)>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl RecordingAction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `delay` before returning.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every call is recorded and then fails.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Keys in invocation order.
    pub fn calls(&self) -> Vec<String> {
        let guard = self.inner.calls.lock().unwrap();
        guard.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn count_for(&self, key: &str) -> usize {
        let guard = self.inner.calls.lock().unwrap();
        guard.iter().filter(|(k, _)| k == key).count()
    }

    /// Start times of the invocations for `key`.
    pub fn start_times(&self, key: &str) -> Vec<Instant> {
        let guard = self.inner.calls.lock().unwrap();
        guard
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, t)| *t)
            .collect()
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.max_active.load(Ordering::SeqCst)
    }
}

impl Action for RecordingAction {
    fn call<'a>(&'a self, key: &'a str) -> ActionFuture<'a> {
        Box::pin(async move {
            {
                let mut guard = self.inner.calls.lock().unwrap();
                guard.push((key.to_string(), Instant::now()));
            }

            let now_active = self.inner.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.inner.max_active.fetch_max(now_active, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            self.inner.active.fetch_sub(1, Ordering::SeqCst);

            if self.fail {
                return Err(DevloopError::Other(anyhow::anyhow!(
                    "recorded failure for {key}"
                )));
            }
            Ok(())
        })
    }
}

/// A [`DirRegistrar`] that remembers registered directories and can be told
/// to fail for one of them.
#[derive(Clone, Default)]
pub struct RecordingRegistrar {
    registered: Arc<Mutex<Vec<PathBuf>>>,
    fail_on: Option<PathBuf>,
}

impl RecordingRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(path: impl Into<PathBuf>) -> Self {
        Self {
            registered: Arc::default(),
            fail_on: Some(path.into()),
        }
    }

    pub fn registered(&self) -> Vec<PathBuf> {
        self.registered.lock().unwrap().clone()
    }
}

impl DirRegistrar for RecordingRegistrar {
    fn register(&mut self, dir: &Path) -> Result<()> {
        if self.fail_on.as_deref() == Some(dir) {
            return Err(DevloopError::IoError(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("cannot watch {}", dir.display()),
            )));
        }
        self.registered.lock().unwrap().push(dir.to_path_buf());
        Ok(())
    }
}
