// src/schedule/scheduler.rs

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::errors::Result;
use crate::exec::Action;
use crate::types::PackageKey;

/// Settings for an [`ExecutionScheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Minimum spacing between the starts of two runs of the same key.
    pub cooldown: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(4),
        }
    }
}

/// What a call to [`ExecutionScheduler::run`] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// This call owned the key and ran the action this many times
    /// (first run plus coalesced re-runs).
    Ran { invocations: usize },
    /// The key was already running past its cooldown; one more run was
    /// queued on the owner.
    Requeued,
    /// The key was already running inside its cooldown; nothing happens.
    Dropped,
}

/// Per-key state while a run is in flight. A key without an entry is idle.
#[derive(Debug, Clone, Copy)]
struct SchedulerEntry {
    started_at: Instant,
    requeue_requested: bool,
}

/// Runs an action per key with single-flight, cooldown and coalescing.
///
/// - At most one action per key runs at a time.
/// - Consecutive starts for one key are at least `cooldown` apart, unless a
///   re-run was requested after the cooldown already elapsed.
/// - A request arriving after the cooldown while a run is in flight is never
///   lost: the owner runs the action once more when it finishes.
/// - Requests inside the cooldown are dropped.
#[derive(Debug)]
pub struct ExecutionScheduler {
    cooldown: Duration,
    entries: Mutex<HashMap<PackageKey, SchedulerEntry>>,
}

impl ExecutionScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            cooldown: config.cooldown,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Request a run of `action` for `key`.
    ///
    /// If the key is idle this call becomes its owner and only returns once
    /// the action (and every re-run requested meanwhile) has finished. An
    /// action error is returned right away; a pending re-run is discarded
    /// with it.
    pub async fn run<A>(&self, key: &str, action: &A) -> Result<Admission>
    where
        A: Action + ?Sized,
    {
        match self.admit(key) {
            Admission::Ran { .. } => {}
            other => return Ok(other),
        }

        let mut guard = EntryGuard {
            scheduler: self,
            key,
            armed: true,
        };

        let mut invocations = 0;
        loop {
            invocations += 1;
            debug!(pkg = %key, invocation = invocations, "running action");
            action.call(key).await?;
            debug!(pkg = %key, "done");

            if !self.finish_or_requeue(key) {
                guard.armed = false;
                break;
            }
        }

        Ok(Admission::Ran { invocations })
    }

    /// Whether `key` currently has a run in flight.
    pub fn is_running(&self, key: &str) -> bool {
        self.entries().contains_key(key)
    }

    /// Number of keys with a run in flight.
    pub fn running_count(&self) -> usize {
        self.entries().len()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<PackageKey, SchedulerEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Idle → Running (owner), or fold the request into the running owner.
    fn admit(&self, key: &str) -> Admission {
        let mut entries = self.entries();
        let now = Instant::now();

        match entries.get_mut(key) {
            Some(entry) => {
                if now.duration_since(entry.started_at) > self.cooldown {
                    if !entry.requeue_requested {
                        info!(pkg = %key, "requeuing");
                    }
                    entry.requeue_requested = true;
                    Admission::Requeued
                } else {
                    debug!(pkg = %key, "within cooldown; dropping request");
                    Admission::Dropped
                }
            }
            None => {
                entries.insert(
                    key.to_string(),
                    SchedulerEntry {
                        started_at: now,
                        requeue_requested: false,
                    },
                );
                Admission::Ran { invocations: 0 }
            }
        }
    }

    /// Called by the owner after each run. Either consumes a pending requeue
    /// (returns `true`, restarting the cooldown) or removes the entry.
    fn finish_or_requeue(&self, key: &str) -> bool {
        let mut entries = self.entries();
        match entries.get_mut(key) {
            Some(entry) if entry.requeue_requested => {
                entry.requeue_requested = false;
                entry.started_at = Instant::now();
                true
            }
            _ => {
                entries.remove(key);
                false
            }
        }
    }
}

/// Returns a key to idle if its owner bails out early (error or dropped
/// future).
struct EntryGuard<'a> {
    scheduler: &'a ExecutionScheduler,
    key: &'a str,
    armed: bool,
}

impl Drop for EntryGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.scheduler.entries().remove(self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(cooldown_ms: u64) -> ExecutionScheduler {
        ExecutionScheduler::new(SchedulerConfig {
            cooldown: Duration::from_millis(cooldown_ms),
        })
    }

    #[tokio::test]
    async fn idle_key_is_admitted_as_owner_and_removed_afterwards() {
        let s = scheduler(1000);
        assert_eq!(s.admit("a"), Admission::Ran { invocations: 0 });
        assert!(s.is_running("a"));
        assert!(!s.finish_or_requeue("a"));
        assert!(!s.is_running("a"));
    }

    #[tokio::test]
    async fn request_inside_cooldown_is_dropped() {
        let s = scheduler(1000);
        s.admit("a");
        assert_eq!(s.admit("a"), Admission::Dropped);
        assert!(!s.finish_or_requeue("a"));
    }

    #[tokio::test]
    async fn request_after_cooldown_requeues_once() {
        let s = scheduler(0);
        s.admit("a");
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(s.admit("a"), Admission::Requeued);
        assert_eq!(s.admit("a"), Admission::Requeued);

        assert!(s.finish_or_requeue("a"));
        assert!(s.is_running("a"));
        assert!(!s.finish_or_requeue("a"));
        assert_eq!(s.running_count(), 0);
    }

    #[tokio::test]
    async fn dropped_owner_future_returns_key_to_idle() {
        let s = scheduler(1000);
        let action = crate::exec::action_fn(|_key| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });

        let run = s.run("a", &action);
        let _ = tokio::time::timeout(Duration::from_millis(20), run).await;
        assert!(!s.is_running("a"));
    }
}
