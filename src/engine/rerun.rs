// src/engine/rerun.rs

use std::fmt;
use std::future::Future;

use tracing::{debug, info};

use crate::errors::Result;
use crate::supervise::{Launcher, ProcessSupervisor, SupervisorConfig};
use crate::watch::Changes;

/// Keeps one long-running process alive and restarts it on every change.
pub struct Rerun<L: Launcher> {
    supervisor: ProcessSupervisor<L>,
}

impl<L: Launcher> fmt::Debug for Rerun<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rerun")
            .field("supervisor", &self.supervisor)
            .finish()
    }
}

impl<L: Launcher> Rerun<L> {
    pub fn new(launcher: L, config: SupervisorConfig) -> Self {
        Self {
            supervisor: ProcessSupervisor::new(launcher, config),
        }
    }

    pub fn supervisor(&self) -> &ProcessSupervisor<L> {
        &self.supervisor
    }

    /// Start the supervisor and restart it for each key from `changes`.
    ///
    /// Returns once `shutdown` resolves or the change stream ends (after
    /// shutting the supervisor down), or as soon as the supervisor halts on
    /// a fatal error.
    pub async fn run<S>(self, mut changes: Changes, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        self.supervisor.start();
        info!("rerun loop started");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }

                maybe_key = changes.recv() => {
                    match maybe_key {
                        Some(key) => {
                            info!(pkg = %key, "change detected; restarting");
                            self.supervisor.restart();
                        }
                        None => {
                            debug!("change stream closed");
                            break;
                        }
                    }
                }

                halted = self.supervisor.terminated() => {
                    // Only a fatal error ends the run loop on its own.
                    return halted;
                }
            }
        }

        self.supervisor.shutdown().await?;
        info!("rerun loop stopped");
        Ok(())
    }
}
