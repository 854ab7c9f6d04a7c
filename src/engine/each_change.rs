// src/engine/each_change.rs

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::errors::{DevloopError, Result};
use crate::exec::Action;
use crate::schedule::{Admission, ExecutionScheduler};
use crate::watch::Changes;

/// Runs an action for every changed package, through an
/// [`ExecutionScheduler`].
///
/// Each key gets its own task so distinct packages run concurrently; the
/// scheduler takes care of same-key coalescing.
pub struct EachChange<A: Action + 'static> {
    scheduler: Arc<ExecutionScheduler>,
    action: Arc<A>,
}

impl<A: Action + 'static> fmt::Debug for EachChange<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EachChange")
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl<A: Action + 'static> EachChange<A> {
    pub fn new(scheduler: ExecutionScheduler, action: A) -> Self {
        Self {
            scheduler: Arc::new(scheduler),
            action: Arc::new(action),
        }
    }

    pub fn scheduler(&self) -> &ExecutionScheduler {
        &self.scheduler
    }

    /// Consume `changes` until the stream ends or `shutdown` resolves.
    ///
    /// An action error (e.g. the command cannot be launched) stops the loop
    /// and is returned. In-flight actions are cancelled on the way out.
    pub async fn run<S>(self, mut changes: Changes, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        info!("each-change loop started");
        tokio::pin!(shutdown);

        let mut tasks: JoinSet<Result<Admission>> = JoinSet::new();
        let mut stream_open = true;

        let result = loop {
            if !stream_open && tasks.is_empty() {
                break Ok(());
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break Ok(());
                }

                maybe_key = changes.recv(), if stream_open => {
                    match maybe_key {
                        Some(key) => {
                            debug!(pkg = %key, "change received");
                            let scheduler = Arc::clone(&self.scheduler);
                            let action = Arc::clone(&self.action);
                            tasks.spawn(async move {
                                scheduler.run(&key, action.as_ref()).await
                            });
                        }
                        None => {
                            debug!("change stream closed; draining in-flight actions");
                            stream_open = false;
                        }
                    }
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    match joined {
                        Ok(Ok(admission)) => debug!(?admission, "request finished"),
                        Ok(Err(err)) => {
                            error!("action failed: {err}");
                            break Err(err);
                        }
                        Err(join_err) => {
                            break Err(DevloopError::Other(anyhow::anyhow!(
                                "action task failed: {join_err}"
                            )));
                        }
                    }
                }
            }
        };

        if !tasks.is_empty() {
            debug!(in_flight = tasks.len(), "cancelling in-flight actions");
        }
        tasks.shutdown().await;

        info!("each-change loop stopped");
        result
    }
}
