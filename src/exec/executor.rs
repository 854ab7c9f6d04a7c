// src/exec/executor.rs

//! Runs command templates as child processes.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::errors::{DevloopError, Result};
use crate::exec::backend::{Action, ActionFuture};
use crate::exec::command::{CommandTemplate, TemplateContext};
use crate::supervise::process::{ChildProcess, Launcher};
use crate::types::ExitOutcome;

/// Builds and runs processes from a [`CommandTemplate`].
///
/// - As an [`Action`] it runs the command once per package and waits for it.
/// - As a [`Launcher`] it starts the long-running command for the
///   supervisor, in its own process group on Unix so the whole tree can be
///   signalled at once.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    template: Arc<CommandTemplate>,
}

impl CommandExecutor {
    pub fn new(template: CommandTemplate) -> Self {
        Self {
            template: Arc::new(template),
        }
    }

    pub fn template(&self) -> &CommandTemplate {
        &self.template
    }

    /// Run the command to completion.
    ///
    /// Only a failure to launch (or to wait on) the process is an error; a
    /// non-zero exit is reported through the returned [`ExitOutcome`].
    pub async fn run(&self, ctx: &TemplateContext<'_>) -> Result<ExitOutcome> {
        let mut cmd = self.template.command(ctx)?;
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| DevloopError::LaunchFailed {
            program: self.template.program().to_string(),
            source,
        })?;

        let status = child
            .wait()
            .await
            .with_context(|| format!("waiting for '{}'", self.template.program()))?;

        Ok(ExitOutcome::from(status))
    }
}

impl Action for CommandExecutor {
    fn call<'a>(&'a self, key: &'a str) -> ActionFuture<'a> {
        Box::pin(async move {
            info!(pkg = %key, cmd = %self.template, "starting");
            let outcome = self.run(&TemplateContext::for_pkg(key)).await?;
            if outcome.is_success() {
                info!(pkg = %key, "done: {outcome}");
            } else {
                warn!(pkg = %key, "done: {outcome}");
            }
            Ok(())
        })
    }
}

impl Launcher for CommandExecutor {
    type Process = ChildProcess;

    fn launch(&self) -> Result<ChildProcess> {
        let mut cmd = self.template.command(&TemplateContext::default())?;
        #[cfg(unix)]
        cmd.process_group(0);
        cmd.kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| DevloopError::LaunchFailed {
            program: self.template.program().to_string(),
            source,
        })?;
        Ok(ChildProcess::new(child))
    }
}
