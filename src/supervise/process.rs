// src/supervise/process.rs

//! Process capabilities used by the supervisor.
//!
//! The supervisor's state machine only ever talks to these traits; how a
//! process is started and stopped on a given platform lives here.

use std::future::Future;
use std::io;
use std::pin::Pin;

use tokio::process::Child;

use crate::errors::Result;
use crate::types::ExitOutcome;

/// Boxed future returned by [`ManagedProcess::wait`].
pub type WaitFuture<'a> = Pin<Box<dyn Future<Output = io::Result<ExitOutcome>> + Send + 'a>>;

/// Ways to ask a process to stop.
pub trait Terminate {
    /// Ask the process to exit (SIGINT to the process group on Unix).
    fn signal_graceful(&mut self) -> io::Result<()>;
    /// Force the process to exit.
    fn kill(&mut self) -> io::Result<()>;
}

/// A running process owned by the supervisor.
pub trait ManagedProcess: Terminate + Send + 'static {
    fn id(&self) -> Option<u32>;

    /// Wait for the process to exit. Must be cancel-safe: the supervisor
    /// drops this future whenever it needs to signal the process.
    fn wait(&mut self) -> WaitFuture<'_>;
}

/// Starts fresh instances of the supervised process.
pub trait Launcher: Send + Sync + 'static {
    type Process: ManagedProcess;

    /// Start a new instance. An error here is fatal to the supervisor.
    fn launch(&self) -> Result<Self::Process>;
}

/// [`ManagedProcess`] backed by a Tokio child process.
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
}

impl ChildProcess {
    pub fn new(child: Child) -> Self {
        Self { child }
    }
}

impl ManagedProcess for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn wait(&mut self) -> WaitFuture<'_> {
        Box::pin(async move { self.child.wait().await.map(ExitOutcome::from) })
    }
}

#[cfg(unix)]
impl ChildProcess {
    /// Signal the child's whole process group (it was spawned as leader).
    fn signal_group(&self, signal: libc::c_int) -> io::Result<()> {
        let Some(pid) = self.child.id() else {
            // Already reaped.
            return Ok(());
        };
        // SAFETY: kill(2) has no memory-safety preconditions.
        let rc = unsafe { libc::kill(-(pid as libc::pid_t), signal) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            Ok(())
        } else {
            Err(err)
        }
    }
}

#[cfg(unix)]
impl Terminate for ChildProcess {
    fn signal_graceful(&mut self) -> io::Result<()> {
        self.signal_group(libc::SIGINT)
    }

    fn kill(&mut self) -> io::Result<()> {
        self.signal_group(libc::SIGKILL)?;
        match self.child.start_kill() {
            Err(e) if e.kind() != io::ErrorKind::InvalidInput => Err(e),
            _ => Ok(()),
        }
    }
}

#[cfg(not(unix))]
impl Terminate for ChildProcess {
    // No portable interrupt for a detached child here; stop it outright.
    fn signal_graceful(&mut self) -> io::Result<()> {
        self.kill()
    }

    fn kill(&mut self) -> io::Result<()> {
        match self.child.start_kill() {
            Err(e) if e.kind() != io::ErrorKind::InvalidInput => Err(e),
            _ => Ok(()),
        }
    }
}
