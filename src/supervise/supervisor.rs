// src/supervise/supervisor.rs

//! Keeps exactly one instance of a long-running process alive.
//!
//! A single run loop owns the supervisor state. It reacts to three things:
//! - the current process exiting (reported by its monitor task),
//! - restart requests (stop now, relaunch without cooldown),
//! - shutdown requests (stop now, never relaunch).
//!
//! A new process is only launched after the previous one's exit has been
//! observed, so two instances never overlap.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::errors::{DevloopError, Result};
use crate::supervise::process::{Launcher, ManagedProcess};
use crate::types::ExitOutcome;

/// Upper bound on how long [`ProcessSupervisor::shutdown`] waits.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for a [`ProcessSupervisor`].
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Delay before every launch that wasn't requested through `restart`.
    pub cooldown: Duration,
    /// How long a process may take to exit after the graceful signal before
    /// it is killed.
    pub kill_grace: Duration,
    /// Bound on `shutdown`.
    pub shutdown_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(1),
            kill_grace: Duration::from_secs(5),
            shutdown_timeout: SHUTDOWN_TIMEOUT,
        }
    }
}

/// Lifecycle phase of a supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorPhase {
    NotStarted,
    Running,
    StoppingForRestart,
    StoppingForShutdown,
    Terminated,
}

/// Observable supervisor status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorStatus {
    pub phase: SupervisorPhase,
    /// Number of processes launched so far.
    pub launches: u64,
    /// Set when the supervisor halted on a fatal error.
    pub fatal: Option<String>,
}

impl SupervisorStatus {
    fn initial() -> Self {
        Self {
            phase: SupervisorPhase::NotStarted,
            launches: 0,
            fatal: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Request {
    Restart,
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
enum Control {
    Terminate,
}

struct ExitReport {
    generation: u64,
    result: io::Result<ExitOutcome>,
}

/// Handle to the supervised process.
///
/// All methods take `&self`; the handle can be shared behind an `Arc`.
pub struct ProcessSupervisor<L: Launcher> {
    requests: mpsc::UnboundedSender<Request>,
    status: Arc<watch::Sender<SupervisorStatus>>,
    pending: Mutex<Option<RunLoop<L>>>,
    shutdown_timeout: Duration,
}

impl<L: Launcher> std::fmt::Debug for ProcessSupervisor<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

impl<L: Launcher> ProcessSupervisor<L> {
    pub fn new(launcher: L, config: SupervisorConfig) -> Self {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let status = Arc::new(watch::Sender::new(SupervisorStatus::initial()));
        let shutdown_timeout = config.shutdown_timeout;

        let run_loop = RunLoop::new(launcher, config, requests_rx, Arc::clone(&status));

        Self {
            requests: requests_tx,
            status,
            pending: Mutex::new(Some(run_loop)),
            shutdown_timeout,
        }
    }

    /// Start the run loop. Calling it again is a no-op.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let run_loop = match self.pending.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match run_loop {
            Some(run_loop) => {
                self.status
                    .send_modify(|s| s.phase = SupervisorPhase::Running);
                tokio::spawn(run_loop.run());
            }
            None => debug!("supervisor already started"),
        }
    }

    /// Stop the current process and relaunch it right away.
    pub fn restart(&self) {
        match self.phase() {
            SupervisorPhase::NotStarted | SupervisorPhase::Terminated => {
                debug!("restart ignored; supervisor is not running");
            }
            _ => {
                let _ = self.requests.send(Request::Restart);
            }
        }
    }

    /// Stop the current process and wait for the supervisor to terminate.
    ///
    /// Returns [`DevloopError::ShutdownTimeout`] if the process did not go
    /// away within the configured bound.
    pub async fn shutdown(&self) -> Result<()> {
        let never_started = match self.pending.lock() {
            Ok(mut guard) => guard.take().is_some(),
            Err(poisoned) => poisoned.into_inner().take().is_some(),
        };
        if never_started {
            self.status
                .send_modify(|s| s.phase = SupervisorPhase::Terminated);
            info!("shutdown complete (never started)");
            return Ok(());
        }

        let _ = self.requests.send(Request::Shutdown);

        let mut rx = self.status.subscribe();
        match tokio::time::timeout(
            self.shutdown_timeout,
            rx.wait_for(|s| s.phase == SupervisorPhase::Terminated),
        )
        .await
        {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(DevloopError::SupervisorHalted(
                "run loop dropped its status".to_string(),
            )),
            Err(_) => {
                error!(
                    timeout = ?self.shutdown_timeout,
                    "shutdown did not complete in time"
                );
                Err(DevloopError::ShutdownTimeout(self.shutdown_timeout))
            }
        }
    }

    /// Wait until the supervisor is terminated.
    ///
    /// Resolves to the fatal error if the supervisor halted on its own.
    pub async fn terminated(&self) -> Result<()> {
        let mut rx = self.status.subscribe();
        let status = rx
            .wait_for(|s| s.phase == SupervisorPhase::Terminated)
            .await
            .map_err(|_| {
                DevloopError::SupervisorHalted("run loop dropped its status".to_string())
            })?
            .clone();
        match status.fatal {
            Some(msg) => Err(DevloopError::SupervisorHalted(msg)),
            None => Ok(()),
        }
    }

    pub fn phase(&self) -> SupervisorPhase {
        self.status.borrow().phase
    }

    pub fn status(&self) -> SupervisorStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to status changes.
    pub fn subscribe(&self) -> watch::Receiver<SupervisorStatus> {
        self.status.subscribe()
    }
}

/// The process currently owned by the run loop.
struct Current {
    generation: u64,
    control: mpsc::UnboundedSender<Control>,
}

/// State mutated only by the run loop.
struct SupervisorState {
    phase: SupervisorPhase,
    current: Option<Current>,
    cooldown: Duration,
    skip_next_cooldown: bool,
}

struct RunLoop<L: Launcher> {
    launcher: L,
    kill_grace: Duration,
    requests: mpsc::UnboundedReceiver<Request>,
    status: Arc<watch::Sender<SupervisorStatus>>,
    exits_tx: mpsc::UnboundedSender<ExitReport>,
    exits_rx: mpsc::UnboundedReceiver<ExitReport>,
    state: SupervisorState,
    generation: u64,
}

impl<L: Launcher> RunLoop<L> {
    fn new(
        launcher: L,
        config: SupervisorConfig,
        requests: mpsc::UnboundedReceiver<Request>,
        status: Arc<watch::Sender<SupervisorStatus>>,
    ) -> Self {
        let (exits_tx, exits_rx) = mpsc::unbounded_channel();
        Self {
            launcher,
            kill_grace: config.kill_grace,
            requests,
            status,
            exits_tx,
            exits_rx,
            state: SupervisorState {
                phase: SupervisorPhase::Running,
                current: None,
                cooldown: config.cooldown,
                skip_next_cooldown: false,
            },
            generation: 0,
        }
    }

    async fn run(mut self) {
        let launch_timer = sleep(self.state.cooldown);
        tokio::pin!(launch_timer);
        let mut launch_armed = true;
        let mut requests_open = true;

        while self.state.phase != SupervisorPhase::Terminated {
            tokio::select! {
                Some(report) = self.exits_rx.recv() => {
                    if let Some(delay) = self.on_exit(report) {
                        launch_timer.as_mut().reset(Instant::now() + delay);
                        launch_armed = true;
                    }
                }
                request = self.requests.recv(), if requests_open => match request {
                    Some(Request::Restart) => {
                        if self.on_restart() {
                            launch_timer.as_mut().reset(Instant::now());
                        }
                    }
                    Some(Request::Shutdown) => {
                        self.on_shutdown();
                        launch_armed = false;
                    }
                    // A dropped handle can no longer shut us down; do it now.
                    // The closed channel would otherwise be ready forever.
                    None => {
                        debug!("supervisor handle dropped; shutting down");
                        requests_open = false;
                        self.on_shutdown();
                        launch_armed = false;
                    }
                },
                _ = &mut launch_timer, if launch_armed => {
                    launch_armed = false;
                    self.launch();
                }
            }
        }

        info!("shutdown complete");
    }

    fn set_phase(&mut self, phase: SupervisorPhase) {
        debug!(from = ?self.state.phase, to = ?phase, "supervisor phase change");
        self.state.phase = phase;
        self.status.send_modify(|s| s.phase = phase);
    }

    fn halt(&mut self, reason: String) {
        error!(%reason, "supervisor halted");
        self.state.phase = SupervisorPhase::Terminated;
        self.status.send_modify(|s| {
            s.phase = SupervisorPhase::Terminated;
            s.fatal = Some(reason);
        });
    }

    fn launch(&mut self) {
        debug_assert!(self.state.current.is_none(), "previous process still alive");
        self.state.skip_next_cooldown = false;

        let process = match self.launcher.launch() {
            Ok(p) => p,
            Err(err) => {
                self.halt(format!("could not start service: {err}"));
                return;
            }
        };

        self.generation += 1;
        let generation = self.generation;
        info!(pid = ?process.id(), generation, "starting service");

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        tokio::spawn(monitor(
            process,
            generation,
            control_rx,
            self.exits_tx.clone(),
            self.kill_grace,
        ));

        self.state.current = Some(Current {
            generation,
            control: control_tx,
        });
        self.status.send_modify(|s| s.launches += 1);
        if self.state.phase != SupervisorPhase::Running {
            self.set_phase(SupervisorPhase::Running);
        }
    }

    /// Handle a process exit. Returns the delay before the next launch, or
    /// `None` if nothing should be launched.
    fn on_exit(&mut self, report: ExitReport) -> Option<Duration> {
        match &self.state.current {
            Some(current) if current.generation == report.generation => {}
            _ => {
                debug!(generation = report.generation, "ignoring exit of stale process");
                return None;
            }
        }
        self.state.current = None;

        match report.result {
            Ok(ExitOutcome::Success) => info!("service exited successfully"),
            Ok(outcome) => info!("service {outcome}"),
            Err(err) => {
                self.halt(format!("failed waiting for service: {err}"));
                return None;
            }
        }

        if self.state.phase == SupervisorPhase::StoppingForShutdown {
            self.set_phase(SupervisorPhase::Terminated);
            return None;
        }

        let delay = if self.state.skip_next_cooldown {
            Duration::ZERO
        } else {
            info!(cooldown = ?self.state.cooldown, "restarting service after cooldown");
            self.state.cooldown
        };
        self.set_phase(SupervisorPhase::Running);
        Some(delay)
    }

    /// Handle a restart request. Returns `true` if a launch waiting out its
    /// cooldown should happen immediately instead.
    fn on_restart(&mut self) -> bool {
        match self.state.phase {
            SupervisorPhase::Running => {}
            SupervisorPhase::StoppingForRestart => {
                debug!("restart already in progress");
                return false;
            }
            _ => return false,
        }

        self.state.skip_next_cooldown = true;
        match &self.state.current {
            Some(current) => {
                info!("stopping service");
                let _ = current.control.send(Control::Terminate);
                self.set_phase(SupervisorPhase::StoppingForRestart);
                false
            }
            // Between processes: cut the cooldown short.
            None => true,
        }
    }

    fn on_shutdown(&mut self) {
        if matches!(
            self.state.phase,
            SupervisorPhase::StoppingForShutdown | SupervisorPhase::Terminated
        ) {
            return;
        }

        match &self.state.current {
            Some(current) => {
                info!("stopping service for shutdown");
                let _ = current.control.send(Control::Terminate);
                self.set_phase(SupervisorPhase::StoppingForShutdown);
            }
            None => self.set_phase(SupervisorPhase::Terminated),
        }
    }
}

/// Owns one process until it exits, relaying stop requests to it.
async fn monitor<P: ManagedProcess>(
    mut process: P,
    generation: u64,
    mut control: mpsc::UnboundedReceiver<Control>,
    exits: mpsc::UnboundedSender<ExitReport>,
    kill_grace: Duration,
) {
    let grace = sleep(kill_grace);
    tokio::pin!(grace);
    let mut escalating = false;

    let result = loop {
        tokio::select! {
            result = process.wait() => break result,
            Some(Control::Terminate) = control.recv() => {
                if escalating {
                    continue;
                }
                if let Err(err) = process.signal_graceful() {
                    warn!(generation, error = %err, "graceful signal failed; killing");
                    if let Err(err) = process.kill() {
                        warn!(generation, error = %err, "failed to kill service");
                    }
                }
                grace.as_mut().reset(Instant::now() + kill_grace);
                escalating = true;
            }
            _ = &mut grace, if escalating => {
                warn!(generation, grace = ?kill_grace, "service ignored interrupt; killing");
                if let Err(err) = process.kill() {
                    warn!(generation, error = %err, "failed to kill service");
                }
                escalating = false;
            }
        }
    };

    let _ = exits.send(ExitReport { generation, result });
}
