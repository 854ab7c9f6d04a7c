use std::io;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::time::Instant;

use devloop::errors::{DevloopError, Result};
use devloop::supervise::{Launcher, ManagedProcess, Terminate, WaitFuture};
use devloop::types::ExitOutcome;

/// Signals a [`FakeProcess`] received, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Interrupt,
    Kill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessState {
    Running,
    Exited(ExitOutcome),
    /// `wait` fails, as if the OS lost track of the child.
    Lost,
}

struct Shared {
    state: watch::Sender<ProcessState>,
    signals: Mutex<Vec<Signal>>,
}

/// A scripted stand-in for a child process.
///
/// It exits when told to through its [`FakeProcessHandle`], on `kill`, and
/// on the graceful signal unless it was launched as stubborn.
pub struct FakeProcess {
    id: u32,
    shared: Arc<Shared>,
    state: watch::Receiver<ProcessState>,
    stubborn: bool,
}

impl Terminate for FakeProcess {
    fn signal_graceful(&mut self) -> io::Result<()> {
        self.shared.signals.lock().unwrap().push(Signal::Interrupt);
        if !self.stubborn {
            exit_if_running(&self.shared, ExitOutcome::Failed(None));
        }
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.shared.signals.lock().unwrap().push(Signal::Kill);
        exit_if_running(&self.shared, ExitOutcome::Failed(None));
        Ok(())
    }
}

impl ManagedProcess for FakeProcess {
    fn id(&self) -> Option<u32> {
        Some(self.id)
    }

    fn wait(&mut self) -> WaitFuture<'_> {
        Box::pin(async move {
            let state = *self
                .state
                .wait_for(|s| *s != ProcessState::Running)
                .await
                .map_err(|_| io::Error::other("fake process state dropped"))?;
            match state {
                ProcessState::Exited(outcome) => Ok(outcome),
                ProcessState::Lost | ProcessState::Running => {
                    Err(io::Error::other("lost track of fake process"))
                }
            }
        })
    }
}

fn exit_if_running(shared: &Shared, outcome: ExitOutcome) {
    shared.state.send_if_modified(|s| {
        if *s == ProcessState::Running {
            *s = ProcessState::Exited(outcome);
            true
        } else {
            false
        }
    });
}

/// Test-side control over one launched [`FakeProcess`].
#[derive(Clone)]
pub struct FakeProcessHandle {
    shared: Arc<Shared>,
    launched_at: Instant,
}

impl FakeProcessHandle {
    /// Make the process exit on its own.
    pub fn exit(&self, outcome: ExitOutcome) {
        exit_if_running(&self.shared, outcome);
    }

    /// Exit with a non-zero status, like a crash.
    pub fn crash(&self) {
        self.exit(ExitOutcome::Failed(Some(1)));
    }

    /// Make `wait` fail.
    pub fn lose(&self) {
        self.shared.state.send_replace(ProcessState::Lost);
    }

    pub fn is_running(&self) -> bool {
        *self.shared.state.borrow() == ProcessState::Running
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.shared.signals.lock().unwrap().clone()
    }

    pub fn launched_at(&self) -> Instant {
        self.launched_at
    }
}

/// A [`Launcher`] producing [`FakeProcess`]es and keeping a handle to each.
#[derive(Clone)]
pub struct FakeLauncher {
    processes: Arc<Mutex<Vec<FakeProcessHandle>>>,
    launches: Arc<watch::Sender<usize>>,
    stubborn: bool,
    fail_from: Option<usize>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self {
            processes: Arc::default(),
            launches: Arc::new(watch::Sender::new(0)),
            stubborn: false,
            fail_from: None,
        }
    }

    /// Launched processes ignore the graceful signal and only die on kill.
    pub fn stubborn(mut self) -> Self {
        self.stubborn = true;
        self
    }

    /// The launch with this zero-based index (and every later one) fails.
    pub fn fail_from(mut self, index: usize) -> Self {
        self.fail_from = Some(index);
        self
    }

    pub fn launch_count(&self) -> usize {
        *self.launches.borrow()
    }

    pub fn process(&self, index: usize) -> Option<FakeProcessHandle> {
        self.processes.lock().unwrap().get(index).cloned()
    }

    pub fn latest(&self) -> Option<FakeProcessHandle> {
        self.processes.lock().unwrap().last().cloned()
    }

    /// Number of processes that have not exited yet.
    pub fn alive(&self) -> usize {
        self.processes
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.is_running())
            .count()
    }

    /// Wait until at least `n` processes have been launched.
    pub async fn wait_for_launches(&self, n: usize) {
        let mut rx = self.launches.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }
}

impl Default for FakeLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl Launcher for FakeLauncher {
    type Process = FakeProcess;

    fn launch(&self) -> Result<FakeProcess> {
        let mut processes = self.processes.lock().unwrap();
        let index = processes.len();

        if self.fail_from.is_some_and(|from| index >= from) {
            return Err(DevloopError::LaunchFailed {
                program: "fake-service".to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "scripted launch failure"),
            });
        }

        let (state_tx, state_rx) = watch::channel(ProcessState::Running);
        let shared = Arc::new(Shared {
            state: state_tx,
            signals: Mutex::new(Vec::new()),
        });

        processes.push(FakeProcessHandle {
            shared: Arc::clone(&shared),
            launched_at: Instant::now(),
        });
        drop(processes);
        self.launches.send_modify(|c| *c += 1);

        Ok(FakeProcess {
            id: 1000 + index as u32,
            shared,
            state: state_rx,
            stubborn: self.stubborn,
        })
    }
}
