// src/supervise/mod.rs

//! Supervision of a single long-running process.
//!
//! - [`supervisor`] holds the restart/shutdown state machine.
//! - [`process`] defines the launch/terminate capabilities it relies on and
//!   the Tokio child-process implementation of them.

pub mod process;
pub mod supervisor;

pub use process::{ChildProcess, Launcher, ManagedProcess, Terminate, WaitFuture};
pub use supervisor::{
    ProcessSupervisor, SupervisorConfig, SupervisorPhase, SupervisorStatus, SHUTDOWN_TIMEOUT,
};
