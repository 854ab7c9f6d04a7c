// src/engine/mod.rs

//! Orchestration of the two workflows.
//!
//! - [`each_change`]: every changed package is handed to an action through
//!   the [`ExecutionScheduler`](crate::schedule::ExecutionScheduler).
//! - [`rerun`]: any change restarts one supervised long-running process.
//!
//! Both consume the key stream of a
//! [`ChangeWatcher`](crate::watch::ChangeWatcher) and stop on a shutdown
//! future, normally [`shutdown_signal`].

pub mod each_change;
pub mod rerun;
pub mod signals;

pub use each_change::EachChange;
pub use rerun::Rerun;
pub use signals::shutdown_signal;
