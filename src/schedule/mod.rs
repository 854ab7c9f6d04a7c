// src/schedule/mod.rs

//! Per-package execution scheduling.
//!
//! [`ExecutionScheduler`] sits between the change stream and the action that
//! handles a change. It guarantees a single in-flight action per package,
//! spaces consecutive runs by a cooldown, and folds requests that arrive
//! while a run is in flight into one follow-up run.

pub mod scheduler;

pub use scheduler::{Admission, ExecutionScheduler, SchedulerConfig};
