// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`command`] parses command templates and renders them per package.
//! - [`executor`] runs rendered commands, either to completion (one-shot
//!   per package) or as the supervised long-running process.
//! - [`backend`] provides the [`Action`] trait the scheduler calls, so tests
//!   can swap in actions that don't spawn processes.

pub mod backend;
pub mod command;
pub mod executor;

pub use backend::{action_fn, Action, ActionFuture, FnAction};
pub use command::{CommandTemplate, TemplateContext, TemplateParam};
pub use executor::CommandExecutor;
