// src/exec/backend.rs

//! Pluggable action abstraction.
//!
//! The scheduler talks to an [`Action`] instead of spawning processes
//! itself. Production code uses [`CommandExecutor`](super::CommandExecutor);
//! tests provide actions that record invocations or sleep for a while.

use std::future::Future;
use std::pin::Pin;

use crate::errors::Result;

/// Boxed future returned by [`Action::call`].
pub type ActionFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Work to perform for one changed package.
///
/// An `Err` means the action could not be carried out at all (e.g. the
/// command could not be launched). A command that ran and failed is not an
/// error at this level.
pub trait Action: Send + Sync {
    fn call<'a>(&'a self, key: &'a str) -> ActionFuture<'a>;
}

/// Adapter turning an async closure into an [`Action`].
pub struct FnAction<F>(pub F);

impl<F, Fut> Action for FnAction<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn call<'a>(&'a self, key: &'a str) -> ActionFuture<'a> {
        Box::pin((self.0)(key.to_string()))
    }
}

/// Convenience constructor for [`FnAction`].
pub fn action_fn<F, Fut>(f: F) -> FnAction<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    FnAction(f)
}
