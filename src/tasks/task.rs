//! # Background unit owned by a worker instance.
//!
//! This module defines the [`Task`] trait (async, cancelable). A worker hands
//! tasks to [`WorkerContext::spawn`](crate::WorkerContext::spawn), which
//! tracks them in the instance's [`TaskScope`](crate::TaskScope).
//!
//! A task receives a [`CancellationToken`] and should check it regularly to
//! stop cooperatively during shutdown. A task that ignores it is abandoned once
//! the shutdown grace period ends.

use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// Boxed future returned by [`Task::spawn`].
pub type BoxTaskFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send + 'static>>;

/// # Asynchronous, cancelable unit.
///
/// A `Task` has a stable [`name`](Task::name) (used in logs and in the list of
/// abandoned tasks) and a [`spawn`](Task::spawn) method producing the future to run.
///
/// # Example
/// ```
/// use tokio_util::sync::CancellationToken;
/// use propvisor::{BoxTaskFuture, Task, TaskError};
///
/// struct Blink;
///
/// impl Task for Blink {
///     fn name(&self) -> &str { "blink" }
///
///     fn spawn(&self, ctx: CancellationToken) -> BoxTaskFuture {
///         Box::pin(async move {
///             ctx.cancelled().await;
///             Ok::<_, TaskError>(())
///         })
///     }
/// }
/// ```
pub trait Task: Send + Sync + 'static {
    /// Returns a stable, human-readable task name.
    fn name(&self) -> &str;

    /// Creates the future that runs until completion or cancellation.
    fn spawn(&self, ctx: CancellationToken) -> BoxTaskFuture;
}
