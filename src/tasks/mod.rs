//! # Background task abstractions.
//!
//! - [`Task`] trait for async cancelable units
//! - [`TaskFn`] function-based task implementation
//! - [`TaskRef`] shared reference to a task (`Arc<dyn Task>`)
//! - [`TaskScope`] per-instance cancellation scope that tracks spawned tasks

mod scope;
mod task;
mod task_fn;

pub use scope::TaskScope;
pub use task::{BoxTaskFuture, Task};
pub use task_fn::{TaskFn, TaskRef};
