//! # Runs one tracked unit of worker code and reports its outcome.
//!
//! Worker-authored futures (tracked tasks, `start()`, handlers) may return an
//! error or panic. The helpers here turn both into values so the failure
//! stays inside the owning instance.
//!
//! ## Event flow
//!
//! ```text
//! Success:       fut → Ok(())              → publish TaskFinished
//! Cancellation:  fut → Err(Canceled)       → publish TaskFinished (graceful exit)
//! Failure:       fut → Err(Fail/Fatal)     → publish TaskFailed
//! Panic:         fut → panic               → publish TaskFailed, returned as Fail
//! ```
//!
//! ## Rules
//! - Always publishes **exactly one** terminal event: `TaskFinished` or `TaskFailed`
//! - `Canceled` is treated as graceful exit and is not returned as an error

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use crate::error::TaskError;
use crate::events::{Bus, Event, EventKind};
use crate::tasks::BoxTaskFuture;

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(any: &(dyn Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Polls `fut` to completion, turning a panic into `Err(message)`.
pub(crate) async fn catch_panic<F: Future>(fut: F) -> Result<F::Output, String> {
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .map_err(|payload| panic_message(&*payload))
}

/// Runs a tracked task of `worker` and publishes its terminal event.
///
/// Returns `Ok(())` on success and on graceful cancellation.
pub(crate) async fn run_tracked(
    worker: &str,
    task: &str,
    fut: BoxTaskFuture,
    bus: &Bus,
) -> Result<(), TaskError> {
    let res = match catch_panic(fut).await {
        Ok(res) => res,
        Err(info) => Err(TaskError::Fail {
            error: format!("panicked: {info}"),
        }),
    };

    match res {
        Ok(()) | Err(TaskError::Canceled) => {
            bus.publish(
                Event::new(EventKind::TaskFinished)
                    .with_worker(worker)
                    .with_task(task),
            );
            Ok(())
        }
        Err(e) => {
            bus.publish(
                Event::new(EventKind::TaskFailed)
                    .with_worker(worker)
                    .with_task(task)
                    .with_reason(e.to_string()),
            );
            Err(e)
        }
    }
}
