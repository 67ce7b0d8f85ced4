//! # Per-instance cancellation scope with tracked tasks.
//!
//! A [`TaskScope`] owns a child [`CancellationToken`] of the host token and the
//! join handles of every task spawned in it. Shutdown is two-phase:
//!
//! ```text
//! cancel() ──► every task observes token.cancelled()
//! join_until(deadline)
//!   ├─ task finished before deadline → joined
//!   └─ still running at deadline     → abort() + name returned as abandoned
//! ```
//!
//! ## Rules
//! - No task outlives its scope: after `join_until` every tracked task has
//!   either finished or been aborted.
//! - Tasks spawned while a join is in progress are joined by the same call.
//! - Finished handles are pruned on every spawn.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct Tracked {
    name: Arc<str>,
    handle: JoinHandle<()>,
}

/// Cancellation scope owning the tasks of one worker instance.
pub struct TaskScope {
    token: CancellationToken,
    tracked: Mutex<Vec<Tracked>>,
}

impl TaskScope {
    /// Creates a scope whose token is a child of `parent`.
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            tracked: Mutex::new(Vec::new()),
        }
    }

    /// Spawns `fut` on the runtime and tracks it under `name`.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn spawn<F>(&self, name: impl Into<Arc<str>>, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(fut);
        let mut tracked = self.lock();
        tracked.retain(|t| !t.handle.is_finished());
        tracked.push(Tracked {
            name: name.into(),
            handle,
        });
    }

    /// Cancels the scope token (idempotent).
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// A clone of the scope token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Number of tracked tasks still running.
    pub fn len(&self) -> usize {
        self.lock()
            .iter()
            .filter(|t| !t.handle.is_finished())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits for every tracked task until `deadline`; aborts the rest.
    ///
    /// Returns the names of the tasks that were still running at the deadline.
    /// Does not cancel the token; call [`cancel`](Self::cancel) first.
    pub async fn join_until(&self, deadline: Instant) -> Vec<Arc<str>> {
        let mut abandoned = Vec::new();
        loop {
            let batch = std::mem::take(&mut *self.lock());
            if batch.is_empty() {
                break;
            }
            for Tracked { name, mut handle } in batch {
                if handle.is_finished() {
                    continue;
                }
                if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                    handle.abort();
                    abandoned.push(name);
                }
            }
        }
        abandoned
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Tracked>> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TaskScope {
    fn drop(&mut self) {
        self.token.cancel();
        for t in self.lock().drain(..) {
            t.handle.abort();
        }
    }
}
