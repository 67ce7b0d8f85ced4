//! # One running worker and its lifecycle.
//!
//! ```text
//! Created ──start()──► Starting ──subscribe cmd, register will (online),
//!                          │       worker.start(ctx)
//!                          ├─ Ok ───────► Running ──► router loop in scope
//!                          └─ Err/panic ─► status/error, cancel scope,
//!                                          offline ─► Stopped
//!
//! Running ──finish(budget)──► Stopping ──► cancel scope
//!                                          join_until(deadline) (abort + report stragglers)
//!                                          worker.stop(ctx) (cleanup window, capped at deadline)
//!                                          clear will, offline ─► Stopped
//! ```
//!
//! ## Rules
//! - The instance owns exactly the tasks spawned in its scope; none outlive `finish`.
//! - A failing `start()` affects this instance only.
//! - Every state change is published as [`EventKind::WorkerState`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::runner::catch_panic;
use crate::error::{TransportError, WorkerError};
use crate::events::{Event, EventKind};
use crate::router::{CommandRouter, HandlerTable};
use crate::transport::{Message, QoS, Will};
use crate::worker::{WorkerContext, WorkerId, WorkerRef};

/// Lifecycle state of a [`WorkerInstance`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WorkerState {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl WorkerState {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerState::Created => "created",
            WorkerState::Starting => "starting",
            WorkerState::Running => "running",
            WorkerState::Stopping => "stopping",
            WorkerState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time allowed to an instance for stopping.
#[derive(Clone, Copy, Debug)]
pub struct StopBudget {
    /// Shared deadline for joining tracked tasks.
    pub deadline: Instant,
    /// The grace period the deadline was derived from (for reporting).
    pub grace: Duration,
    /// Bound for the `stop()` hook; `None` means until `deadline`. The hook
    /// never runs past `deadline` either way.
    pub cleanup: Option<Duration>,
}

impl StopBudget {
    /// Budget starting now.
    pub fn new(grace: Duration, cleanup: Option<Duration>) -> Self {
        Self {
            deadline: Instant::now() + grace,
            grace,
            cleanup,
        }
    }
}

/// A constructed worker, its handler table and its runtime context.
pub struct WorkerInstance {
    id: WorkerId,
    worker: WorkerRef,
    handlers: Arc<HandlerTable>,
    ctx: WorkerContext,
    state: watch::Sender<WorkerState>,
}

impl WorkerInstance {
    pub(crate) fn new(
        id: WorkerId,
        worker: WorkerRef,
        handlers: HandlerTable,
        ctx: WorkerContext,
    ) -> Self {
        let (state, _) = watch::channel(WorkerState::Created);
        Self {
            id,
            worker,
            handlers: Arc::new(handlers),
            ctx,
            state,
        }
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Watches state changes.
    pub fn watch_state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    /// Cancels the instance scope. Tracked tasks observe it cooperatively.
    pub fn cancel(&self) {
        self.ctx.scope().cancel();
    }

    /// Starts the instance.
    ///
    /// Failures are reported on `status/error` and leave the instance
    /// Stopped; the error is also returned to the caller.
    pub async fn start(&self) -> Result<(), WorkerError> {
        if !self.advance(WorkerState::Created, WorkerState::Starting) {
            return Ok(());
        }

        match self.try_start().await {
            Ok(()) => {
                // A concurrent finish() already moved us to Stopping.
                self.advance(WorkerState::Starting, WorkerState::Running);
                Ok(())
            }
            Err(err) => {
                warn!(worker = %self.id, error = %err, "worker start failed");
                self.ctx.bus().publish(
                    Event::new(EventKind::WorkerStartFailed)
                        .with_worker(self.id.as_str())
                        .with_reason(err.to_string()),
                );
                self.ctx.error(err.to_string()).await;
                self.cancel();
                if self.state() == WorkerState::Starting {
                    self.go_offline().await;
                    self.set_state(WorkerState::Stopped);
                }
                Err(err)
            }
        }
    }

    async fn try_start(&self) -> Result<(), WorkerError> {
        let topics = self.ctx.topics();
        let sub = self
            .ctx
            .transport()
            .subscribe(&topics.cmd(), QoS::AtLeastOnce)
            .await?;
        self.ctx
            .transport()
            .register_will(Will::availability(topics.availability()))
            .await?;

        match catch_panic(Arc::clone(&self.worker).start(self.ctx.clone())).await {
            Ok(res) => res?,
            Err(info) => return Err(WorkerError::start(format!("panicked: {info}"))),
        }

        let router = CommandRouter::new(self.ctx.clone(), Arc::clone(&self.handlers));
        self.ctx.scope().spawn("router", router.run(sub));
        Ok(())
    }

    /// Stops the instance within `budget`.
    ///
    /// Returns the names of tasks abandoned at the deadline.
    pub async fn finish(&self, budget: StopBudget) -> Vec<String> {
        let was_stopped = self.state() == WorkerState::Stopped;
        if !was_stopped {
            self.set_state(WorkerState::Stopping);
        }
        self.cancel();

        let abandoned = self.ctx.scope().join_until(budget.deadline).await;
        for task in &abandoned {
            warn!(worker = %self.id, %task, grace = ?budget.grace, "task ignored cancellation, aborted");
            self.ctx.bus().publish(
                Event::new(EventKind::TaskAbandoned)
                    .with_worker(self.id.as_str())
                    .with_task(Arc::clone(task))
                    .with_timeout(budget.grace),
            );
        }

        if !was_stopped {
            self.run_stop_hook(&budget).await;
            self.go_offline().await;
            self.set_state(WorkerState::Stopped);
        }
        abandoned
            .into_iter()
            .map(|task| format!("{}/{task}", self.id))
            .collect()
    }

    async fn run_stop_hook(&self, budget: &StopBudget) {
        let hook = catch_panic(Arc::clone(&self.worker).stop(self.ctx.clone()));
        let until = match budget.cleanup {
            Some(window) => (Instant::now() + window).min(budget.deadline),
            None => budget.deadline,
        };
        let res = tokio::time::timeout_at(until, hook).await;
        match res {
            Ok(Ok(())) => debug!(worker = %self.id, "stop hook finished"),
            Ok(Err(info)) => warn!(worker = %self.id, panic = %info, "stop hook panicked"),
            Err(_) => warn!(worker = %self.id, "stop hook exceeded its cleanup window"),
        }
    }

    async fn go_offline(&self) {
        let topic = self.ctx.topics().availability();
        self.ctx.transport().clear_will(&topic);
        let offline = Will::availability(topic).offline_message();
        if let Err(err) = self.publish(offline).await {
            warn!(worker = %self.id, error = %err, "offline announcement failed");
        }
    }

    async fn publish(&self, msg: Message) -> Result<(), TransportError> {
        self.ctx.transport().publish(msg).await
    }

    /// Moves `from` → `to`; returns false when the state was not `from`.
    fn advance(&self, from: WorkerState, to: WorkerState) -> bool {
        let changed = self.state.send_if_modified(|s| {
            if *s == from {
                *s = to;
                true
            } else {
                false
            }
        });
        if changed {
            self.ctx.bus().publish(Event::worker_state(self.id.as_str(), to));
        }
        changed
    }

    fn set_state(&self, state: WorkerState) {
        self.state.send_replace(state);
        self.ctx
            .bus()
            .publish(Event::worker_state(self.id.as_str(), state));
    }
}

impl fmt::Debug for WorkerInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerInstance")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("actions", &self.handlers.len())
            .finish_non_exhaustive()
    }
}
