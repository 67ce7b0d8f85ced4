//! # LogWriter: renders host events through `tracing`.
//!
//! Installed by default by [`HostBuilder`](crate::HostBuilder). Levels follow
//! the event's severity: failures and abandonment are `warn`, lifecycle is
//! `info`, per-command traffic is `debug`.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let worker = e.worker.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::WorkerDiscovered => {
                info!(worker, origin = reason, "worker discovered");
            }
            EventKind::DiscoveryFailed => {
                warn!(worker, error = reason, "worker discovery failed");
            }
            EventKind::WorkerFiltered => {
                info!(worker, reason, "worker skipped");
            }
            EventKind::ConfigRejected => {
                warn!(worker, error = reason, "config rejected, using empty config");
            }
            EventKind::WorkerState => {
                info!(worker, state = ?e.state, "worker state");
            }
            EventKind::WorkerStartFailed => {
                warn!(worker, error = reason, "worker start failed");
            }
            EventKind::TaskFinished => {
                debug!(worker, task = ?e.task, "task finished");
            }
            EventKind::TaskFailed => {
                warn!(worker, task = ?e.task, error = reason, "task failed");
            }
            EventKind::TaskAbandoned => {
                warn!(worker, task = ?e.task, grace_ms = ?e.timeout_ms, "task abandoned after grace period");
            }
            EventKind::CommandDispatched => {
                debug!(worker, action = ?e.action, "command dispatched");
            }
            EventKind::DispatchFailed => {
                warn!(worker, action = ?e.action, error = reason, "command dispatch failed");
            }
            EventKind::ShutdownRequested => {
                info!("shutdown requested");
            }
            EventKind::AllStoppedWithin => {
                info!("all workers stopped within grace");
            }
            EventKind::GraceExceeded => {
                warn!(grace_ms = ?e.timeout_ms, "grace period exceeded");
            }
            EventKind::TransportConnected => {
                info!("broker connected");
            }
            EventKind::ReconnectScheduled => {
                warn!(error = reason, delay_ms = ?e.delay_ms, attempt = ?e.attempt, "broker connection lost, reconnecting");
            }
            EventKind::SubscriberOverflow => {
                warn!(subscriber = ?e.task, reason, "subscriber dropped event");
            }
            EventKind::SubscriberPanicked => {
                warn!(subscriber = ?e.task, info = reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
