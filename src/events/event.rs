//! # Host events emitted by the supervisor, registry, router and transports.
//!
//! The [`EventKind`] enum classifies event types across these categories:
//! - **Discovery events**: candidates accepted, rejected or filtered out
//! - **Lifecycle events**: worker state transitions
//! - **Task events**: tracked background units ending, failing or being abandoned
//! - **Dispatch events**: commands routed to handlers, or failing at the boundary
//! - **Shutdown events**: shutdown requested, completed within grace, grace exceeded
//! - **Transport events**: broker connection changes
//!
//! The [`Event`] struct carries metadata such as the worker id, task name,
//! reason and timestamp. These events are host-internal observability; they
//! are never published on the message broker.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use propvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::DispatchFailed)
//!     .with_worker("coffin_jumper")
//!     .with_reason("unknown action 'dance'");
//!
//! assert_eq!(ev.kind, EventKind::DispatchFailed);
//! assert_eq!(ev.worker.as_deref(), Some("coffin_jumper"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::core::WorkerState;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of host events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets `task` (subscriber name) and `reason` (panic info).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets `task` (subscriber name) and `reason`.
    SubscriberOverflow,

    // === Discovery events ===
    /// A candidate was accepted by the loader.
    ///
    /// Sets `worker`, `reason` (origin path).
    WorkerDiscovered,

    /// A candidate was rejected; exactly one per failed candidate.
    ///
    /// Sets `worker` when known, `reason` (error message).
    DiscoveryFailed,

    /// A discovered worker was excluded by filtering or its manifest.
    ///
    /// Sets `worker`, `reason`.
    WorkerFiltered,

    /// A worker configuration was unusable; the worker runs with an empty config.
    ///
    /// Sets `worker`, `reason`.
    ConfigRejected,

    // === Lifecycle events ===
    /// A worker instance changed state.
    ///
    /// Sets `worker`, `state`.
    WorkerState,

    /// `start()` failed or panicked.
    ///
    /// Sets `worker`, `reason`.
    WorkerStartFailed,

    // === Task events ===
    /// A tracked task finished (successfully or by honouring cancellation).
    ///
    /// Sets `worker`, `task`.
    TaskFinished,

    /// A tracked task returned an error or panicked.
    ///
    /// Sets `worker`, `task`, `reason`.
    TaskFailed,

    /// A tracked task was still running when the grace period ended.
    ///
    /// Sets `worker`, `task`, `timeout_ms` (grace).
    TaskAbandoned,

    // === Dispatch events ===
    /// A command was handed to its handler.
    ///
    /// Sets `worker`, `action`.
    CommandDispatched,

    /// A command failed at the dispatch boundary.
    ///
    /// Sets `worker`, `action` when known, `reason`.
    DispatchFailed,

    // === Shutdown events ===
    /// Shutdown requested (OS signal or token).
    ShutdownRequested,

    /// All tracked tasks stopped within the grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some tasks were abandoned.
    ///
    /// Sets `timeout_ms` (grace).
    GraceExceeded,

    // === Transport events ===
    /// Broker connection (re)established.
    TransportConnected,

    /// Broker connection lost; a reconnect is scheduled.
    ///
    /// Sets `reason`, `delay_ms`, `attempt`.
    ReconnectScheduled,
}

/// Host event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Worker identifier, if applicable.
    pub worker: Option<Arc<str>>,
    /// Tracked task (or subscriber) name, if applicable.
    pub task: Option<Arc<str>>,
    /// Command action, if applicable.
    pub action: Option<Arc<str>>,
    /// Human-readable reason (errors, origins, overflow details).
    pub reason: Option<Arc<str>>,
    /// New worker state for [`EventKind::WorkerState`].
    pub state: Option<WorkerState>,
    /// Grace or timeout in milliseconds.
    pub timeout_ms: Option<u32>,
    /// Reconnect delay in milliseconds.
    pub delay_ms: Option<u32>,
    /// Reconnect attempt (starting from 1).
    pub attempt: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            worker: None,
            task: None,
            action: None,
            reason: None,
            state: None,
            timeout_ms: None,
            delay_ms: None,
            attempt: None,
        }
    }

    /// Attaches a worker identifier.
    #[inline]
    pub fn with_worker(mut self, worker: impl Into<Arc<str>>) -> Self {
        self.worker = Some(worker.into());
        self
    }

    /// Attaches a task name.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches a command action.
    #[inline]
    pub fn with_action(mut self, action: impl Into<Arc<str>>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a worker state.
    #[inline]
    pub fn with_state(mut self, state: WorkerState) -> Self {
        self.state = Some(state);
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(clamp_ms(d));
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(clamp_ms(d));
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }

    /// Creates a worker state transition event.
    #[inline]
    pub fn worker_state(worker: impl Into<Arc<str>>, state: WorkerState) -> Self {
        Event::new(EventKind::WorkerState)
            .with_worker(worker)
            .with_state(state)
    }
}

fn clamp_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::new(EventKind::ShutdownRequested);
        let b = Event::new(EventKind::ShutdownRequested);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn durations_are_clamped_to_u32_millis() {
        let ev = Event::new(EventKind::GraceExceeded).with_timeout(Duration::from_secs(u64::MAX));
        assert_eq!(ev.timeout_ms, Some(u32::MAX));
    }

    #[test]
    fn worker_state_sets_fields() {
        let ev = Event::worker_state("x", WorkerState::Running);
        assert_eq!(ev.kind, EventKind::WorkerState);
        assert_eq!(ev.state, Some(WorkerState::Running));
        assert_eq!(ev.worker.as_deref(), Some("x"));
    }
}
