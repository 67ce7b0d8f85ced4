//! Host events: types and broadcast bus.
//!
//! This module groups the event **data model** and the in-process **bus** used
//! to observe what the host is doing: discovery results, worker state changes,
//! tracked task outcomes, dispatch failures, shutdown progress and broker
//! connectivity.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Host`, `Registry`, `WorkerInstance`, `CommandRouter`,
//!   `TaskScope`, transport event loops, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: `Host::subscriber_listener()` which fans out to the
//!   [`SubscriberSet`](crate::SubscriberSet).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
