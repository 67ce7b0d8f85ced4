//! # Observers of host events.
//!
//! A [`Subscribe`] implementation sees every [`Event`] the host publishes:
//! discovery failures, rejected configs, lifecycle transitions, dispatch
//! errors. [`SubscriberSet`](crate::SubscriberSet) feeds each subscriber from
//! its own bounded queue on its own task, so a slow or panicking subscriber
//! never stalls workers or other subscribers.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use propvisor::{Event, EventKind, Subscribe};
//!
//! struct DispatchFailures;
//!
//! #[async_trait]
//! impl Subscribe for DispatchFailures {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::DispatchFailed) {
//!             // export a metric, etc.
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "dispatch-failures" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Receives host events in publish order.
///
/// Events that do not fit in the queue are dropped and reported as
/// `SubscriberOverflow`; a panic is reported as `SubscriberPanicked`.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event, in FIFO order per subscriber.
    async fn on_event(&self, event: &Event);

    /// Returns the subscriber name used in overflow/panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the preferred queue capacity (clamped to at least 1).
    fn queue_capacity(&self) -> usize {
        1024
    }
}
