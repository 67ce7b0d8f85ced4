//! # Event subscribers for the worker host.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and the built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   WorkerInstance ── publish(Event) ──► Bus ──► Host listener ──► SubscriberSet
//!                                                                     │
//!                                                         ┌───────────┼──────────┐
//!                                                         ▼           ▼          ▼
//!                                                     LogWriter    Metrics    Custom
//! ```

mod log;
mod set;
mod subscriber;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
