//! Reconnect delay policies.
//!
//! The transport event loop reconnects to the broker indefinitely; these knobs
//! control **how long** it waits between attempts.
//!
//! ## Contents
//! - [`BackoffPolicy`] how delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy so many hosts do not reconnect in lockstep
//!
//! ## Quick wiring
//! ```text
//! MqttSettings { reconnect: BackoffPolicy, .. }
//!      └─► transport event loop: on error → sleep(reconnect.next(attempt)) → poll again
//!                                on ConnAck → attempt = 0
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → first=500ms, factor=2.0, max=30s, jitter=Equal.

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
