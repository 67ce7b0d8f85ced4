//! # Host runtime configuration.
//!
//! Provides [`HostConfig`], the settings consumed by [`Host`](crate::Host).
//! Broker settings live separately in `MqttSettings`.
//!
//! ## Sentinel values
//! - `uptime_interval = 0s` → no uptime publishing
//! - `stop_window = 0s` → the `stop()` hook is bounded only by the grace deadline

use std::time::Duration;

use super::filter::WorkerFilter;
use crate::discovery::DiscoveryRoot;

/// Default topic namespace.
pub const DEFAULT_NAMESPACE: &str = "halloween";

/// Runtime configuration for the worker host.
///
/// ## Field semantics
/// - `namespace`: first topic segment of every topic
/// - `grace`: single shutdown deadline shared by all instances
/// - `stop_window`: extra time each worker's `stop()` hook may take
/// - `bus_capacity`: internal event bus ring buffer size (min 1; clamped by Bus)
/// - `uptime_interval`: period of `<ns>/worker_host/uptime` (`0s` = disabled)
/// - `roots`: discovery roots, scanned in order
/// - `filter`: allow/disable filtering
///
/// ## Notes
/// All fields are public. Prefer the helper accessors over sentinel checks.
#[derive(Clone, Debug)]
pub struct HostConfig {
    pub namespace: String,

    /// Maximum time to wait for tracked tasks once shutdown starts.
    ///
    /// Tasks still running at the deadline are aborted and reported; the run
    /// then ends with `RuntimeError::GraceExceeded`.
    pub grace: Duration,

    pub stop_window: Duration,

    pub bus_capacity: usize,

    pub uptime_interval: Duration,

    pub roots: Vec<DiscoveryRoot>,

    pub filter: WorkerFilter,
}

impl HostConfig {
    /// Returns the uptime period, or `None` when disabled.
    #[inline]
    pub fn uptime_period(&self) -> Option<Duration> {
        if self.uptime_interval == Duration::ZERO {
            None
        } else {
            Some(self.uptime_interval)
        }
    }

    /// Returns the `stop()` cleanup window, or `None` when unbounded.
    #[inline]
    pub fn cleanup_window(&self) -> Option<Duration> {
        if self.stop_window == Duration::ZERO {
            None
        } else {
            Some(self.stop_window)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for HostConfig {
    /// Default configuration:
    ///
    /// - `namespace = "halloween"`
    /// - `grace = 10s`
    /// - `stop_window = 2s`
    /// - `bus_capacity = 1024`
    /// - `uptime_interval = 10s`
    /// - no roots, admit everyone
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_owned(),
            grace: Duration::from_secs(10),
            stop_window: Duration::from_secs(2),
            bus_capacity: 1024,
            uptime_interval: Duration::from_secs(10),
            roots: Vec::new(),
            filter: WorkerFilter::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sentinels_disable() {
        let cfg = HostConfig {
            uptime_interval: Duration::ZERO,
            stop_window: Duration::ZERO,
            bus_capacity: 0,
            ..HostConfig::default()
        };
        assert_eq!(cfg.uptime_period(), None);
        assert_eq!(cfg.cleanup_window(), None);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
        assert_eq!(HostConfig::default().namespace, "halloween");
    }
}
