//! Workers compiled into the host.

mod heartbeat;

pub use heartbeat::{Heartbeat, HeartbeatConfig};

use crate::discovery::WorkerCatalog;

/// Adds every built-in worker kind to `catalog`.
pub(crate) fn register(catalog: &mut WorkerCatalog) {
    catalog.register(Heartbeat::factory());
}
