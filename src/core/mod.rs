//! Runtime core: orchestration and lifecycle.
//!
//! The public entry point is [`Host`], built through [`HostBuilder`].
//!
//! Internal modules:
//! - [`runner`]: runs worker-authored futures, catching errors and panics;
//! - [`instance`]: one worker's lifecycle (start, stop, availability);
//! - [`registry`]: filtering, construction, unique ids;
//! - [`supervisor`]: discovery, concurrent start, graceful shutdown;
//! - [`shutdown`]: cross-platform termination signals.

mod builder;
mod config;
mod filter;
mod instance;
mod registry;
mod runner;
mod shutdown;
mod supervisor;

pub use builder::HostBuilder;
pub use config::{DEFAULT_NAMESPACE, HostConfig};
pub use filter::WorkerFilter;
pub use instance::{StopBudget, WorkerInstance, WorkerState};
pub use registry::Registry;
pub use supervisor::{Host, NO_WORKERS_WARNING};

pub(crate) use runner::{catch_panic, panic_message, run_tracked};
