//! # propvisor
//!
//! **Propvisor** is a worker host runtime: it discovers independently authored
//! workers, runs one instance per managed prop, supervises their background
//! tasks and routes commands and telemetry over a shared MQTT connection.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   <builtin>/<name>/worker.json       <props>/<prop>/backend/worker.json
//!              │                                   │
//!              └──────────────┬────────────────────┘
//!                             ▼
//!                  Loader + WorkerCatalog ──► LoadReport (descriptors, failures)
//!                             │
//!                             ▼
//!   ConfigResolver ──► Registry (WorkerFilter, factory.build, handlers())
//!                             │
//!                             ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Host                                                             │
//! │  - Bus (internal events)  ──► SubscriberSet ──► LogWriter, ...    │
//! │  - WorkerInstance × N, each with its own TaskScope                │
//! │  - uptime task, host availability                                 │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!   WorkerInstance     WorkerInstance     WorkerInstance
//!   ├ worker.start()   ├ ...              ├ ...
//!   ├ tracked tasks    │                  │
//!   └ CommandRouter ◄──┴── <ns>/<id>/cmd ─┴──────────┐
//!        │                                           │
//!        ▼                                           │
//!   Transport (MqttTransport | MemoryTransport) ◄────┘
//!        └─► <ns>/<id>/{state, status/<key>, telemetry/<key>, status/availability}
//! ```
//!
//! ### Lifecycle
//! ```text
//! Created ──► Starting ──► Running ──► Stopping ──► Stopped
//!                 └── start() failed/panicked ─────────┘
//! ```
//!
//! ## Features
//! | Area              | Description                                               | Key types / traits                         |
//! |-------------------|-----------------------------------------------------------|--------------------------------------------|
//! | **Plugin API**    | Compile-in workers, selected by manifests on disk.        | [`Worker`], [`WorkerFactory`], [`FactoryFn`] |
//! | **Commands**      | Explicit action → handler tables.                         | [`HandlerTable`], [`Call`]                 |
//! | **Discovery**     | Manifest scan with typed failures.                        | [`Loader`], [`WorkerCatalog`], [`LoadReport`] |
//! | **Configuration** | JSON/YAML per worker, env placeholders, typed schemas.    | [`ConfigResolver`], [`ConfigSchema`]       |
//! | **Supervision**   | Concurrent start, scoped tasks, bounded shutdown.         | [`Host`], [`TaskScope`]                    |
//! | **Transport**     | MQTT or in-memory broker, canonical topics.               | [`Transport`], [`Topics`]                  |
//! | **Subscriber API**| Observe host events (logging, metrics).                   | [`Subscribe`]                              |
//! | **Errors**        | Typed errors per component.                               | [`RuntimeError`], [`DispatchError`], ...   |
//!
//! ## Optional features
//! - `mqtt` (default): exports `MqttTransport` backed by `rumqttc`.
//! - `cli` (default): dependencies of the `worker-host` binary (`clap`, `anyhow`, `tracing-subscriber`).
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use async_trait::async_trait;
//! use propvisor::{
//!     Call, FactoryFn, HandlerError, HandlerTable, Host, HostConfig, MemoryTransport,
//!     Worker, WorkerCatalog, WorkerContext, WorkerError,
//! };
//!
//! struct Lantern;
//!
//! impl Lantern {
//!     async fn glow(self: Arc<Self>, call: Call) -> Result<(), HandlerError> {
//!         call.ctx.telemetry("glow", call.arg_str().unwrap_or("on")).await;
//!         Ok(())
//!     }
//! }
//!
//! #[async_trait]
//! impl Worker for Lantern {
//!     async fn start(self: Arc<Self>, ctx: WorkerContext) -> Result<(), WorkerError> {
//!         ctx.state("idle").await;
//!         Ok(())
//!     }
//!
//!     fn handlers(self: Arc<Self>) -> HandlerTable {
//!         HandlerTable::bound(&self).on("glow", Lantern::glow).build()
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut catalog = WorkerCatalog::new();
//!     catalog.register(FactoryFn::new("lantern", |_| Ok(Arc::new(Lantern) as _)).arc());
//!
//!     let host = Host::builder(HostConfig::default())
//!         .transport(MemoryTransport::new())
//!         .catalog(catalog)
//!         .build()?;
//!
//!     let stop = host.shutdown_token();
//!     stop.cancel();
//!     host.run_until(tokio::time::sleep(Duration::from_secs(1))).await?;
//!     Ok(())
//! }
//! ```
mod builtin;
mod core;
mod discovery;
mod error;
mod events;
mod policies;
mod router;
mod settings;
mod shared;
mod subscribers;
mod tasks;
mod transport;
mod worker;

// ---- Public re-exports ----

pub use builtin::{Heartbeat, HeartbeatConfig};
pub use core::{
    DEFAULT_NAMESPACE, Host, HostBuilder, HostConfig, NO_WORKERS_WARNING, Registry, StopBudget,
    WorkerFilter, WorkerInstance, WorkerState,
};
pub use discovery::{
    DiscoveryRoot, Layout, LoadReport, Loader, MANIFEST_FILE_NAME, Manifest, WorkerCatalog,
    WorkerDescriptor,
};
pub use error::{
    ConfigError, DiscoveryError, DispatchError, HandlerError, RegistryError, RuntimeError,
    TaskError, TransportError, WorkerError,
};
pub use events::{Bus, Event, EventKind};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use router::{Bound, Call, Command, CommandRouter, Handler, HandlerTable};
pub use settings::{
    CONFIG_FILES, ConfigResolver, ConfigSchema, EnvLookup, Resolved, WorkerConfig, substitute_env,
};
pub use shared::{SharedState, StateWriter};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use tasks::{BoxTaskFuture, Task, TaskFn, TaskRef, TaskScope};
pub use transport::{
    HOST_ID, MemoryTransport, Message, QoS, Subscription, Topics, Transport, TransportHandle,
    Will, topic_matches,
};
#[cfg(feature = "mqtt")]
pub use transport::{MqttSettings, MqttTransport};
pub use worker::{FactoryFn, Worker, WorkerContext, WorkerFactory, WorkerId, WorkerInit, WorkerRef};
