//! # The worker plugin interface.
//!
//! A worker implementation is compiled into the host and registered in the
//! [`WorkerCatalog`](crate::WorkerCatalog) under a *kind* name. Manifests on
//! disk select a kind and give the instance its identifier.
//!
//! ```text
//! worker.json {kind}──► WorkerCatalog::get(kind) ──► Arc<dyn WorkerFactory>
//!                                                          │ build(WorkerInit)
//!                                                          ▼
//!                                          Arc<dyn Worker> ──► handlers() (once)
//!                                                          ──► start(ctx)
//!                                                          ──► stop(ctx)   (optional)
//! ```
//!
//! Capabilities:
//! - required: construction ([`WorkerFactory::build`]) and [`Worker::start`]
//! - optional: [`Worker::handlers`], [`Worker::stop`], [`WorkerFactory::schema`]

mod context;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::WorkerError;
use crate::router::HandlerTable;
use crate::settings::{ConfigSchema, WorkerConfig};
use crate::shared::SharedState;
use crate::transport::{Topics, TransportHandle};

pub use context::WorkerContext;

/// Validated worker identifier (usable as a single topic segment).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(Arc<str>);

impl WorkerId {
    /// Validates `raw`; the error names the violated rule.
    pub fn parse(raw: &str) -> Result<Self, &'static str> {
        if raw.is_empty() {
            return Err("must not be empty");
        }
        if raw.contains(['/', '+', '#']) {
            return Err("must not contain '/', '+' or '#'");
        }
        if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err("must not contain whitespace or control characters");
        }
        Ok(Self(Arc::from(raw)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for WorkerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Everything a factory receives to construct one worker.
#[derive(Clone)]
pub struct WorkerInit {
    pub id: WorkerId,
    pub topics: Topics,
    pub transport: TransportHandle,
    pub config: WorkerConfig,
    pub shared: SharedState,
}

impl fmt::Debug for WorkerInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerInit")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// # A running unit managing one prop.
///
/// `start` is called once; it should spawn its long-running activity through
/// [`WorkerContext::spawn`] and return. Returning an error (or panicking)
/// stops this instance only.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    async fn start(self: Arc<Self>, ctx: WorkerContext) -> Result<(), WorkerError>;

    /// Command handlers, built once right after construction.
    fn handlers(self: Arc<Self>) -> HandlerTable {
        HandlerTable::new()
    }

    /// Cleanup hook, run after the instance's tasks were joined or abandoned.
    async fn stop(self: Arc<Self>, _ctx: WorkerContext) {}
}

/// Shared handle to a worker.
pub type WorkerRef = Arc<dyn Worker>;

/// Constructs workers of one kind.
pub trait WorkerFactory: Send + Sync + 'static {
    /// Catalog name referenced by manifests.
    fn kind(&self) -> &str;

    /// Declared configuration schema, if any.
    fn schema(&self) -> Option<ConfigSchema> {
        None
    }

    fn build(&self, init: WorkerInit) -> Result<WorkerRef, WorkerError>;
}

/// Closure-backed factory.
///
/// ```rust
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use propvisor::{FactoryFn, Worker, WorkerContext, WorkerError, WorkerFactory};
///
/// struct Idle;
///
/// #[async_trait]
/// impl Worker for Idle {
///     async fn start(self: Arc<Self>, _ctx: WorkerContext) -> Result<(), WorkerError> {
///         Ok(())
///     }
/// }
///
/// let factory = FactoryFn::new("idle", |_init| Ok(Arc::new(Idle) as _));
/// assert_eq!(factory.kind(), "idle");
/// ```
pub struct FactoryFn<F> {
    kind: &'static str,
    schema: Option<ConfigSchema>,
    f: F,
}

impl<F> FactoryFn<F>
where
    F: Fn(WorkerInit) -> Result<WorkerRef, WorkerError> + Send + Sync + 'static,
{
    pub fn new(kind: &'static str, f: F) -> Self {
        Self {
            kind,
            schema: None,
            f,
        }
    }

    #[must_use]
    pub fn with_schema(mut self, schema: ConfigSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl<F> WorkerFactory for FactoryFn<F>
where
    F: Fn(WorkerInit) -> Result<WorkerRef, WorkerError> + Send + Sync + 'static,
{
    fn kind(&self) -> &str {
        self.kind
    }

    fn schema(&self) -> Option<ConfigSchema> {
        self.schema.clone()
    }

    fn build(&self, init: WorkerInit) -> Result<WorkerRef, WorkerError> {
        (self.f)(init)
    }
}
