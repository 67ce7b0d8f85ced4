use std::sync::Arc;

use super::config::HostConfig;
use super::supervisor::Host;
use crate::discovery::WorkerCatalog;
use crate::error::RuntimeError;
use crate::events::Bus;
use crate::settings::ConfigResolver;
use crate::shared::SharedState;
use crate::subscribers::{LogWriter, Subscribe, SubscriberSet};
use crate::transport::TransportHandle;

/// Builder for constructing a [`Host`].
pub struct HostBuilder {
    cfg: HostConfig,
    transport: Option<TransportHandle>,
    bus: Option<Bus>,
    catalog: WorkerCatalog,
    subscribers: Vec<Arc<dyn Subscribe>>,
    shared: SharedState,
    resolver: ConfigResolver,
}

impl HostBuilder {
    /// Creates a new builder with the given configuration.
    ///
    /// Defaults: the built-in worker catalog, a [`LogWriter`] subscriber, a
    /// fresh [`SharedState`] and a resolver reading the process environment.
    pub fn new(cfg: HostConfig) -> Self {
        Self {
            cfg,
            transport: None,
            bus: None,
            catalog: WorkerCatalog::with_builtins(),
            subscribers: vec![Arc::new(LogWriter::new())],
            shared: SharedState::new(),
            resolver: ConfigResolver::new(),
        }
    }

    /// Sets the shared broker connection (required).
    pub fn transport(mut self, transport: TransportHandle) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Uses an existing event bus, e.g. one already handed to the transport.
    pub fn bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Replaces the worker catalog.
    pub fn catalog(mut self, catalog: WorkerCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replaces the event subscribers (the default is a single [`LogWriter`]).
    pub fn subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Injects the shared state handed to every worker.
    pub fn shared_state(mut self, shared: SharedState) -> Self {
        self.shared = shared;
        self
    }

    /// Replaces the config resolver (e.g. to control environment lookups).
    pub fn resolver(mut self, resolver: ConfigResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Builds the host and starts forwarding events to the subscribers.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn build(self) -> Result<Arc<Host>, RuntimeError> {
        let transport = self.transport.ok_or_else(|| RuntimeError::Fatal {
            reason: "no transport configured".into(),
        })?;
        let bus = self
            .bus
            .unwrap_or_else(|| Bus::new(self.cfg.bus_capacity_clamped()));
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));

        let host = Arc::new(Host::new_internal(
            self.cfg,
            bus,
            subs,
            transport,
            self.catalog,
            self.resolver,
            self.shared,
        ));
        host.subscriber_listener();
        Ok(host)
    }
}
