//! # Worker registry: filtering, construction and unique ids.
//!
//! ```text
//! LoadReport.descriptors ──► WorkerFilter::exclusion ──Some──► filtered (WorkerFiltered)
//!                                 │ None
//!                         enabled: false ──────────────────► filtered (WorkerFiltered)
//!                                 │
//!                         ConfigResolver::resolve(dir, factory.schema())
//!                                 │ warning ──► ConfigRejected, empty config
//!                         factory.build(WorkerInit) ──Err/panic──► failures (DiscoveryFailed)
//!                                 │
//!                         worker.handlers() (once) ──► WorkerInstance (Created)
//!                                 │
//!                         register ──AlreadyRegistered──► rejected, logged
//! ```
//!
//! ## Rules
//! - Ids are unique; the first registration wins.
//! - Instances are kept in registration order.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::filter::WorkerFilter;
use super::instance::WorkerInstance;
use super::runner::panic_message;
use crate::discovery::{LoadReport, WorkerDescriptor};
use crate::error::{DiscoveryError, RegistryError, WorkerError};
use crate::events::{Bus, Event, EventKind};
use crate::settings::ConfigResolver;
use crate::shared::SharedState;
use crate::tasks::TaskScope;
use crate::transport::{Topics, TransportHandle};
use crate::worker::{WorkerContext, WorkerInit};

/// Everything needed to turn a descriptor into an instance.
pub(crate) struct InstanceBuilder {
    pub namespace: Arc<str>,
    pub transport: TransportHandle,
    pub resolver: ConfigResolver,
    pub runtime_token: CancellationToken,
    pub bus: Bus,
    pub shared: SharedState,
}

impl InstanceBuilder {
    /// Resolves config and constructs the worker. Config problems are recorded
    /// in `report` and never fail the build.
    fn build(
        &self,
        desc: &WorkerDescriptor,
        report: &mut LoadReport,
    ) -> Result<WorkerInstance, DiscoveryError> {
        let id = desc.id.clone();
        let schema = desc.factory.schema();
        let resolved = self.resolver.resolve(&desc.dir, schema.as_ref());
        if let Some(err) = resolved.warning {
            warn!(worker = %id, error = %err, label = err.as_label(), "config rejected, using empty config");
            self.bus.publish(
                Event::new(EventKind::ConfigRejected)
                    .with_worker(id.as_str())
                    .with_reason(err.to_string()),
            );
            report.config_warnings.push((id.to_string(), err));
        }
        let config = resolved.config;

        let topics = Topics::new(Arc::clone(&self.namespace), id.as_str());
        let init = WorkerInit {
            id: id.clone(),
            topics: topics.clone(),
            transport: Arc::clone(&self.transport),
            config: config.clone(),
            shared: self.shared.clone(),
        };
        let factory = Arc::clone(&desc.factory);
        let worker = std::panic::catch_unwind(AssertUnwindSafe(|| factory.build(init)))
            .unwrap_or_else(|payload| {
                Err(WorkerError::build(format!(
                    "panicked: {}",
                    panic_message(&*payload)
                )))
            })
            .map_err(|source| DiscoveryError::Construct {
                id: id.to_string(),
                source,
            })?;

        let handlers = Arc::clone(&worker).handlers();
        let scope = Arc::new(TaskScope::new(&self.runtime_token));
        let ctx = WorkerContext::new(
            topics,
            Arc::clone(&self.transport),
            config,
            scope,
            self.bus.clone(),
            self.shared.clone(),
        );
        Ok(WorkerInstance::new(id, worker, handlers, ctx))
    }
}

#[derive(Default)]
struct Entries {
    by_id: HashMap<String, Arc<WorkerInstance>>,
    order: Vec<String>,
}

/// Registry of worker instances keyed by id.
#[derive(Default)]
pub struct Registry {
    entries: RwLock<Entries>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters `report.descriptors` and builds one instance per admitted descriptor.
    pub(crate) async fn populate(
        &self,
        filter: &WorkerFilter,
        builder: &InstanceBuilder,
        report: &mut LoadReport,
    ) {
        let descriptors = report.descriptors.clone();
        for desc in &descriptors {
            let id = desc.id.as_str();
            let skip = match filter.exclusion(id) {
                Some(reason) => Some(reason),
                None if !desc.enabled => Some("disabled by manifest"),
                None => None,
            };
            if let Some(reason) = skip {
                info!(worker = %id, reason, "worker skipped");
                builder.bus.publish(
                    Event::new(EventKind::WorkerFiltered)
                        .with_worker(id)
                        .with_reason(reason),
                );
                report.filtered.push((id.to_owned(), reason.to_owned()));
                continue;
            }

            let instance = match builder.build(desc, report) {
                Ok(instance) => instance,
                Err(err) => {
                    warn!(worker = %id, error = %err, label = err.as_label(), "worker construction failed");
                    builder.bus.publish(
                        Event::new(EventKind::DiscoveryFailed)
                            .with_worker(id)
                            .with_reason(err.to_string()),
                    );
                    report.failures.push(err);
                    continue;
                }
            };

            match self.register(Arc::new(instance)).await {
                Ok(()) => report.registered.push(id.to_owned()),
                Err(err) => warn!(worker = %id, error = %err, "worker rejected"),
            }
        }
    }

    /// Adds an instance; a second instance under the same id is rejected.
    pub async fn register(&self, instance: Arc<WorkerInstance>) -> Result<(), RegistryError> {
        let id = instance.id().to_string();
        let mut entries = self.entries.write().await;
        if entries.by_id.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered { id });
        }
        entries.order.push(id.clone());
        entries.by_id.insert(id, instance);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Option<Arc<WorkerInstance>> {
        self.entries.read().await.by_id.get(id).cloned()
    }

    /// Ids in registration order.
    pub async fn ids(&self) -> Vec<String> {
        self.entries.read().await.order.clone()
    }

    /// Instances in registration order.
    pub async fn instances(&self) -> Vec<Arc<WorkerInstance>> {
        let entries = self.entries.read().await;
        entries
            .order
            .iter()
            .filter_map(|id| entries.by_id.get(id).cloned())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::discovery::{DiscoveryRoot, Loader, WorkerCatalog};
    use crate::settings::ConfigSchema;
    use crate::transport::MemoryTransport;
    use crate::worker::{FactoryFn, Worker};

    struct Idle;

    #[async_trait]
    impl Worker for Idle {
        async fn start(self: Arc<Self>, _ctx: WorkerContext) -> Result<(), WorkerError> {
            Ok(())
        }
    }

    #[derive(Serialize, Deserialize)]
    struct Tick {
        #[serde(default = "five")]
        tick_interval: u64,
    }

    fn five() -> u64 {
        5
    }

    fn catalog() -> WorkerCatalog {
        let mut c = WorkerCatalog::new();
        c.register(FactoryFn::new("idle", |_| Ok(Arc::new(Idle) as _)).arc());
        c.register(
            FactoryFn::new("ticking", |_| Ok(Arc::new(Idle) as _))
                .with_schema(ConfigSchema::typed::<Tick>())
                .arc(),
        );
        c.register(FactoryFn::new("broken", |_| Err(WorkerError::build("no port"))).arc());
        c
    }

    fn builder() -> InstanceBuilder {
        InstanceBuilder {
            namespace: Arc::from("ns"),
            transport: MemoryTransport::new(),
            resolver: ConfigResolver::with_env(|_| None),
            runtime_token: CancellationToken::new(),
            bus: Bus::new(64),
            shared: SharedState::new(),
        }
    }

    fn worker(root: &Path, name: &str, manifest: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("worker.json"), manifest).unwrap();
    }

    fn discover(root: &Path) -> LoadReport {
        Loader::new(catalog())
            .with_root(DiscoveryRoot::builtin(root))
            .discover()
    }

    #[tokio::test]
    async fn filtering_and_disabled_manifests() {
        let tmp = tempfile::tempdir().unwrap();
        worker(tmp.path(), "a", r#"{"kind": "idle"}"#);
        worker(tmp.path(), "b", r#"{"kind": "idle"}"#);
        worker(tmp.path(), "c", r#"{"kind": "idle", "enabled": false}"#);
        let mut report = discover(tmp.path());

        let registry = Registry::new();
        let filter = WorkerFilter::new().disable(["b"]);
        registry.populate(&filter, &builder(), &mut report).await;

        assert_eq!(registry.ids().await, ["a"]);
        let filtered: Vec<_> = report.filtered.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(filtered, ["b", "c"]);
    }

    #[tokio::test]
    async fn disable_all_admits_nobody() {
        let tmp = tempfile::tempdir().unwrap();
        worker(tmp.path(), "a", r#"{"kind": "idle"}"#);
        let mut report = discover(tmp.path());

        let registry = Registry::new();
        let filter = WorkerFilter::new().disable_all(true).allow(["a"]);
        registry.populate(&filter, &builder(), &mut report).await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn construction_failure_skips_only_that_worker() {
        let tmp = tempfile::tempdir().unwrap();
        worker(tmp.path(), "a", r#"{"kind": "broken"}"#);
        worker(tmp.path(), "b", r#"{"kind": "idle"}"#);
        let mut report = discover(tmp.path());

        let registry = Registry::new();
        registry
            .populate(&WorkerFilter::new(), &builder(), &mut report)
            .await;
        assert_eq!(registry.ids().await, ["b"]);
        assert!(matches!(
            report.failures.as_slice(),
            [DiscoveryError::Construct { .. }]
        ));
    }

    #[tokio::test]
    async fn bad_config_means_empty_config_and_one_warning() {
        let tmp = tempfile::tempdir().unwrap();
        worker(tmp.path(), "a", r#"{"kind": "ticking"}"#);
        fs::write(tmp.path().join("a").join("config.json"), "{oops").unwrap();
        let mut report = discover(tmp.path());

        let registry = Registry::new();
        registry
            .populate(&WorkerFilter::new(), &builder(), &mut report)
            .await;
        let inst = registry.get("a").await.unwrap();
        assert!(inst.context().config().is_empty());
        assert_eq!(report.config_warnings.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        worker(tmp.path(), "a", r#"{"kind": "idle"}"#);
        let mut report = discover(tmp.path());
        let registry = Registry::new();
        let b = builder();
        registry.populate(&WorkerFilter::new(), &b, &mut report).await;

        let desc = report.descriptors[0].clone();
        let again = b.build(&desc, &mut report).unwrap();
        assert_eq!(
            registry.register(Arc::new(again)).await,
            Err(RegistryError::AlreadyRegistered { id: "a".into() })
        );
        assert_eq!(registry.len().await, 1);
    }
}
