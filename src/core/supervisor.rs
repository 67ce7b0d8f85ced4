//! # Host: discovery, concurrent start, and bounded graceful shutdown.
//!
//! The [`Host`] owns the event bus, a [`SubscriberSet`], the registry of
//! worker instances and the shared transport handle.
//!
//! ## Key responsibilities
//! - discover workers and build instances ([`Host::load`])
//! - start every instance concurrently ([`Host::start_all`])
//! - announce host availability and publish uptime
//! - on a termination signal (or [`Host::shutdown_token`]), stop every
//!   instance against a single grace deadline ([`Host::shutdown`])
//!
//! ## High-level architecture
//! ```text
//! load():
//!   Loader::discover() ──► LoadReport ──► Registry::populate() ──► WorkerInstance × N
//!                                 └─ nothing discovered → <ns>/worker_host/status/warn
//!
//! start_all():
//!   host will (online) ──► uptime task (host scope)
//!   instance[0].start()  instance[1].start() ... (each in its own scope, concurrently)
//!
//! Event flow:
//!   instances / router / transport ── publish(Event) ──► Bus ──► listener ──► SubscriberSet
//!
//! Shutdown path:
//!   signal | shutdown_token ─► Bus.publish(ShutdownRequested)
//!                            ─► runtime_token.cancel() → every instance scope
//!                            ─► deadline = now + grace
//!                            ─► finish(deadline) for all instances in parallel
//!                                  ├─ all joined      → AllStoppedWithin, Ok(())
//!                                  └─ some abandoned  → GraceExceeded, Err(GraceExceeded)
//!                            ─► host offline, transport.disconnect()
//! ```
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use propvisor::{Host, HostConfig, MemoryTransport};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = HostConfig {
//!         grace: Duration::from_secs(1),
//!         ..HostConfig::default()
//!     };
//!     let host = Host::builder(cfg)
//!         .transport(MemoryTransport::new())
//!         .build()?;
//!
//!     let token = host.shutdown_token();
//!     tokio::spawn(async move {
//!         tokio::time::sleep(Duration::from_millis(50)).await;
//!         token.cancel();
//!     });
//!     host.run_until(std::future::pending()).await?;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::builder::HostBuilder;
use super::config::HostConfig;
use super::instance::{StopBudget, WorkerState};
use super::registry::{InstanceBuilder, Registry};
use super::shutdown;
use crate::discovery::{LoadReport, Loader, WorkerCatalog};
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::settings::ConfigResolver;
use crate::shared::SharedState;
use crate::subscribers::SubscriberSet;
use crate::tasks::TaskScope;
use crate::transport::{Message, Topics, TransportHandle, Will};

/// Payload published when discovery found nothing.
pub const NO_WORKERS_WARNING: &str = "No workers discovered";

/// Runs the discovered workers over one shared transport.
pub struct Host {
    cfg: HostConfig,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    transport: TransportHandle,
    catalog: WorkerCatalog,
    resolver: ConfigResolver,
    shared: SharedState,
    registry: Arc<Registry>,
    topics: Topics,
    /// Parent of every instance scope.
    runtime_token: CancellationToken,
    /// Cancelled to request shutdown.
    trigger: CancellationToken,
    /// Host-owned tasks (uptime).
    scope: TaskScope,
    report: Mutex<Option<Arc<LoadReport>>>,
    started_at: Instant,
}

impl Host {
    /// Starts building a host with `cfg`.
    pub fn builder(cfg: HostConfig) -> HostBuilder {
        HostBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: HostConfig,
        bus: Bus,
        subs: Arc<SubscriberSet>,
        transport: TransportHandle,
        catalog: WorkerCatalog,
        resolver: ConfigResolver,
        shared: SharedState,
    ) -> Self {
        let runtime_token = CancellationToken::new();
        let topics = Topics::host(cfg.namespace.as_str());
        Self {
            scope: TaskScope::new(&runtime_token),
            cfg,
            bus,
            subs,
            transport,
            catalog,
            resolver,
            shared,
            registry: Arc::new(Registry::new()),
            topics,
            runtime_token,
            trigger: CancellationToken::new(),
            report: Mutex::new(None),
            started_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.cfg
    }

    /// The internal event bus.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The load report, once [`load`](Self::load) ran.
    pub fn report(&self) -> Option<Arc<LoadReport>> {
        self.report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cancelling this token requests shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.trigger.clone()
    }

    /// Subscribes to the bus and forwards events to the subscriber set (fire-and-forget).
    pub(crate) fn subscriber_listener(&self) {
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(n)) => {
                        warn!(skipped = n, "event listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    /// Discovers workers and builds their instances. Runs once; later calls
    /// return the first report.
    pub async fn load(&self) -> Arc<LoadReport> {
        if let Some(report) = self.report() {
            return report;
        }

        let mut report = Loader::new(self.catalog.clone())
            .with_roots(self.cfg.roots.iter().cloned())
            .with_bus(self.bus.clone())
            .discover();

        if report.descriptors.is_empty() {
            warn!("no workers discovered");
            let msg = Message::new(self.topics.status("warn"), NO_WORKERS_WARNING);
            if let Err(err) = self.transport.publish(msg).await {
                warn!(error = %err, "cannot publish discovery warning");
            }
        }

        let builder = InstanceBuilder {
            namespace: Arc::from(self.cfg.namespace.as_str()),
            transport: Arc::clone(&self.transport),
            resolver: self.resolver.clone(),
            runtime_token: self.runtime_token.clone(),
            bus: self.bus.clone(),
            shared: self.shared.clone(),
        };
        self.registry
            .populate(&self.cfg.filter, &builder, &mut report)
            .await;
        info!(
            discovered = report.descriptors.len(),
            running = report.registered.len(),
            failed = report.failures.len(),
            filtered = report.filtered.len(),
            "workers loaded"
        );

        let report = Arc::new(report);
        *self.report.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&report));
        report
    }

    /// Announces the host, then starts every instance concurrently.
    ///
    /// Completes once every instance is Running or Stopped.
    pub async fn start_all(&self) {
        let will = Will::availability(Topics::host_availability(&self.cfg.namespace));
        if let Err(err) = self.transport.register_will(will).await {
            warn!(error = %err, "cannot announce host availability");
        }
        self.spawn_uptime();

        let instances = self.registry.instances().await;
        let mut watches = Vec::with_capacity(instances.len());
        for inst in instances {
            watches.push(inst.watch_state());
            let me = Arc::clone(&inst);
            inst.context().scope().spawn("start", async move {
                // Reported by the instance itself.
                let _ = me.start().await;
            });
        }
        join_all(watches.into_iter().map(|mut rx| async move {
            let _ = rx.wait_for(|s| *s >= WorkerState::Running).await;
        }))
        .await;
    }

    fn spawn_uptime(&self) {
        let Some(period) = self.cfg.uptime_period() else {
            return;
        };
        let transport = Arc::clone(&self.transport);
        let topic = Topics::host_uptime(&self.cfg.namespace);
        let token = self.scope.token();
        let started_at = self.started_at;
        self.scope.spawn("uptime", async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {}
                }
                let secs = started_at.elapsed().as_secs();
                let msg = Message::new(topic.clone(), secs.to_string());
                if let Err(err) = transport.publish(msg).await {
                    warn!(error = %err, "uptime publish failed");
                }
            }
        });
    }

    /// Loads, starts, and runs until a termination signal or the shutdown token.
    pub async fn run(&self) -> Result<(), RuntimeError> {
        let mut signal_failure = None;
        let res = self
            .run_until(async {
                if let Err(err) = shutdown::wait_for_shutdown_signal().await {
                    signal_failure = Some(err);
                }
            })
            .await;
        match signal_failure {
            Some(fatal) => Err(fatal),
            None => res,
        }
    }

    /// Like [`run`](Self::run), with `trigger` in place of OS signals.
    pub async fn run_until<F>(&self, trigger: F) -> Result<(), RuntimeError>
    where
        F: Future<Output = ()>,
    {
        self.load().await;
        tokio::pin!(trigger);

        let started = tokio::select! {
            _ = self.start_all() => true,
            _ = &mut trigger => false,
            _ = self.trigger.cancelled() => false,
        };
        if started {
            tokio::select! {
                _ = &mut trigger => {}
                _ = self.trigger.cancelled() => {}
            }
        }
        self.shutdown().await
    }

    /// Stops every instance against one grace deadline, then goes offline.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.bus.publish(Event::new(EventKind::ShutdownRequested));
        self.trigger.cancel();
        self.runtime_token.cancel();

        let grace = self.cfg.grace;
        let budget = StopBudget::new(grace, self.cfg.cleanup_window());
        let instances = self.registry.instances().await;
        let mut stuck: Vec<String> = join_all(instances.iter().map(|inst| inst.finish(budget)))
            .await
            .into_iter()
            .flatten()
            .collect();

        stuck.extend(
            self.scope
                .join_until(budget.deadline)
                .await
                .into_iter()
                .map(|task| format!("{}/{task}", self.topics.id())),
        );

        let host_will = Will::availability(Topics::host_availability(&self.cfg.namespace));
        self.transport.clear_will(&host_will.topic);
        if let Err(err) = self.transport.publish(host_will.offline_message()).await {
            warn!(error = %err, "cannot announce host offline");
        }
        if let Err(err) = self.transport.disconnect().await {
            warn!(error = %err, "transport disconnect failed");
        }

        if stuck.is_empty() {
            self.bus.publish(Event::new(EventKind::AllStoppedWithin));
            Ok(())
        } else {
            self.bus
                .publish(Event::new(EventKind::GraceExceeded).with_timeout(grace));
            Err(RuntimeError::GraceExceeded { grace, stuck })
        }
    }

    /// Time since the host was built.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
