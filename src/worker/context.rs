//! # Runtime handle given to a worker.
//!
//! [`WorkerContext`] is what a worker uses to talk to the outside world: its
//! topics, the shared transport, its configuration, its own shared-state
//! writer, and its task scope. It is cheap to clone.
//!
//! Telemetry, status and state publishing is best-effort: failures are logged
//! and swallowed so a broker outage never takes a worker down. Commands to
//! other workers return their transport error to the caller.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::run_tracked;
use crate::error::{DispatchError, TaskError, TransportError};
use crate::events::{Bus, Event, EventKind};
use crate::router::Command;
use crate::settings::WorkerConfig;
use crate::shared::{SharedState, StateWriter};
use crate::tasks::{TaskFn, TaskRef, TaskScope};
use crate::transport::{Message, QoS, Topics, TransportHandle};

struct Inner {
    topics: Topics,
    transport: TransportHandle,
    config: WorkerConfig,
    scope: Arc<TaskScope>,
    bus: Bus,
    shared: SharedState,
    writer: StateWriter,
}

/// Per-instance runtime handle.
#[derive(Clone)]
pub struct WorkerContext {
    inner: Arc<Inner>,
}

impl WorkerContext {
    pub(crate) fn new(
        topics: Topics,
        transport: TransportHandle,
        config: WorkerConfig,
        scope: Arc<TaskScope>,
        bus: Bus,
        shared: SharedState,
    ) -> Self {
        let writer = shared.writer(topics.id());
        Self {
            inner: Arc::new(Inner {
                topics,
                transport,
                config,
                scope,
                bus,
                shared,
                writer,
            }),
        }
    }

    /// The worker identifier.
    pub fn id(&self) -> &str {
        self.inner.topics.id()
    }

    pub fn topics(&self) -> &Topics {
        &self.inner.topics
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> &TransportHandle {
        &self.inner.transport
    }

    /// Read access to every worker's shared state.
    pub fn shared(&self) -> &SharedState {
        &self.inner.shared
    }

    /// Write access to this worker's own keys.
    pub fn state_writer(&self) -> &StateWriter {
        &self.inner.writer
    }

    /// The instance cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.inner.scope.token()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.scope.is_cancelled()
    }

    /// Completes when the instance is being stopped.
    pub async fn cancelled(&self) {
        self.inner.scope.token().cancelled().await;
    }

    pub(crate) fn scope(&self) -> &Arc<TaskScope> {
        &self.inner.scope
    }

    pub(crate) fn bus(&self) -> &Bus {
        &self.inner.bus
    }

    /// Spawns a tracked background task owned by this instance.
    ///
    /// An error or panic is logged and reported on `status/error`; the
    /// instance keeps running.
    pub fn spawn(&self, task: TaskRef) {
        let name: Arc<str> = Arc::from(task.name());
        let fut = task.spawn(self.token());
        let ctx = self.clone();
        let task_name = Arc::clone(&name);
        self.inner.scope.spawn(name, async move {
            if let Err(err) = run_tracked(ctx.id(), &task_name, fut, ctx.bus()).await {
                ctx.error(format!("task '{task_name}' failed: {err}")).await;
            }
        });
    }

    /// Spawns a closure-backed tracked task.
    pub fn spawn_fn<F, Fut>(&self, name: &'static str, f: F)
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.spawn(TaskFn::arc(name, f));
    }

    /// Publishes a raw message through the shared transport.
    pub async fn publish(&self, msg: Message) -> Result<(), TransportError> {
        self.inner.transport.publish(msg).await
    }

    /// `<ns>/<id>/telemetry/<key>`
    pub async fn telemetry(&self, key: &str, value: impl Into<Value>) {
        let msg = Message::new(self.inner.topics.telemetry(key), encode(value.into()));
        self.best_effort(msg).await;
    }

    /// `<ns>/<id>/status/<key>`
    pub async fn status(&self, key: &str, value: impl Into<Value>) {
        let msg = Message::new(self.inner.topics.status(key), encode(value.into()));
        self.best_effort(msg).await;
    }

    /// `<ns>/<id>/status/error`
    pub async fn error(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(worker = %self.id(), error = %message, "worker error");
        self.status("error", message).await;
    }

    /// Retained `<ns>/<id>/state`.
    pub async fn state(&self, value: impl Into<Value>) {
        let msg = Message::new(self.inner.topics.state(), encode(value.into()))
            .with_qos(QoS::AtLeastOnce)
            .retained();
        self.best_effort(msg).await;
    }

    /// Sends a command to another worker through the bus (never in-process).
    pub async fn command(
        &self,
        target: &str,
        action: &str,
        args: Option<Value>,
    ) -> Result<(), TransportError> {
        let cmd = Command::new(target, action).with_args(args);
        let msg = Message::new(self.inner.topics.sibling(target).cmd(), cmd.to_payload())
            .with_qos(cmd.qos);
        debug!(worker = %self.id(), %target, %action, "sending command");
        self.publish(msg).await
    }

    /// Sends the same command to every target. All targets are attempted; the
    /// first error is returned.
    pub async fn broadcast<I, S>(
        &self,
        targets: I,
        action: &str,
        args: Option<Value>,
    ) -> Result<(), TransportError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut first_err = None;
        for target in targets {
            if let Err(err) = self.command(target.as_ref(), action, args.clone()).await {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    pub(crate) async fn report_dispatch(&self, action: Option<&str>, err: &DispatchError) {
        let mut ev = Event::new(EventKind::DispatchFailed)
            .with_worker(self.id())
            .with_reason(err.to_string());
        if let Some(action) = action {
            ev = ev.with_action(action);
        }
        self.inner.bus.publish(ev);
        self.error(err.to_string()).await;
    }

    async fn best_effort(&self, msg: Message) {
        let topic = msg.topic.clone();
        if let Err(err) = self.publish(msg).await {
            warn!(worker = %self.id(), %topic, error = %err, label = err.as_label(), "publish failed");
        }
    }
}

impl fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("id", &self.id())
            .field("namespace", &self.inner.topics.namespace())
            .finish_non_exhaustive()
    }
}

/// Strings go out verbatim, everything else as JSON.
fn encode(value: Value) -> Vec<u8> {
    match value {
        Value::String(s) => s.into_bytes(),
        other => other.to_string().into_bytes(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::transport::{MemoryTransport, Transport};

    fn ctx(transport: Arc<MemoryTransport>) -> WorkerContext {
        let root = CancellationToken::new();
        WorkerContext::new(
            Topics::new("ns", "a"),
            transport,
            WorkerConfig::empty(),
            Arc::new(TaskScope::new(&root)),
            Bus::new(16),
            SharedState::new(),
        )
    }

    #[test]
    fn encoding_keeps_strings_raw() {
        assert_eq!(encode(json!("armed")), b"armed".to_vec());
        assert_eq!(encode(json!(3)), b"3".to_vec());
        assert_eq!(encode(json!({"k": true})), br#"{"k":true}"#.to_vec());
    }

    #[tokio::test]
    async fn command_goes_through_the_bus_once() {
        let t = MemoryTransport::new();
        let mut sub = t.subscribe("ns/b/cmd", QoS::AtLeastOnce).await.unwrap();
        ctx(Arc::clone(&t)).command("b", "start", None).await.unwrap();

        let got = sub.recv().await.unwrap();
        assert_eq!(got.payload_str(), r#"{"action":"start"}"#);
        assert!(sub.try_recv().is_none());
        assert_eq!(t.published_on("ns/b/cmd").len(), 1);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_target() {
        let t = MemoryTransport::new();
        ctx(Arc::clone(&t))
            .broadcast(["b", "c"], "arm", Some(json!(1)))
            .await
            .unwrap();
        assert_eq!(t.published_matching("ns/+/cmd").len(), 2);
    }

    #[tokio::test]
    async fn state_is_retained_and_telemetry_is_not() {
        let t = MemoryTransport::new();
        let c = ctx(Arc::clone(&t));
        c.state("armed").await;
        c.telemetry("tick", 4).await;
        assert_eq!(t.retained("ns/a/state").unwrap().payload_str(), "armed");
        assert!(t.retained("ns/a/telemetry/tick").is_none());
        assert_eq!(t.published_on("ns/a/telemetry/tick")[0].payload_str(), "4");
    }

    #[tokio::test]
    async fn publish_failures_are_swallowed() {
        let t = MemoryTransport::new();
        let c = ctx(Arc::clone(&t));
        t.disconnect().await.unwrap();
        c.telemetry("tick", 1).await;
        assert!(c.command("b", "x", None).await.is_err());
    }

    #[tokio::test]
    async fn failing_task_reports_status_error() {
        let t = MemoryTransport::new();
        let c = ctx(Arc::clone(&t));
        c.spawn_fn("boom", |_token| async {
            Err(TaskError::Fail {
                error: "sensor gone".into(),
            })
        });
        c.cancel_and_join().await;
        let errors = t.published_on("ns/a/status/error");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].payload_str().contains("sensor gone"));
    }

    impl WorkerContext {
        async fn cancel_and_join(&self) {
            self.scope().cancel();
            let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(1);
            let _ = self.scope().join_until(deadline).await;
        }
    }
}
