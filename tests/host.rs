use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use propvisor::{
    Call, DiscoveryError, DiscoveryRoot, FactoryFn, HandlerError, HandlerTable, Host, HostConfig,
    MemoryTransport, Message, NO_WORKERS_WARNING, RuntimeError, TaskError, Transport, Worker,
    EventKind, WorkerCatalog, WorkerContext, WorkerError, WorkerFilter, WorkerState,
};
use serde_json::{Value, json};
use tempfile::TempDir;

const NS: &str = "halloween";

/// Answers `ping` and `chromecast`, optionally leaves a task that ignores cancellation.
struct Bat {
    stubborn: bool,
}

impl Bat {
    async fn ping(self: Arc<Self>, call: Call) -> Result<(), HandlerError> {
        call.ctx.telemetry("pong", "ok").await;
        Ok(())
    }

    async fn chromecast(self: Arc<Self>, call: Call) -> Result<(), HandlerError> {
        let volume = call
            .args
            .as_ref()
            .and_then(|a| a.get("volume"))
            .and_then(Value::as_f64)
            .ok_or_else(|| HandlerError::invalid_argument("volume missing"))?;
        call.ctx.telemetry("volume", volume).await;
        Ok(())
    }
}

#[async_trait]
impl Worker for Bat {
    async fn start(self: Arc<Self>, ctx: WorkerContext) -> Result<(), WorkerError> {
        ctx.state("idle").await;
        if self.stubborn {
            ctx.spawn_fn("stubborn", |_token| {
                std::future::pending::<Result<(), TaskError>>()
            });
        }
        Ok(())
    }

    fn handlers(self: Arc<Self>) -> HandlerTable {
        HandlerTable::bound(&self)
            .on("ping", Bat::ping)
            .on("chromecast", Bat::chromecast)
            .build()
    }
}

/// Forwards `go` as a `start` command to the worker named in its argument.
struct Caller;

#[async_trait]
impl Worker for Caller {
    async fn start(self: Arc<Self>, _ctx: WorkerContext) -> Result<(), WorkerError> {
        Ok(())
    }

    fn handlers(self: Arc<Self>) -> HandlerTable {
        HandlerTable::new().on("go", |call: Call| async move {
            let target = call.arg_str().unwrap_or("b").to_owned();
            call.ctx.command(&target, "start", None).await?;
            Ok(())
        })
    }
}

/// Never finishes `start`.
struct Sloth;

#[async_trait]
impl Worker for Sloth {
    async fn start(self: Arc<Self>, _ctx: WorkerContext) -> Result<(), WorkerError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

const NOTES: [&str; 5] = ["one", "two", "three", "four", "five"];

/// Echoes each action on `telemetry/seen`.
struct Scribe;

#[async_trait]
impl Worker for Scribe {
    async fn start(self: Arc<Self>, _ctx: WorkerContext) -> Result<(), WorkerError> {
        Ok(())
    }

    fn handlers(self: Arc<Self>) -> HandlerTable {
        NOTES.iter().fold(HandlerTable::new(), |table, action| {
            table.on(action, |call: Call| async move {
                call.ctx.telemetry("seen", call.action.as_str()).await;
                Ok(())
            })
        })
    }
}

fn catalog(stubborn: bool) -> WorkerCatalog {
    let mut catalog = WorkerCatalog::with_builtins();
    catalog.register(
        FactoryFn::new("bat", move |_| Ok(Arc::new(Bat { stubborn }) as _)).arc(),
    );
    catalog.register(FactoryFn::new("caller", |_| Ok(Arc::new(Caller) as _)).arc());
    catalog.register(FactoryFn::new("sloth", |_| Ok(Arc::new(Sloth) as _)).arc());
    catalog.register(FactoryFn::new("scribe", |_| Ok(Arc::new(Scribe) as _)).arc());
    catalog
}

fn prop(root: &Path, folder: &str, manifest: Value) {
    let dir = root.join(folder).join("backend");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("worker.json"), manifest.to_string()).unwrap();
}

fn config(root: &Path) -> HostConfig {
    HostConfig {
        grace: Duration::from_millis(300),
        stop_window: Duration::from_millis(50),
        uptime_interval: Duration::ZERO,
        roots: vec![DiscoveryRoot::props(root)],
        ..HostConfig::default()
    }
}

fn host(cfg: HostConfig, t: &Arc<MemoryTransport>, stubborn: bool) -> Arc<Host> {
    Host::builder(cfg)
        .transport(Arc::clone(t) as _)
        .catalog(catalog(stubborn))
        .subscribers(Vec::new())
        .build()
        .unwrap()
}

async fn settle(t: &MemoryTransport, topic: &str, n: usize) -> Vec<Message> {
    for _ in 0..200 {
        let got = t.published_on(topic);
        if got.len() >= n {
            return got;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    t.published_on(topic)
}

#[tokio::test]
async fn missing_capability_is_one_failure_and_the_rest_runs() {
    let dir = TempDir::new().unwrap();
    prop(dir.path(), "bat", json!({"kind": "bat"}));
    prop(dir.path(), "ghost", json!({"kind": "projector"}));

    let t = MemoryTransport::new();
    let h = host(config(dir.path()), &t, false);
    let report = h.load().await;
    h.start_all().await;

    assert_eq!(report.failures.len(), 1);
    assert!(matches!(
        &report.failures[0],
        DiscoveryError::UnknownKind { kind, .. } if kind == "projector"
    ));
    assert_eq!(h.registry().ids().await, ["bat"]);
    let bat = h.registry().get("bat").await.unwrap();
    assert_eq!(bat.state(), WorkerState::Running);

    h.shutdown().await.unwrap();
}

#[tokio::test]
async fn disable_all_starts_nothing() {
    let dir = TempDir::new().unwrap();
    prop(dir.path(), "bat", json!({"kind": "bat"}));

    let mut cfg = config(dir.path());
    cfg.filter = WorkerFilter::new().disable_all(true);
    let t = MemoryTransport::new();
    let h = host(cfg, &t, false);
    let report = h.load().await;

    assert!(h.registry().is_empty().await);
    assert_eq!(report.filtered.len(), 1);
    h.shutdown().await.unwrap();
}

#[tokio::test]
async fn allow_list_beats_disable_list() {
    let dir = TempDir::new().unwrap();
    prop(dir.path(), "a", json!({"kind": "bat"}));
    prop(dir.path(), "b", json!({"kind": "bat"}));
    prop(dir.path(), "c", json!({"kind": "bat"}));

    let mut cfg = config(dir.path());
    cfg.filter = WorkerFilter::new().allow(["a"]).disable(["a", "b"]);
    let t = MemoryTransport::new();
    let h = host(cfg, &t, false);
    h.load().await;

    assert_eq!(h.registry().ids().await, ["a"]);
    h.shutdown().await.unwrap();
}

#[tokio::test]
async fn empty_roots_publish_a_warning() {
    let dir = TempDir::new().unwrap();
    let t = MemoryTransport::new();
    let h = host(config(dir.path()), &t, false);
    h.load().await;

    let warn = t.published_on(&format!("{NS}/worker_host/status/warn"));
    assert_eq!(warn.len(), 1);
    assert_eq!(warn[0].payload_str(), NO_WORKERS_WARNING);
    h.shutdown().await.unwrap();
}

#[tokio::test]
async fn text_and_json_commands_reach_handlers() {
    let dir = TempDir::new().unwrap();
    prop(dir.path(), "bat", json!({"kind": "bat"}));
    let t = MemoryTransport::new();
    let h = host(config(dir.path()), &t, false);
    h.load().await;
    h.start_all().await;

    t.publish(Message::new(format!("{NS}/bat/cmd"), "ping")).await.unwrap();
    t.publish(Message::new(
        format!("{NS}/bat/cmd"),
        r#"{"action":"chromecast","args":{"volume":0.5}}"#,
    ))
    .await
    .unwrap();

    assert_eq!(settle(&t, &format!("{NS}/bat/telemetry/pong"), 1).await.len(), 1);
    let volume = settle(&t, &format!("{NS}/bat/telemetry/volume"), 1).await;
    assert_eq!(volume.len(), 1);
    assert_eq!(volume[0].payload_str(), "0.5");

    h.shutdown().await.unwrap();
}

#[tokio::test]
async fn unknown_action_reports_once_and_keeps_serving() {
    let dir = TempDir::new().unwrap();
    prop(dir.path(), "bat", json!({"kind": "bat"}));
    let t = MemoryTransport::new();
    let h = host(config(dir.path()), &t, false);
    h.load().await;
    h.start_all().await;

    t.publish(Message::new(format!("{NS}/bat/cmd"), "hover")).await.unwrap();
    t.publish(Message::new(format!("{NS}/bat/cmd"), "ping")).await.unwrap();

    assert_eq!(settle(&t, &format!("{NS}/bat/telemetry/pong"), 1).await.len(), 1);
    let errors = t.published_on(&format!("{NS}/bat/status/error"));
    assert_eq!(errors.len(), 1);
    assert!(errors[0].payload_str().contains("hover"));
    assert_eq!(
        h.registry().get("bat").await.unwrap().state(),
        WorkerState::Running
    );

    h.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_goes_offline_and_reports_stuck_tasks() {
    let dir = TempDir::new().unwrap();
    prop(dir.path(), "bat", json!({"kind": "bat"}));
    let t = MemoryTransport::new();
    let h = host(config(dir.path()), &t, true);
    h.load().await;
    h.start_all().await;
    let bat = h.registry().get("bat").await.unwrap();

    let err = h.shutdown().await.unwrap_err();
    match err {
        RuntimeError::GraceExceeded { stuck, .. } => {
            assert_eq!(stuck, ["bat/stubborn"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(bat.state(), WorkerState::Stopped);
    assert_eq!(
        t.retained(&format!("{NS}/bat/status/availability"))
            .unwrap()
            .payload_str(),
        "offline"
    );
    assert_eq!(
        t.retained(&format!("{NS}/worker_host/availability"))
            .unwrap()
            .payload_str(),
        "offline"
    );
    assert!(t.wills().is_empty());
    assert!(t.is_closed());
}

#[tokio::test]
async fn invalid_config_runs_with_empty_config_and_one_warning() {
    let dir = TempDir::new().unwrap();
    prop(dir.path(), "pumpkin", json!({"kind": "heartbeat"}));
    fs::write(
        dir.path().join("pumpkin/backend/config.json"),
        r#"{"tick_interval": 5,"#,
    )
    .unwrap();

    let t = MemoryTransport::new();
    let h = host(config(dir.path()), &t, false);
    let report = h.load().await;
    h.start_all().await;

    assert_eq!(report.config_warnings.len(), 1);
    assert_eq!(report.config_warnings[0].0, "pumpkin");
    let inst = h.registry().get("pumpkin").await.unwrap();
    assert_eq!(inst.state(), WorkerState::Running);
    assert!(inst.context().config().is_empty());

    h.shutdown().await.unwrap();
}

#[tokio::test]
async fn worker_commands_travel_over_the_transport() {
    let dir = TempDir::new().unwrap();
    prop(dir.path(), "a", json!({"kind": "caller"}));
    prop(dir.path(), "b", json!({"kind": "bat"}));
    let t = MemoryTransport::new();
    let h = host(config(dir.path()), &t, false);
    h.load().await;
    h.start_all().await;

    t.publish(Message::new(format!("{NS}/a/cmd"), "go b")).await.unwrap();

    let sent = settle(&t, &format!("{NS}/b/cmd"), 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let sent_again = t.published_on(&format!("{NS}/b/cmd"));
    assert_eq!(sent.len(), 1);
    assert_eq!(sent_again.len(), 1);
    let payload: Value = serde_json::from_slice(&sent[0].payload).unwrap();
    assert_eq!(payload, json!({"action": "start"}));

    // `b` has no `start` handler.
    let errors = settle(&t, &format!("{NS}/b/status/error"), 1).await;
    assert_eq!(errors.len(), 1);

    h.shutdown().await.unwrap();
}

#[tokio::test]
async fn run_until_stops_on_the_shutdown_token() {
    let dir = TempDir::new().unwrap();
    prop(dir.path(), "bat", json!({"kind": "bat"}));
    let t = MemoryTransport::new();
    let h = host(config(dir.path()), &t, false);

    let stop = h.shutdown_token();
    let state_topic = format!("{NS}/bat/state");
    let stopper = async {
        settle(&t, &state_topic, 1).await;
        stop.cancel();
    };
    let (res, ()) = tokio::time::timeout(
        Duration::from_secs(2),
        async { tokio::join!(h.run_until(std::future::pending()), stopper) },
    )
    .await
    .unwrap();
    assert!(res.is_ok());
    assert_eq!(
        h.registry().get("bat").await.unwrap().state(),
        WorkerState::Stopped
    );
}

#[tokio::test]
async fn blocked_start_does_not_hold_back_others() {
    let dir = TempDir::new().unwrap();
    prop(dir.path(), "bat", json!({"kind": "bat"}));
    prop(dir.path(), "sloth", json!({"kind": "sloth"}));
    let t = MemoryTransport::new();
    let h = host(config(dir.path()), &t, false);
    h.load().await;

    // `sloth` never reaches Running, so `start_all` cannot complete.
    let started = tokio::time::timeout(Duration::from_millis(200), h.start_all()).await;
    assert!(started.is_err());
    assert_eq!(
        h.registry().get("bat").await.unwrap().state(),
        WorkerState::Running
    );
    let sloth = h.registry().get("sloth").await.unwrap();
    assert_eq!(sloth.state(), WorkerState::Starting);

    let began = tokio::time::Instant::now();
    let err = h.shutdown().await.unwrap_err();
    assert!(began.elapsed() < Duration::from_millis(600));
    match err {
        RuntimeError::GraceExceeded { stuck, .. } => assert_eq!(stuck, ["sloth/start"]),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(sloth.state(), WorkerState::Stopped);
    assert_eq!(
        t.retained(&format!("{NS}/sloth/status/availability"))
            .unwrap()
            .payload_str(),
        "offline"
    );
}

#[tokio::test]
async fn commands_to_one_worker_keep_delivery_order() {
    let dir = TempDir::new().unwrap();
    prop(dir.path(), "scribe", json!({"kind": "scribe"}));
    let t = MemoryTransport::new();
    let h = host(config(dir.path()), &t, false);
    h.load().await;
    h.start_all().await;

    let mut events = h.bus().subscribe();
    for action in NOTES {
        t.publish(Message::new(format!("{NS}/scribe/cmd"), action))
            .await
            .unwrap();
    }

    let seen = settle(&t, &format!("{NS}/scribe/telemetry/seen"), NOTES.len()).await;
    let seen: Vec<String> = seen.iter().map(|m| m.payload_str().into_owned()).collect();
    assert_eq!(seen, NOTES);

    let mut dispatched = Vec::new();
    while let Ok(ev) = events.try_recv() {
        if ev.kind == EventKind::CommandDispatched {
            dispatched.push(ev.action.as_deref().unwrap_or_default().to_owned());
        }
    }
    assert_eq!(dispatched, NOTES);

    h.shutdown().await.unwrap();
}
