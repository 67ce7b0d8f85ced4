//! Demo worker: publishes a tick counter and answers a few commands.
//!
//! Commands (text or JSON form):
//! - `ping [text]` → telemetry `pong` = text or `ok`
//! - `set_mode idle|armed|firing` → telemetry `mode`, retained state
//! - `fire [ms]` → telemetry `event` `fire start <ms>ms`, then `fire end`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{HandlerError, TaskError, WorkerError};
use crate::router::{Call, HandlerTable};
use crate::settings::ConfigSchema;
use crate::worker::{FactoryFn, Worker, WorkerContext, WorkerFactory, WorkerInit};

pub const KIND: &str = "heartbeat";

const MODES: [&str; 3] = ["idle", "armed", "firing"];
const DEFAULT_FIRE_MS: u64 = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Seconds between ticks.
    #[serde(default = "default_tick_interval")]
    pub tick_interval: u64,
}

fn default_tick_interval() -> u64 {
    5
}

pub struct Heartbeat {
    interval: Duration,
}

impl Heartbeat {
    pub fn new(init: &WorkerInit) -> Result<Self, WorkerError> {
        let cfg: HeartbeatConfig = init
            .config
            .deserialize()
            .unwrap_or(HeartbeatConfig {
                tick_interval: default_tick_interval(),
            });
        if cfg.tick_interval == 0 {
            return Err(WorkerError::build("tick_interval must be at least 1"));
        }
        Ok(Self {
            interval: Duration::from_secs(cfg.tick_interval),
        })
    }

    pub fn factory() -> Arc<dyn WorkerFactory> {
        FactoryFn::new(KIND, |init| Ok(Arc::new(Heartbeat::new(&init)?) as _))
            .with_schema(ConfigSchema::typed::<HeartbeatConfig>())
            .arc()
    }

    async fn ping(self: Arc<Self>, call: Call) -> Result<(), HandlerError> {
        let reply = call.arg_str().unwrap_or("ok").to_owned();
        call.ctx.telemetry("pong", reply).await;
        Ok(())
    }

    async fn set_mode(self: Arc<Self>, call: Call) -> Result<(), HandlerError> {
        let mode = call.arg_str().map(str::trim).filter(|m| !m.is_empty()).unwrap_or("idle");
        if !MODES.contains(&mode) {
            return Err(HandlerError::invalid_argument(format!("invalid mode '{mode}'")));
        }
        call.ctx.telemetry("mode", mode).await;
        call.ctx.state(mode).await;
        Ok(())
    }

    async fn fire(self: Arc<Self>, call: Call) -> Result<(), HandlerError> {
        let ms = call.arg_u64().unwrap_or(DEFAULT_FIRE_MS);
        call.ctx.telemetry("event", format!("fire start {ms}ms")).await;
        tokio::select! {
            _ = call.ctx.cancelled() => return Ok(()),
            _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
        }
        call.ctx.telemetry("event", "fire end").await;
        Ok(())
    }
}

#[async_trait]
impl Worker for Heartbeat {
    async fn start(self: Arc<Self>, ctx: WorkerContext) -> Result<(), WorkerError> {
        let interval = self.interval;
        let ticker = ctx.clone();
        ctx.spawn_fn("ticker", move |token| {
            let ctx = ticker.clone();
            async move {
                let mut i: u64 = 0;
                loop {
                    ctx.telemetry("tick", i).await;
                    i += 1;
                    tokio::select! {
                        _ = token.cancelled() => return Err(TaskError::Canceled),
                        _ = tokio::time::sleep(interval) => {}
                    }
                }
            }
        });
        Ok(())
    }

    fn handlers(self: Arc<Self>) -> HandlerTable {
        HandlerTable::bound(&self)
            .on("ping", Heartbeat::ping)
            .on("set_mode", Heartbeat::set_mode)
            .on("fire", Heartbeat::fire)
            .build()
    }
}
