//! # worker-host
//!
//! Runs the worker host against an MQTT broker.
//!
//! # Usage
//!
//! ```bash
//! worker-host --mqtt-host broker --props-root /app/props
//! ```
//!
//! # Environment Variables
//!
//! Every flag can also be set via the environment:
//!
//! - `MQTT_HOST`, `MQTT_PORT`, `MQTT_USERNAME`, `MQTT_PASSWORD`, `MQTT_CLIENT_ID`
//! - `WORKER_NAMESPACE`: first topic segment
//! - `WORKER_PROPS_ROOT`, `WORKER_BUILTIN_ROOT`: discovery roots
//! - `WORKER_DISABLE_ALL`, `WORKER_ALLOW`, `WORKER_DISABLE`: filtering
//! - `WORKER_GRACE_SECS`: shutdown grace period
//!
//! See `--help` for the full list of options.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use propvisor::{
    Bus, DEFAULT_NAMESPACE, DiscoveryRoot, Host, HostConfig, MqttSettings, MqttTransport,
    RuntimeError, Topics, Will, WorkerFilter,
};

/// Command-line arguments for the worker host.
#[derive(Parser, Debug)]
#[command(name = "worker-host", version, about = "Prop worker host")]
struct Args {
    /// Broker host name
    #[arg(long, env = "MQTT_HOST", default_value = "broker")]
    mqtt_host: String,

    /// Broker port
    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    mqtt_port: u16,

    #[arg(long, env = "MQTT_USERNAME", default_value = "")]
    mqtt_username: String,

    #[arg(long, env = "MQTT_PASSWORD", default_value = "", hide_env_values = true)]
    mqtt_password: String,

    #[arg(long, env = "MQTT_CLIENT_ID", default_value = "halloween_worker_host")]
    mqtt_client_id: String,

    /// Topic namespace
    #[arg(long, env = "WORKER_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Root holding `<prop>/backend/worker.json`
    #[arg(long, env = "WORKER_PROPS_ROOT", default_value = "/app/props")]
    props_root: PathBuf,

    /// Root holding `<name>/worker.json` for built-in workers
    #[arg(
        long,
        env = "WORKER_BUILTIN_ROOT",
        default_value = "/app/server/worker_host/builtin_workers"
    )]
    builtin_root: PathBuf,

    /// Start no workers at all
    #[arg(long, env = "WORKER_DISABLE_ALL", default_value_t = false)]
    disable_all: bool,

    /// Comma-separated ids; when set, only these run
    #[arg(long, env = "WORKER_ALLOW")]
    allow: Option<String>,

    /// Comma-separated ids that never run
    #[arg(long, env = "WORKER_DISABLE")]
    disable: Option<String>,

    /// Shutdown grace period (seconds)
    #[arg(long, env = "WORKER_GRACE_SECS", default_value_t = 10)]
    grace_secs: u64,

    /// Host uptime publish interval (seconds, 0 disables)
    #[arg(long, env = "WORKER_UPTIME_SECS", default_value_t = 10)]
    uptime_secs: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(err) = run().await {
        error!(error = %err, "worker host failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let filter = WorkerFilter::new()
        .disable_all(args.disable_all)
        .allow(WorkerFilter::parse_list(args.allow.as_deref().unwrap_or_default()))
        .disable(WorkerFilter::parse_list(args.disable.as_deref().unwrap_or_default()));
    let cfg = HostConfig {
        namespace: args.namespace.clone(),
        grace: Duration::from_secs(args.grace_secs),
        uptime_interval: Duration::from_secs(args.uptime_secs),
        roots: vec![
            DiscoveryRoot::builtin(&args.builtin_root),
            DiscoveryRoot::props(&args.props_root),
        ],
        filter,
        ..HostConfig::default()
    };

    let mut mqtt = MqttSettings::new(&args.mqtt_host, args.mqtt_port, &args.mqtt_client_id);
    mqtt.username = non_empty(args.mqtt_username);
    mqtt.password = non_empty(args.mqtt_password);
    mqtt.will = Some(Will::availability(Topics::host_availability(&cfg.namespace)));
    let connect_timeout = mqtt.connect_timeout;

    let bus = Bus::new(cfg.bus_capacity_clamped());
    let transport =
        MqttTransport::connect(mqtt, bus.clone()).context("invalid MQTT settings")?;
    if transport.wait_connected(connect_timeout).await {
        info!(host = %args.mqtt_host, port = args.mqtt_port, "connected to broker");
    } else {
        warn!(host = %args.mqtt_host, port = args.mqtt_port, "broker not reachable yet, continuing");
    }

    let host = Host::builder(cfg)
        .transport(transport)
        .bus(bus)
        .build()
        .context("cannot build host")?;

    match host.run().await {
        Ok(()) => Ok(()),
        Err(RuntimeError::GraceExceeded { grace, stuck }) => {
            warn!(?grace, ?stuck, "some tasks were abandoned at shutdown");
            Ok(())
        }
        Err(err) => Err(err).context("worker host stopped"),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}
