//! # rumqttc-backed broker connection.
//!
//! One [`MqttTransport`] per process. A background driver polls the rumqttc
//! event loop and routes incoming publishes into the local subscription table.
//!
//! ## Reconnect
//! ```text
//! poll() error ──► connected=false ──► ReconnectScheduled ──► sleep(backoff.next(n))
//!                                                                   │
//! ConnAck(Success) ◄── rumqttc reconnects on next poll() ◄──────────┘
//!     └─► connected=true ──► resubscribe all live filters ──► re-announce wills (online)
//! ```
//!
//! MQTT allows one last will per connection, so the connection-level will is
//! the host's own availability topic. Per-instance wills are remembered and
//! re-announced after every reconnect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, EventLoop, LastWill, MqttOptions, Outgoing, Packet,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Message, QoS, Subscription, SubscriptionTable, Transport, Will};
use crate::error::TransportError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::BackoffPolicy;

/// Connection settings.
#[derive(Clone, Debug)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    pub keep_alive: Duration,
    /// How long the host waits for the first ConnAck before continuing anyway.
    pub connect_timeout: Duration,
    /// Upper bound for handing a publish to the client queue.
    pub publish_timeout: Duration,
    /// Delay policy between reconnect attempts.
    pub reconnect: BackoffPolicy,
    /// Connection-level last will (normally the host availability topic).
    pub will: Option<Will>,
    /// rumqttc request queue size.
    pub request_capacity: usize,
    /// Per-subscription queue size.
    pub subscription_capacity: usize,
}

impl MqttSettings {
    pub fn new(host: impl Into<String>, port: u16, client_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
            client_id: client_id.into(),
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            publish_timeout: Duration::from_secs(5),
            reconnect: BackoffPolicy::default(),
            will: None,
            request_capacity: 256,
            subscription_capacity: 256,
        }
    }

    fn options(&self) -> Result<MqttOptions, TransportError> {
        if self.host.is_empty() {
            return Err(TransportError::Options {
                reason: "empty broker host".into(),
            });
        }
        if self.client_id.is_empty() {
            return Err(TransportError::Options {
                reason: "empty client id".into(),
            });
        }
        let mut opts = MqttOptions::new(&self.client_id, &self.host, self.port);
        opts.set_keep_alive(self.keep_alive.max(Duration::from_secs(5)));
        opts.set_clean_session(true);
        if let Some(user) = &self.username {
            opts.set_credentials(user, self.password.clone().unwrap_or_default());
        }
        if let Some(will) = &self.will {
            opts.set_last_will(LastWill::new(
                will.topic.clone(),
                will.offline.clone(),
                to_mqtt(will.qos),
                true,
            ));
        }
        Ok(opts)
    }
}

struct Shared {
    table: SubscriptionTable,
    wills: Mutex<Vec<Will>>,
    closing: AtomicBool,
}

impl Shared {
    fn wills(&self) -> MutexGuard<'_, Vec<Will>> {
        self.wills.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Re-issues every live subscription and presence after a (re)connect.
    fn restore(&self, client: &AsyncClient) {
        for (filter, qos) in self.table.filters() {
            if let Err(err) = client.try_subscribe(filter.clone(), to_mqtt(qos)) {
                warn!(%filter, error = %err, "resubscribe failed");
            }
        }
        for will in self.wills().iter() {
            if let Err(err) = client.try_publish(
                will.topic.clone(),
                to_mqtt(will.qos),
                true,
                will.online.clone(),
            ) {
                warn!(topic = %will.topic, error = %err, "presence re-announce failed");
            }
        }
    }
}

/// Broker connection implementing [`Transport`].
pub struct MqttTransport {
    client: AsyncClient,
    shared: Arc<Shared>,
    publish_timeout: Duration,
    connected: watch::Receiver<bool>,
    token: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl MqttTransport {
    /// Creates the client and spawns the event-loop driver.
    ///
    /// Returns immediately; the first connection is established in the
    /// background. Use [`wait_connected`](Self::wait_connected) to block on it.
    pub fn connect(settings: MqttSettings, bus: Bus) -> Result<Arc<Self>, TransportError> {
        let opts = settings.options()?;
        let (client, eventloop) = AsyncClient::new(opts, settings.request_capacity.max(1));

        let shared = Arc::new(Shared {
            table: SubscriptionTable::new(settings.subscription_capacity),
            wills: Mutex::new(settings.will.iter().cloned().collect()),
            closing: AtomicBool::new(false),
        });
        let (connected_tx, connected) = watch::channel(false);
        let token = CancellationToken::new();

        let driver = tokio::spawn(drive(
            eventloop,
            client.clone(),
            Arc::clone(&shared),
            settings.reconnect,
            token.clone(),
            connected_tx,
            bus,
        ));

        info!(host = %settings.host, port = settings.port, client_id = %settings.client_id, "mqtt transport started");
        Ok(Arc::new(Self {
            client,
            shared,
            publish_timeout: settings.publish_timeout,
            connected,
            token,
            driver: Mutex::new(Some(driver)),
        }))
    }

    /// Whether the broker session is currently up.
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Waits until the broker session is up or `timeout` elapses.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut rx = self.connected.clone();
        tokio::time::timeout(timeout, rx.wait_for(|up| *up))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.shared.closing.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn publish(&self, msg: Message) -> Result<(), TransportError> {
        self.ensure_open()?;
        let Message {
            topic,
            payload,
            qos,
            retain,
        } = msg;
        let fut = self
            .client
            .publish(topic.clone(), to_mqtt(qos), retain, payload);
        match tokio::time::timeout(self.publish_timeout, fut).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(TransportError::Publish {
                topic,
                reason: err.to_string(),
            }),
            Err(_) => Err(TransportError::Timeout {
                topic,
                timeout: self.publish_timeout,
            }),
        }
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> Result<Subscription, TransportError> {
        self.ensure_open()?;
        let sub = self.shared.table.add(filter, qos);
        self.client
            .subscribe(filter, to_mqtt(qos))
            .await
            .map_err(|err| TransportError::Subscribe {
                filter: filter.to_owned(),
                reason: err.to_string(),
            })?;
        Ok(sub)
    }

    async fn register_will(&self, will: Will) -> Result<(), TransportError> {
        self.ensure_open()?;
        let online = will.online_message();
        {
            let mut wills = self.shared.wills();
            wills.retain(|w| w.topic != will.topic);
            wills.push(will);
        }
        self.publish(online).await
    }

    fn clear_will(&self, topic: &str) {
        self.shared.wills().retain(|w| w.topic != topic);
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if self.shared.closing.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.shared.wills().clear();
        let sent = self.client.disconnect().await;

        let driver = self
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut handle) = driver {
            if tokio::time::timeout(Duration::from_secs(2), &mut handle)
                .await
                .is_err()
            {
                debug!("mqtt driver did not finish after disconnect; cancelling");
                self.token.cancel();
                let _ = handle.await;
            }
        }
        self.token.cancel();
        self.shared.table.close_all();

        sent.map_err(|err| TransportError::Publish {
            topic: String::from("<disconnect>"),
            reason: err.to_string(),
        })
    }
}

async fn drive(
    mut eventloop: EventLoop,
    client: AsyncClient,
    shared: Arc<Shared>,
    reconnect: BackoffPolicy,
    token: CancellationToken,
    connected: watch::Sender<bool>,
    bus: Bus,
) {
    let mut attempt: u32 = 0;
    loop {
        let polled = tokio::select! {
            _ = token.cancelled() => break,
            ev = eventloop.poll() => ev,
        };

        match polled {
            Ok(rumqttc::Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code != ConnectReturnCode::Success {
                    warn!(code = ?ack.code, "broker refused connection");
                    continue;
                }
                attempt = 0;
                connected.send_replace(true);
                bus.publish(Event::new(EventKind::TransportConnected));
                shared.restore(&client);
            }
            Ok(rumqttc::Event::Incoming(Packet::Publish(p))) => {
                let msg = Message {
                    topic: p.topic.clone(),
                    payload: p.payload.to_vec(),
                    qos: from_mqtt(p.qos),
                    retain: p.retain,
                };
                shared.table.deliver(&msg);
            }
            Ok(rumqttc::Event::Outgoing(Outgoing::Disconnect)) => {
                if shared.closing.load(Ordering::Acquire) {
                    break;
                }
            }
            Ok(_) => {}
            Err(err) => {
                connected.send_replace(false);
                if shared.closing.load(Ordering::Acquire) {
                    break;
                }
                attempt = attempt.saturating_add(1);
                let delay = reconnect.next(attempt - 1);
                bus.publish(
                    Event::new(EventKind::ReconnectScheduled)
                        .with_reason(err.to_string())
                        .with_delay(delay)
                        .with_attempt(attempt),
                );
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
    connected.send_replace(false);
    debug!("mqtt driver stopped");
}

fn to_mqtt(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

fn from_mqtt(qos: rumqttc::QoS) -> QoS {
    match qos {
        rumqttc::QoS::AtMostOnce => QoS::AtMostOnce,
        rumqttc::QoS::AtLeastOnce => QoS::AtLeastOnce,
        rumqttc::QoS::ExactlyOnce => QoS::ExactlyOnce,
    }
}
