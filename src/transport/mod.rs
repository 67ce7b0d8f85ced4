//! # Bus transport: the single shared broker connection.
//!
//! Every worker instance talks to the outside world (and to other workers)
//! through one [`Transport`] shared by the whole process.
//!
//! ## Contents
//! - [`Transport`] the object-safe publish / subscribe / last-will contract
//! - [`Message`], [`QoS`], [`Will`], [`Subscription`] wire-level data
//! - [`Topics`] canonical topic derivation (`<ns>/<id>/<category>/<key>`)
//! - [`MemoryTransport`] in-process broker (tests, demos)
//! - `MqttTransport` rumqttc-backed broker connection (feature `mqtt`)
//!
//! ## Architecture
//! ```text
//!   WorkerContext ──publish──►┐
//!   CommandRouter ◄─recv───── Subscription ◄── SubscriptionTable ◄── incoming publish
//!   Host          ──will────► │                                          ▲
//!                             ▼                                          │
//!                      Transport impl ──────────── broker ───────────────┘
//! ```
//!
//! ## Rules
//! - Publishing is safe from any task; implementations serialize internally.
//! - Subscriptions are bounded queues; a full queue drops the message for that
//!   subscriber only (logged).
//! - A [`Will`] announces `online` now and `offline` if the host goes away
//!   uncleanly; clearing it is part of a clean stop.

mod memory;
#[cfg(feature = "mqtt")]
mod mqtt;
mod table;
mod topics;

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;

pub use memory::MemoryTransport;
#[cfg(feature = "mqtt")]
pub use mqtt::{MqttSettings, MqttTransport};
pub use table::topic_matches;
pub(crate) use table::SubscriptionTable;
pub use topics::{HOST_ID, Topics};

/// Shared handle to the process-wide transport.
pub type TransportHandle = Arc<dyn Transport>;

/// Delivery quality of service, as chosen by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, PartialOrd, Ord)]
pub enum QoS {
    /// Fire and forget.
    #[default]
    AtMostOnce,
    /// Delivered at least once (duplicates possible).
    AtLeastOnce,
    /// Broker-level exactly once; the host still gives no end-to-end guarantee.
    ExactlyOnce,
}

impl QoS {
    /// Maps a numeric MQTT level (0, 1, 2).
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }

    /// Numeric MQTT level.
    pub fn level(self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

/// A message as published to or received from the broker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

impl Message {
    /// A non-retained QoS 0 message.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            retain: false,
        }
    }

    #[must_use]
    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    #[must_use]
    pub fn retained(mut self) -> Self {
        self.retain = true;
        self
    }

    /// Payload decoded as UTF-8 (lossy).
    pub fn payload_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Retained presence announcement with a last-will counterpart.
///
/// `online` is published (retained) when the will is registered and again after
/// every reconnect; `offline` is published if the connection drops uncleanly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Will {
    pub topic: String,
    pub online: Vec<u8>,
    pub offline: Vec<u8>,
    pub qos: QoS,
}

impl Will {
    /// Standard availability will: `"online"` / `"offline"`, QoS 1.
    pub fn availability(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            online: b"online".to_vec(),
            offline: b"offline".to_vec(),
            qos: QoS::AtLeastOnce,
        }
    }

    /// The retained `online` message.
    pub fn online_message(&self) -> Message {
        Message::new(self.topic.clone(), self.online.clone())
            .with_qos(self.qos)
            .retained()
    }

    /// The retained `offline` message.
    pub fn offline_message(&self) -> Message {
        Message::new(self.topic.clone(), self.offline.clone())
            .with_qos(self.qos)
            .retained()
    }
}

/// Receiving side of a subscription.
///
/// Dropping it unsubscribes locally; the transport prunes closed entries.
#[derive(Debug)]
pub struct Subscription {
    filter: String,
    rx: mpsc::Receiver<Message>,
}

impl Subscription {
    pub(crate) fn new(filter: String, rx: mpsc::Receiver<Message>) -> Self {
        Self { filter, rx }
    }

    /// The topic filter this subscription was created with.
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Waits for the next message; `None` once the transport is closed.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Returns a message if one is already queued.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }
}

/// # The process-wide broker connection.
///
/// Implementations must be safe for concurrent publish/subscribe from many
/// tasks. Publishing during an outage is best-effort: it may fail with a
/// [`TransportError`] which callers log and move on from.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Publishes one message.
    async fn publish(&self, msg: Message) -> Result<(), TransportError>;

    /// Subscribes to a topic filter (MQTT wildcards `+` and `#` allowed).
    async fn subscribe(&self, filter: &str, qos: QoS) -> Result<Subscription, TransportError>;

    /// Registers a presence will and announces `online`.
    async fn register_will(&self, will: Will) -> Result<(), TransportError>;

    /// Forgets a will (clean stop); the caller publishes the final `offline` itself.
    fn clear_will(&self, topic: &str);

    /// Cleanly closes the connection. Registered wills are not fired.
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos_levels_round_trip() {
        for level in 0..=2 {
            assert_eq!(QoS::from_level(level).map(QoS::level), Some(level));
        }
        assert_eq!(QoS::from_level(3), None);
    }

    #[test]
    fn availability_will_messages_are_retained() {
        let will = Will::availability("halloween/x/status/availability");
        let on = will.online_message();
        let off = will.offline_message();
        assert!(on.retain && off.retain);
        assert_eq!(on.payload_str(), "online");
        assert_eq!(off.payload_str(), "offline");
        assert_eq!(off.qos, QoS::AtLeastOnce);
    }
}
