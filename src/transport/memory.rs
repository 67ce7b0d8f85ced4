//! # In-process broker.
//!
//! [`MemoryTransport`] behaves like a single MQTT broker with one connected
//! client: wildcard subscriptions, retained messages (delivered on subscribe,
//! cleared by an empty retained payload) and last wills. It also records every
//! publish so tests can assert on what went out.
//!
//! - [`MemoryTransport::sever`] simulates an unclean drop: only the
//!   connection will (see [`MemoryTransport::with_connection_will`]) fires,
//!   as with a real broker that holds one will per client. Availability
//!   registered through [`Transport::register_will`] keeps its last retained
//!   value.
//! - [`Transport::disconnect`] is a clean close: wills are forgotten.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{Message, QoS, Subscription, SubscriptionTable, Transport, Will, topic_matches};
use crate::error::TransportError;

const DEFAULT_QUEUE: usize = 256;

#[derive(Default)]
struct State {
    retained: BTreeMap<String, Message>,
    history: Vec<Message>,
    wills: Vec<Will>,
    connection_will: Option<Will>,
    closed: bool,
}

/// In-process broker implementing [`Transport`].
pub struct MemoryTransport {
    state: Mutex<State>,
    table: SubscriptionTable,
}

impl MemoryTransport {
    /// Creates a broker with the default per-subscription queue size.
    pub fn new() -> Arc<Self> {
        Self::with_queue_capacity(DEFAULT_QUEUE)
    }

    /// Creates a broker with the given per-subscription queue size.
    pub fn with_queue_capacity(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
            table: SubscriptionTable::new(capacity),
        })
    }

    /// Creates a broker holding `will` as the connection last-will.
    pub fn with_connection_will(will: Will) -> Arc<Self> {
        let t = Self::new();
        t.lock().connection_will = Some(will);
        t
    }

    /// Every message published so far, in order.
    pub fn published(&self) -> Vec<Message> {
        self.lock().history.clone()
    }

    /// Published messages on exactly `topic`.
    pub fn published_on(&self, topic: &str) -> Vec<Message> {
        self.lock()
            .history
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Published messages whose topic matches `filter`.
    pub fn published_matching(&self, filter: &str) -> Vec<Message> {
        self.lock()
            .history
            .iter()
            .filter(|m| topic_matches(filter, &m.topic))
            .cloned()
            .collect()
    }

    /// Current retained message on `topic`.
    pub fn retained(&self, topic: &str) -> Option<Message> {
        self.lock().retained.get(topic).cloned()
    }

    /// Wills currently registered.
    pub fn wills(&self) -> Vec<Will> {
        self.lock().wills.clone()
    }

    /// Whether the transport has been disconnected or severed.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Forgets the recorded history (retained messages stay).
    pub fn clear_history(&self) {
        self.lock().history.clear();
    }

    /// Drops the connection uncleanly: the connection will publishes its
    /// `offline` payload and subscriptions end.
    pub fn sever(&self) {
        let will = {
            let mut st = self.lock();
            if st.closed {
                return;
            }
            st.wills.clear();
            st.connection_will.take()
        };
        if let Some(will) = will {
            self.route(will.offline_message());
        }
        self.lock().closed = true;
        self.table.close_all();
    }

    fn route(&self, msg: Message) {
        // Delivery happens under the state lock so that a concurrent subscribe
        // sees a message either in its retained backlog or live, never both.
        let mut st = self.lock();
        if msg.retain {
            if msg.payload.is_empty() {
                st.retained.remove(&msg.topic);
            } else {
                st.retained.insert(msg.topic.clone(), msg.clone());
            }
        }
        self.table.deliver(&msg);
        st.history.push(msg);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, msg: Message) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.route(msg);
        Ok(())
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> Result<Subscription, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        // Held across `add` so no publish slips between snapshot and registration.
        let st = self.lock();
        let retained: Vec<Message> = st
            .retained
            .values()
            .filter(|m| topic_matches(filter, &m.topic))
            .cloned()
            .collect();
        let sub = self.table.add_with_backlog(filter, qos, retained);
        drop(st);
        Ok(sub)
    }

    async fn register_will(&self, will: Will) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let online = will.online_message();
        {
            let mut st = self.lock();
            st.wills.retain(|w| w.topic != will.topic);
            st.wills.push(will);
        }
        self.route(online);
        Ok(())
    }

    fn clear_will(&self, topic: &str) {
        self.lock().wills.retain(|w| w.topic != topic);
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        {
            let mut st = self.lock();
            st.wills.clear();
            st.connection_will = None;
            st.closed = true;
        }
        self.table.close_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_matching_subscriptions() {
        let t = MemoryTransport::new();
        let mut sub = t.subscribe("ns/+/cmd", QoS::AtLeastOnce).await.unwrap();
        t.publish(Message::new("ns/a/cmd", "ping")).await.unwrap();
        t.publish(Message::new("ns/a/state", "x")).await.unwrap();

        let got = sub.recv().await.unwrap();
        assert_eq!(got.topic, "ns/a/cmd");
        assert!(sub.try_recv().is_none());
        assert_eq!(t.published().len(), 2);
    }

    #[tokio::test]
    async fn retained_messages_reach_late_subscribers() {
        let t = MemoryTransport::new();
        t.publish(Message::new("ns/a/state", "armed").retained())
            .await
            .unwrap();
        let mut sub = t.subscribe("ns/a/#", QoS::AtMostOnce).await.unwrap();
        let got = sub.try_recv().unwrap();
        assert_eq!(got.payload_str(), "armed");
        assert!(got.retain);
    }

    #[tokio::test]
    async fn empty_retained_payload_clears() {
        let t = MemoryTransport::new();
        t.publish(Message::new("k", "v").retained()).await.unwrap();
        t.publish(Message::new("k", Vec::<u8>::new()).retained())
            .await
            .unwrap();
        assert!(t.retained("k").is_none());
    }

    #[tokio::test]
    async fn sever_fires_only_the_connection_will() {
        let t = MemoryTransport::with_connection_will(Will::availability("ns/host/availability"));
        t.register_will(Will::availability("ns/host/availability"))
            .await
            .unwrap();
        t.register_will(Will::availability("ns/a/status/availability"))
            .await
            .unwrap();
        t.sever();

        assert_eq!(
            t.retained("ns/host/availability").unwrap().payload_str(),
            "offline"
        );
        assert_eq!(
            t.retained("ns/a/status/availability").unwrap().payload_str(),
            "online"
        );
        assert!(t.wills().is_empty());
        assert!(t.publish(Message::new("x", "y")).await.is_err());
    }

    #[tokio::test]
    async fn disconnect_forgets_the_connection_will() {
        let t = MemoryTransport::with_connection_will(Will::availability("ns/host/availability"));
        t.register_will(Will::availability("ns/host/availability"))
            .await
            .unwrap();
        t.disconnect().await.unwrap();
        t.sever();
        assert_eq!(
            t.retained("ns/host/availability").unwrap().payload_str(),
            "online"
        );
    }

    #[tokio::test]
    async fn sever_without_connection_will_publishes_nothing() {
        let t = MemoryTransport::new();
        t.register_will(Will::availability("w")).await.unwrap();
        t.sever();
        assert_eq!(t.published_on("w").len(), 1);
    }

    #[tokio::test]
    async fn subscriptions_end_on_disconnect() {
        let t = MemoryTransport::new();
        let mut sub = t.subscribe("#", QoS::AtMostOnce).await.unwrap();
        t.disconnect().await.unwrap();
        assert!(sub.recv().await.is_none());
    }
}
