//! Local subscription table shared by transport implementations.
//!
//! Maps topic filters to bounded per-subscription queues. Delivery never
//! blocks: a full queue drops the message for that subscription only.

use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::warn;

use super::{Message, QoS, Subscription};

struct Entry {
    filter: String,
    qos: QoS,
    tx: mpsc::Sender<Message>,
}

/// Filter → queue table.
pub(crate) struct SubscriptionTable {
    entries: Mutex<Vec<Entry>>,
    capacity: usize,
}

impl SubscriptionTable {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    /// Adds an entry and returns its receiving side.
    pub(crate) fn add(&self, filter: &str, qos: QoS) -> Subscription {
        self.add_with_backlog(filter, qos, Vec::new())
    }

    /// Adds an entry whose queue is pre-filled with `backlog` (retained messages).
    ///
    /// Backlog beyond the queue capacity is dropped.
    pub(crate) fn add_with_backlog(
        &self,
        filter: &str,
        qos: QoS,
        backlog: Vec<Message>,
    ) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity.max(backlog.len().min(1024)));
        for msg in backlog {
            if tx.try_send(msg).is_err() {
                break;
            }
        }
        let mut entries = self.lock();
        entries.retain(|e| !e.tx.is_closed());
        entries.push(Entry {
            filter: filter.to_owned(),
            qos,
            tx,
        });
        Subscription::new(filter.to_owned(), rx)
    }

    /// Delivers `msg` to every matching subscription. Returns the number of queues reached.
    pub(crate) fn deliver(&self, msg: &Message) -> usize {
        let mut delivered = 0;
        let mut entries = self.lock();
        entries.retain(|e| !e.tx.is_closed());
        for entry in entries.iter() {
            if !topic_matches(&entry.filter, &msg.topic) {
                continue;
            }
            match entry.tx.try_send(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(filter = %entry.filter, topic = %msg.topic, "subscription queue full, message dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    /// Live filters with their highest requested QoS, deduplicated.
    pub(crate) fn filters(&self) -> Vec<(String, QoS)> {
        let entries = self.lock();
        let mut out: Vec<(String, QoS)> = Vec::new();
        for entry in entries.iter().filter(|e| !e.tx.is_closed()) {
            match out.iter_mut().find(|(f, _)| *f == entry.filter) {
                Some((_, qos)) => *qos = (*qos).max(entry.qos),
                None => out.push((entry.filter.clone(), entry.qos)),
            }
        }
        out
    }

    /// Drops every sender; receivers observe end-of-stream.
    pub(crate) fn close_all(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// MQTT topic filter matching.
///
/// `+` matches exactly one level, a trailing `#` matches the parent level and
/// everything below it. Topics starting with `$` are never matched by a
/// wildcard in the first level.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut f = filter.split('/');
    let mut t = topic.split('/');
    loop {
        match (f.next(), t.next()) {
            (Some("#"), _) => return f.next().is_none(),
            (Some("+"), Some(_)) => {}
            (Some(fl), Some(tl)) if fl == tl => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_single_level_wildcards() {
        assert!(topic_matches("a/b/c", "a/b/c"));
        assert!(!topic_matches("a/b/c", "a/b"));
        assert!(topic_matches("a/+/c", "a/x/c"));
        assert!(!topic_matches("a/+/c", "a/x/y/c"));
        assert!(topic_matches("halloween/+/cmd", "halloween/coffin/cmd"));
        assert!(!topic_matches("halloween/+/cmd", "halloween/coffin/state"));
    }

    #[test]
    fn multi_level_wildcard_matches_parent_and_below() {
        assert!(topic_matches("a/#", "a"));
        assert!(topic_matches("a/#", "a/b/c"));
        assert!(topic_matches("#", "anything/at/all"));
        assert!(!topic_matches("a/#/b", "a/x/b"));
    }

    #[test]
    fn dollar_topics_skip_leading_wildcards() {
        assert!(!topic_matches("#", "$SYS/uptime"));
        assert!(!topic_matches("+/uptime", "$SYS/uptime"));
        assert!(topic_matches("$SYS/#", "$SYS/uptime"));
    }

    #[tokio::test]
    async fn full_queue_drops_only_for_that_subscription() {
        let table = SubscriptionTable::new(1);
        let mut a = table.add("t", QoS::AtMostOnce);
        let mut b = table.add("t", QoS::AtMostOnce);

        assert_eq!(table.deliver(&Message::new("t", "1")), 2);
        assert_eq!(a.try_recv().map(|m| m.payload), Some(b"1".to_vec()));
        // `b` still holds "1"; the second message only reaches `a`.
        assert_eq!(table.deliver(&Message::new("t", "2")), 1);
        assert_eq!(a.try_recv().map(|m| m.payload), Some(b"2".to_vec()));
        assert_eq!(b.try_recv().map(|m| m.payload), Some(b"1".to_vec()));
        assert!(b.try_recv().is_none());
    }

    #[test]
    fn filters_are_deduplicated_with_highest_qos() {
        let table = SubscriptionTable::new(4);
        let _a = table.add("x/cmd", QoS::AtMostOnce);
        let _b = table.add("x/cmd", QoS::AtLeastOnce);
        let dropped = table.add("y/cmd", QoS::AtMostOnce);
        drop(dropped);
        assert_eq!(table.filters(), vec![("x/cmd".to_owned(), QoS::AtLeastOnce)]);
    }
}
