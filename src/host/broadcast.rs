//! # Named cross-context broadcast topics.
//!
//! [`BroadcastService`] hands out the two ends of a named topic. Every
//! [`FanoutChannel`](crate::FanoutChannel) joins its topic once and keeps both
//! ends for its whole lifetime.
//!
//! [`LocalBroadcast`] keeps one [`tokio::sync::broadcast`] sender per topic
//! name. A topic is forgotten once its last receiver is gone, which frees the
//! name for a fresh topic.
//!
//! ## Rules
//! - **Fire-and-forget**: envelopes sent while nobody listens are dropped.
//! - **Bounded**: receivers lagging more than the capacity skip the oldest envelopes.
//! - **Self-delivery** is filtered by the channel handle, not here.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;

/// One fan-out message: an event name and its payload, tagged with the
/// publishing channel handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Id of the [`FanoutChannel`](crate::FanoutChannel) that published it.
    pub sender: u64,
    /// Stream event name.
    pub name: Arc<str>,
    /// Stream event payload.
    pub data: Arc<str>,
}

/// Named broadcast capability shared by every context of an origin.
pub trait BroadcastService: Send + Sync + 'static {
    /// Joins topic `name`, returning its sender and a fresh receiver.
    ///
    /// Both ends are produced atomically, so a concurrent [`release`](Self::release)
    /// can never split one name into two topics.
    fn join(&self, name: &str) -> (broadcast::Sender<Envelope>, broadcast::Receiver<Envelope>);

    /// Forgets topic `name` if no receiver is subscribed to it anymore.
    fn release(&self, name: &str);
}

/// In-process [`BroadcastService`].
pub struct LocalBroadcast {
    topics: DashMap<String, broadcast::Sender<Envelope>>,
    capacity: usize,
}

impl LocalBroadcast {
    /// Creates a service whose topics buffer up to `capacity` envelopes (min 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Number of topics currently known.
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

impl BroadcastService for LocalBroadcast {
    fn join(&self, name: &str) -> (broadcast::Sender<Envelope>, broadcast::Receiver<Envelope>) {
        let capacity = self.capacity;
        let entry = self
            .topics
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(capacity).0);
        let tx = entry.value().clone();
        let rx = tx.subscribe();
        (tx, rx)
    }

    fn release(&self, name: &str) {
        self.topics
            .remove_if(name, |_, tx| tx.receiver_count() == 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(sender: u64) -> Envelope {
        Envelope {
            sender,
            name: "tick".into(),
            data: "1".into(),
        }
    }

    #[tokio::test]
    async fn same_name_shares_one_topic() {
        let hub = LocalBroadcast::new(8);
        let (tx_a, _rx_a) = hub.join("C");
        let (_tx_b, mut rx_b) = hub.join("C");
        let (_tx_other, mut rx_other) = hub.join("other");

        tx_a.send(envelope(1)).expect("receivers present");
        assert_eq!(rx_b.recv().await.expect("delivered"), envelope(1));
        assert!(rx_other.try_recv().is_err());
    }

    #[test]
    fn release_keeps_topics_with_listeners() {
        let hub = LocalBroadcast::new(8);
        let (_tx, rx) = hub.join("C");

        hub.release("C");
        assert_eq!(hub.topic_count(), 1);

        drop(rx);
        hub.release("C");
        assert_eq!(hub.topic_count(), 0);
    }
}
