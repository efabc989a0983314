//! Named-topic publish/subscribe router.
//!
//! Callbacks registered on a topic are invoked in subscription order,
//! synchronously on the publishing thread, before [`EventBus::publish`]
//! returns. The topic table sits behind a reader/writer lock: publishes share
//! it, subscription changes take it exclusively. A publish copies the topic's
//! callback list and releases the lock before invoking anything, so callbacks
//! may themselves subscribe, unsubscribe or publish.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::args::EventArgs;

/// Subscriber callback
pub type EventCallback = Arc<dyn Fn(&EventArgs) + Send + Sync>;

/// Token returned by [`EventBus::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    callback: EventCallback,
}

#[derive(Default)]
struct BusInner {
    topics: RwLock<HashMap<String, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

/// Topic router shared by cloning; clones refer to the same table
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `callback` to `topic`'s subscriber list.
    ///
    /// Registering the same callback twice makes it run twice per publish.
    pub fn subscribe<F>(&self, topic: impl AsRef<str>, callback: F) -> SubscriptionId
    where
        F: Fn(&EventArgs) + Send + Sync + 'static,
    {
        let topic = topic.as_ref();
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));

        let mut topics = self.inner.topics.write();
        topics.entry(topic.to_string()).or_default().push(Subscriber {
            id,
            callback: Arc::new(callback),
        });

        debug!("Subscribed {:?} to topic {}", id, topic);
        id
    }

    /// Remove one subscription. Returns false when the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut topics = self.inner.topics.write();

        let Some(topic) = topics
            .iter()
            .find(|(_, subs)| subs.iter().any(|s| s.id == id))
            .map(|(name, _)| name.clone())
        else {
            return false;
        };

        if let Some(subs) = topics.get_mut(&topic) {
            subs.retain(|s| s.id != id);
            if subs.is_empty() {
                topics.remove(&topic);
            }
        }

        debug!("Unsubscribed {:?} from topic {}", id, topic);
        true
    }

    /// Drop every subscriber of `topic`
    pub fn clear_topic(&self, topic: impl AsRef<str>) {
        self.inner.topics.write().remove(topic.as_ref());
    }

    /// Drop every subscriber of every topic
    pub fn clear(&self) {
        self.inner.topics.write().clear();
    }

    /// Number of callbacks registered on `topic`
    pub fn subscriber_count(&self, topic: impl AsRef<str>) -> usize {
        self.inner
            .topics
            .read()
            .get(topic.as_ref())
            .map_or(0, Vec::len)
    }

    /// Topics with at least one subscriber
    pub fn topics(&self) -> Vec<String> {
        self.inner.topics.read().keys().cloned().collect()
    }

    /// Invoke every callback on `topic` with `args`, in subscription order.
    ///
    /// A topic without subscribers is a no-op. Callback panics propagate to
    /// the caller.
    ///
    /// Callbacks run on a snapshot taken under the read lock, after the lock
    /// is released, so they may subscribe, unsubscribe or publish on this bus.
    /// A subscription made during a publish sees only later publishes.
    pub fn publish(&self, topic: impl AsRef<str>, args: &EventArgs) {
        let topic = topic.as_ref();
        let callbacks: Vec<EventCallback> = {
            let topics = self.inner.topics.read();
            match topics.get(topic) {
                Some(subs) => subs.iter().map(|s| Arc::clone(&s.callback)).collect(),
                None => return,
            }
        };

        trace!(
            "Publishing {} to {} subscriber(s) on {}",
            topic,
            callbacks.len(),
            args.connection()
        );
        for callback in &callbacks {
            callback(args);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let topics = self.inner.topics.read();
        let counts: HashMap<&str, usize> = topics
            .iter()
            .map(|(name, subs)| (name.as_str(), subs.len()))
            .collect();
        f.debug_struct("EventBus").field("topics", &counts).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{ConnectionId, StateCode};
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn args() -> EventArgs {
        EventArgs::new(ConnectionId::INVALID, "test").with_state(StateCode::Success)
    }

    #[test]
    fn test_publish_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for n in 1..=5 {
            let order = Arc::clone(&order);
            bus.subscribe("T", move |_| order.lock().push(n));
        }

        bus.publish("T", &args());
        assert_eq!(*order.lock(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_publish_is_synchronous() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        bus.subscribe("T", move |a| {
            assert_eq!(a.message(), "test");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish("T", &args());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregistered_topic_is_noop() {
        let bus = EventBus::new();
        bus.publish("nobody-listens", &args());
        assert_eq!(bus.subscriber_count("nobody-listens"), 0);
    }

    #[test]
    fn test_duplicate_registration_runs_twice() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let callback = {
            let hits = Arc::clone(&hits);
            move |_: &EventArgs| {
                hits.fetch_add(1, Ordering::SeqCst);
            }
        };

        bus.subscribe("T", callback.clone());
        bus.subscribe("T", callback);
        bus.publish("T", &args());

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_topics_are_isolated() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        bus.subscribe("A", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish("B", &args());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        bus.publish("A", &args());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let ids: Vec<_> = (1..=3)
            .map(|n| {
                let order = Arc::clone(&order);
                bus.subscribe("T", move |_| order.lock().push(n))
            })
            .collect();

        assert!(bus.unsubscribe(ids[1]));
        assert!(!bus.unsubscribe(ids[1]));
        bus.publish("T", &args());
        assert_eq!(*order.lock(), vec![1, 3]);

        assert!(bus.unsubscribe(ids[0]));
        assert!(bus.unsubscribe(ids[2]));
        assert!(bus.topics().is_empty());
    }

    #[test]
    fn test_clear() {
        let bus = EventBus::new();
        bus.subscribe("A", |_| {});
        bus.subscribe("A", |_| {});
        bus.subscribe("B", |_| {});

        assert_eq!(bus.subscriber_count("A"), 2);
        bus.clear_topic("A");
        assert_eq!(bus.subscriber_count("A"), 0);
        assert_eq!(bus.subscriber_count("B"), 1);

        bus.clear();
        assert!(bus.topics().is_empty());
    }

    #[test]
    fn test_reentrant_subscribe_and_publish() {
        let bus = EventBus::new();
        let inner_hits = Arc::new(AtomicUsize::new(0));

        let handle = bus.clone();
        let hits = Arc::clone(&inner_hits);
        bus.subscribe("outer", move |a| {
            let hits = Arc::clone(&hits);
            handle.subscribe("inner", move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
            handle.publish("inner", a);
        });

        bus.publish("outer", &args());
        assert_eq!(inner_hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count("inner"), 1);
    }

    #[test]
    fn test_subscribe_during_publish_sees_later_publishes() {
        let bus = EventBus::new();
        let late_hits = Arc::new(AtomicUsize::new(0));

        let handle = bus.clone();
        let hits = Arc::clone(&late_hits);
        bus.subscribe("topic", move |_| {
            let hits = Arc::clone(&hits);
            handle.subscribe("topic", move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        });

        bus.publish("topic", &args());
        assert_eq!(late_hits.load(Ordering::SeqCst), 0);

        bus.publish("topic", &args());
        assert_eq!(late_hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count("topic"), 3);
    }

    #[test]
    fn test_concurrent_publish_and_subscribe() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        bus.subscribe("T", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let publishers: Vec<_> = (0..4)
            .map(|_| {
                let bus = bus.clone();
                thread::spawn(move || {
                    for _ in 0..250 {
                        bus.publish("T", &args());
                    }
                })
            })
            .collect();
        let subscriber = {
            let bus = bus.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    bus.subscribe("other", |_| {});
                }
            })
        };

        for handle in publishers {
            handle.join().unwrap();
        }
        subscriber.join().unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1000);
        assert_eq!(bus.subscriber_count("other"), 100);
    }

    #[test]
    #[should_panic(expected = "subscriber failed")]
    fn test_callback_panic_propagates() {
        let bus = EventBus::new();
        bus.subscribe("T", |_| panic!("subscriber failed"));
        bus.publish("T", &args());
    }
}
