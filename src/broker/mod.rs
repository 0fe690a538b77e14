//! In-process event broker
//!
//! Relays lifecycle events to local observers such as dashboards and live
//! sessions. Delivery is fire-and-forget: publishing to a topic nobody
//! listens on drops the event, and a subscriber whose buffer is full misses
//! it rather than stalling the publisher.

use crate::core::config::BrokerConfig;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Options for a new subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeSettings {
    /// Number of events buffered before new ones are dropped
    pub buffer_size: usize,
}

impl Default for SubscribeSettings {
    fn default() -> Self {
        Self { buffer_size: 16 }
    }
}

impl SubscribeSettings {
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self { buffer_size }
    }
}

impl From<&BrokerConfig> for SubscribeSettings {
    fn from(config: &BrokerConfig) -> Self {
        Self::with_buffer_size(config.default_buffer_size)
    }
}

struct Registration<T> {
    id: u64,
    sender: mpsc::Sender<T>,
}

type TopicMap<T> = HashMap<String, HashMap<String, Registration<T>>>;

struct BrokerInner<T> {
    topics: Mutex<TopicMap<T>>,
    closed: AtomicBool,
    next_id: AtomicU64,
}

impl<T> BrokerInner<T> {
    fn topics(&self) -> MutexGuard<'_, TopicMap<T>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, topic: &str, name: &str, id: u64) {
        let mut topics = self.topics();
        if let Some(subscribers) = topics.get_mut(topic) {
            // A newer subscription may have taken over the name
            if subscribers.get(name).is_some_and(|reg| reg.id == id) {
                subscribers.remove(name);
            }
            if subscribers.is_empty() {
                topics.remove(topic);
            }
        }
    }

    fn is_registered(&self, topic: &str, name: &str, id: u64) -> bool {
        self.topics()
            .get(topic)
            .and_then(|subscribers| subscribers.get(name))
            .is_some_and(|reg| reg.id == id)
    }
}

/// Topic-based broker with named, bounded subscribers
pub struct EventBroker<T> {
    inner: Arc<BrokerInner<T>>,
}

impl<T> Clone for EventBroker<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Default for EventBroker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> EventBroker<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                topics: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Deliver `data` to every live subscriber of `topic`
    pub fn publish(&self, topic: &str, data: T) {
        if self.is_closed() {
            return;
        }

        let topics = self.inner.topics();
        let Some(subscribers) = topics.get(topic) else {
            return;
        };

        for (name, registration) in subscribers {
            match registration.sender.try_send(data.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("Subscriber '{}' on topic '{}' is full, event dropped", name, topic);
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
    }

    /// Register a named subscriber on `topic`
    ///
    /// Returns `None` once the broker is closed. Subscribing again with the
    /// same name replaces the earlier subscriber, whose stream then ends.
    pub fn subscribe(
        &self,
        topic: &str,
        name: &str,
        settings: SubscribeSettings,
    ) -> Option<Subscription<T>> {
        let (sender, receiver) = mpsc::channel(settings.buffer_size.max(1));
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        {
            let mut topics = self.inner.topics();
            // Checked under the lock so close() can't miss this registration
            if self.is_closed() {
                return None;
            }
            topics
                .entry(topic.to_string())
                .or_default()
                .insert(name.to_string(), Registration { id, sender });
        }

        debug!("Subscriber '{}' registered on topic '{}'", name, topic);
        Some(Subscription {
            topic: topic.to_string(),
            name: name.to_string(),
            id,
            receiver,
            broker: Arc::downgrade(&self.inner),
            closed: false,
        })
    }

    /// Close the broker and every live subscriber; idempotent
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Dropping the senders ends every subscriber stream
        let drained = std::mem::take(&mut *self.inner.topics());
        let count: usize = drained.values().map(HashMap::len).sum();
        debug!("Event broker closed, {} subscriber(s) released", count);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Number of live subscribers on `topic`
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner.topics().get(topic).map_or(0, HashMap::len)
    }
}

/// A named subscriber's stream of events
pub struct Subscription<T> {
    topic: String,
    name: String,
    id: u64,
    receiver: mpsc::Receiver<T>,
    broker: Weak<BrokerInner<T>>,
    closed: bool,
}

impl<T> Subscription<T> {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next event; `None` once the subscription or the broker is closed
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Next buffered event without waiting
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Release the registration and close the stream; idempotent
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        self.receiver.close();
        while self.receiver.try_recv().is_ok() {}

        if let Some(broker) = self.broker.upgrade() {
            broker.remove(&self.topic, &self.name, self.id);
        }
        debug!("Subscriber '{}' on topic '{}' closed", self.name, self.topic);
    }

    /// Whether the stream has ended: closed here, by the broker, or replaced
    /// by a newer subscriber with the same name
    pub fn is_closed(&self) -> bool {
        if self.closed {
            return true;
        }
        self.broker.upgrade().map_or(true, |broker| {
            broker.closed.load(Ordering::SeqCst)
                || !broker.is_registered(&self.topic, &self.name, self.id)
        })
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.close();
    }
}
