//! Cross-process coordination ports
//!
//! The scheduler uses these to keep two workers from running the same job
//! and to deliver events between processes. A network-backed adapter lives
//! outside this crate; [`InMemoryCoordinator`] implements the same contract
//! for a single process and for tests.

use crate::core::config::LockConfig;
use crate::core::value::Value;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Errors raised by a coordination backend
#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("coordination backend unavailable: {0}")]
    Unavailable(String),

    #[error("failed to subscribe to topic '{topic}': {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("failed to publish to topic '{topic}': {reason}")]
    Publish { topic: String, reason: String },
}

/// Short-lived, non-blocking mutual exclusion
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Try to take `key`; `false` means someone else holds it
    async fn lock(&self, key: &str) -> Result<bool, CoordinationError>;

    /// Release `key` regardless of who holds it
    async fn unlock(&self, key: &str) -> Result<(), CoordinationError>;
}

/// Shared key-value cache with per-entry expiry
#[async_trait]
pub trait Cache: Send + Sync {
    /// Store `value` under `key`; a zero `ttl` keeps it until overwritten
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CoordinationError>;

    /// Current value of `key`, `None` when missing or expired
    async fn get(&self, key: &str) -> Result<Option<Value>, CoordinationError>;
}

/// Byte-oriented publish/subscribe between processes
#[async_trait]
pub trait PubSubAdapter: Send + Sync {
    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), CoordinationError>;

    async fn subscribe(
        &self,
        topic: &str,
    ) -> Result<Box<dyn AdapterSubscription>, CoordinationError>;
}

/// A live subscription obtained from a [`PubSubAdapter`]
#[async_trait]
pub trait AdapterSubscription: Send {
    /// Next message; `None` once closed
    async fn recv(&mut self) -> Option<Vec<u8>>;

    /// Unsubscribe, then close the stream; idempotent
    async fn close(&mut self) -> Result<(), CoordinationError>;
}

/// Every coordination capability from one backend
pub trait Coordinator: DistributedLock + PubSubAdapter + Cache {}

impl<T: DistributedLock + PubSubAdapter + Cache> Coordinator for T {}

const TOPIC_CAPACITY: usize = 64;

/// Single-process coordination backend
pub struct InMemoryCoordinator {
    key_prefix: String,
    ttl: Duration,
    locks: Mutex<HashMap<String, Instant>>,
    topics: Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

struct CacheEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

impl InMemoryCoordinator {
    pub fn new(config: &LockConfig) -> Self {
        Self::with_ttl(config.key_prefix.clone(), config.ttl())
    }

    pub fn with_ttl(key_prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            key_prefix: key_prefix.into(),
            ttl,
            locks: Mutex::new(HashMap::new()),
            topics: Mutex::new(HashMap::new()),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    fn locks(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn topics(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<Vec<u8>>>> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryCoordinator {
    fn default() -> Self {
        Self::new(&LockConfig::default())
    }
}

#[async_trait]
impl DistributedLock for InMemoryCoordinator {
    async fn lock(&self, key: &str) -> Result<bool, CoordinationError> {
        let key = self.lock_key(key);
        let now = Instant::now();
        let mut locks = self.locks();

        match locks.get(&key) {
            Some(expires_at) if *expires_at > now => {
                debug!("Lock {} is held", key);
                Ok(false)
            }
            _ => {
                locks.insert(key, now + self.ttl);
                Ok(true)
            }
        }
    }

    async fn unlock(&self, key: &str) -> Result<(), CoordinationError> {
        self.locks().remove(&self.lock_key(key));
        Ok(())
    }
}

#[async_trait]
impl Cache for InMemoryCoordinator {
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CoordinationError> {
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        self.entries()
            .insert(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, CoordinationError> {
        let now = Instant::now();
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PubSubAdapter for InMemoryCoordinator {
    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<(), CoordinationError> {
        let mut topics = self.topics();
        let Some(sender) = topics.get(topic) else {
            return Ok(());
        };
        // Every subscriber is gone, forget the topic until someone subscribes again
        if sender.receiver_count() == 0 {
            topics.remove(topic);
            debug!("Dropped idle topic '{}'", topic);
            return Ok(());
        }
        let _ = sender.send(data);
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
    ) -> Result<Box<dyn AdapterSubscription>, CoordinationError> {
        let receiver = self
            .topics()
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe();

        Ok(Box::new(MemorySubscription {
            topic: topic.to_string(),
            receiver: Some(receiver),
        }))
    }
}

struct MemorySubscription {
    topic: String,
    receiver: Option<broadcast::Receiver<Vec<u8>>>,
}

#[async_trait]
impl AdapterSubscription for MemorySubscription {
    async fn recv(&mut self) -> Option<Vec<u8>> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(data) => return Some(data),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Subscription to '{}' lagged, {} message(s) skipped", self.topic, skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    async fn close(&mut self) -> Result<(), CoordinationError> {
        if self.receiver.take().is_some() {
            debug!("Unsubscribed from '{}'", self.topic);
        }
        Ok(())
    }
}
