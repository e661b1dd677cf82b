//! In-memory key-value store backend for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::debug;

use crate::kv::{KvStore, StoreConnector};
use twinsync_common::{Error, Result};

/// Something that happened against the memory backend, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A connect attempt started.
    ConnectStarted { endpoint: String },
    /// A connect attempt succeeded.
    Connected { endpoint: String },
    /// A connect attempt was refused.
    ConnectRefused { endpoint: String },
    /// A connection was closed.
    Closed { endpoint: String },
    /// A value was written.
    Set {
        endpoint: String,
        key: String,
        value: String,
    },
}

#[derive(Default)]
struct Shared {
    /// Key space per endpoint; survives reconnects like a real server would.
    data: RwLock<HashMap<String, HashMap<String, String>>>,
    journal: Mutex<Vec<StoreEvent>>,
    refused: RwLock<HashSet<String>>,
    rejected_keys: RwLock<HashSet<String>>,
    connect_delay: Mutex<Duration>,
    /// Bumped to sever every open connection at once.
    generation: AtomicU64,
}

impl Shared {
    fn record(&self, event: StoreEvent) {
        self.journal
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

/// In-memory store connector.
///
/// Useful for testing and development. Every endpoint gets its own key space
/// and all data is lost on drop. Failure injection hooks let tests refuse
/// connects, reject writes and sever live connections.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

impl MemoryConnector {
    /// Create a new empty memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse future connects to `endpoint`.
    pub fn refuse(&self, endpoint: impl Into<String>) {
        self.shared
            .refused
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(endpoint.into());
    }

    /// Accept connects to `endpoint` again.
    pub fn accept(&self, endpoint: &str) {
        self.shared
            .refused
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(endpoint);
    }

    /// Reject writes to `key` with a store-side error.
    pub fn reject_key(&self, key: impl Into<String>) {
        self.shared
            .rejected_keys
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into());
    }

    /// Make every connect attempt take `delay` before completing.
    pub fn set_connect_delay(&self, delay: Duration) {
        *self
            .shared
            .connect_delay
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = delay;
    }

    /// Sever every open connection, as if the server went away.
    pub fn sever_connections(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Read a value directly from the backing map.
    pub fn value(&self, endpoint: &str, key: &str) -> Option<String> {
        self.shared
            .data
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(endpoint)
            .and_then(|space| space.get(key).cloned())
    }

    /// Snapshot of the key space stored under `endpoint`.
    pub fn contents(&self, endpoint: &str) -> HashMap<String, String> {
        self.shared
            .data
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(endpoint)
            .cloned()
            .unwrap_or_default()
    }

    /// Everything that happened so far, in order.
    pub fn journal(&self) -> Vec<StoreEvent> {
        self.shared
            .journal
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Only the writes, as `(key, value)` pairs in order.
    pub fn writes(&self) -> Vec<(String, String)> {
        self.journal()
            .into_iter()
            .filter_map(|event| match event {
                StoreEvent::Set { key, value, .. } => Some((key, value)),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded events; stored data is kept.
    pub fn clear_journal(&self) {
        self.shared
            .journal
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

#[async_trait]
impl StoreConnector for MemoryConnector {
    fn name(&self) -> &str {
        "memory"
    }

    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn KvStore>> {
        self.shared.record(StoreEvent::ConnectStarted {
            endpoint: endpoint.to_string(),
        });

        let delay = *self
            .shared
            .connect_delay
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let refused = self
            .shared
            .refused
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(endpoint);
        if refused {
            self.shared.record(StoreEvent::ConnectRefused {
                endpoint: endpoint.to_string(),
            });
            return Err(Error::Connection(format!(
                "Connection refused by {}",
                endpoint
            )));
        }

        self.shared.record(StoreEvent::Connected {
            endpoint: endpoint.to_string(),
        });
        debug!(endpoint, "memory store connected");

        Ok(Arc::new(MemoryStore {
            endpoint: endpoint.to_string(),
            generation: self.shared.generation.load(Ordering::SeqCst),
            open: AtomicBool::new(true),
            shared: self.shared.clone(),
        }))
    }
}

/// Connection handle into a [`MemoryConnector`] key space.
pub struct MemoryStore {
    endpoint: String,
    generation: u64,
    open: AtomicBool,
    shared: Arc<Shared>,
}

#[async_trait]
impl KvStore for MemoryStore {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::SeqCst)
            && self.generation == self.shared.generation.load(Ordering::SeqCst)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::Connection(format!(
                "Connection to {} is closed",
                self.endpoint
            )));
        }

        let rejected = self
            .shared
            .rejected_keys
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key);
        if rejected {
            return Err(Error::Write {
                key: key.to_string(),
                message: "ERR write rejected".to_string(),
            });
        }

        self.shared
            .data
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(self.endpoint.clone())
            .or_default()
            .insert(key.to_string(), value.to_string());

        self.shared.record(StoreEvent::Set {
            endpoint: self.endpoint.clone(),
            key: key.to_string(),
            value: value.to_string(),
        });

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        if !self.is_connected() {
            return Err(Error::Connection(format!(
                "Connection to {} is closed",
                self.endpoint
            )));
        }

        Ok(self
            .shared
            .data
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&self.endpoint)
            .and_then(|space| space.get(key).cloned()))
    }

    async fn close(&self) -> Result<()> {
        if self.open.swap(false, Ordering::SeqCst) {
            self.shared.record(StoreEvent::Closed {
                endpoint: self.endpoint.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get() {
        let connector = MemoryConnector::new();
        let store = connector.connect("cache:6379").await.unwrap();

        store.set("k1", "v1").await.unwrap();

        assert_eq!(store.get("k1").await.unwrap(), Some("v1".to_string()));
        assert_eq!(store.get("missing").await.unwrap(), None);
        assert_eq!(connector.value("cache:6379", "k1"), Some("v1".to_string()));
    }

    #[tokio::test]
    async fn test_key_spaces_are_per_endpoint() {
        let connector = MemoryConnector::new();
        let a = connector.connect("a:6379").await.unwrap();
        let b = connector.connect("b:6379").await.unwrap();

        a.set("k", "from-a").await.unwrap();

        assert_eq!(b.get("k").await.unwrap(), None);
        assert_eq!(connector.contents("a:6379").len(), 1);
    }

    #[tokio::test]
    async fn test_refused_connect() {
        let connector = MemoryConnector::new();
        connector.refuse("down:6379");

        let result = connector.connect("down:6379").await;
        assert!(matches!(result, Err(Error::Connection(_))));

        connector.accept("down:6379");
        assert!(connector.connect("down:6379").await.is_ok());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let connector = MemoryConnector::new();
        let store = connector.connect("cache:6379").await.unwrap();

        store.close().await.unwrap();
        store.close().await.unwrap();

        assert!(!store.is_connected());
        let closes = connector
            .journal()
            .into_iter()
            .filter(|e| matches!(e, StoreEvent::Closed { .. }))
            .count();
        assert_eq!(closes, 1);
        assert!(matches!(store.set("k", "v").await, Err(Error::Connection(_))));
    }

    #[tokio::test]
    async fn test_sever_connections() {
        let connector = MemoryConnector::new();
        let store = connector.connect("cache:6379").await.unwrap();

        connector.sever_connections();

        assert!(!store.is_connected());
        let fresh = connector.connect("cache:6379").await.unwrap();
        assert!(fresh.is_connected());
    }

    #[tokio::test]
    async fn test_rejected_key() {
        let connector = MemoryConnector::new();
        connector.reject_key("locked");
        let store = connector.connect("cache:6379").await.unwrap();

        let result = store.set("locked", "v").await;
        assert!(matches!(result, Err(Error::Write { .. })));
        assert!(store.is_connected());
    }
}
