//! Store connection lifecycle.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use twinsync_common::Result;
use twinsync_storage::{KvStore, StoreConnector};

/// Outcome of a successful [`StoreConnectionManager::ensure_connected`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionChange {
    /// A connection to `endpoint` is live.
    Connected { endpoint: String },
    /// No connection is live; `previous` names the one that was closed.
    Disconnected { previous: Option<String> },
}

/// Current connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected { endpoint: String },
}

/// Shared, read-only view of the live store handle.
///
/// Callers outside the reconciliation loop (direct methods) borrow the
/// handle through this without waiting for a cycle to finish.
#[derive(Clone, Default)]
pub struct StoreSlot {
    inner: Arc<RwLock<Option<Arc<dyn KvStore>>>>,
}

impl StoreSlot {
    /// The live handle, if any.
    pub async fn current(&self) -> Option<Arc<dyn KvStore>> {
        self.inner.read().await.clone()
    }
}

/// Owns the single store connection.
///
/// At most one connection is live. Every open/close sequence runs under one
/// async mutex, so concurrent callers are serialized and a connection is
/// never closed while it is being opened.
pub struct StoreConnectionManager {
    connector: Arc<dyn StoreConnector>,
    slot: StoreSlot,
    transition: Mutex<()>,
}

impl StoreConnectionManager {
    pub fn new(connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            connector,
            slot: StoreSlot::default(),
            transition: Mutex::new(()),
        }
    }

    /// Make `target` the live connection.
    ///
    /// An empty `target` closes any connection and leaves the manager
    /// disconnected. Otherwise any existing connection is closed and a new
    /// one opened; a live, healthy connection to `target` is kept as is.
    ///
    /// # Errors
    /// - `Error::Connection` if the new connection cannot be opened; the
    ///   manager is disconnected afterwards
    pub async fn ensure_connected(&self, target: &str) -> Result<ConnectionChange> {
        let _guard = self.transition.lock().await;

        if !target.is_empty() {
            if let Some(current) = self.slot.current().await {
                if current.endpoint() == target && current.is_connected() {
                    debug!(endpoint = target, "store already connected");
                    return Ok(ConnectionChange::Connected {
                        endpoint: target.to_string(),
                    });
                }
            }
        }

        let previous = self.close_current().await;

        if target.is_empty() {
            info!("Store endpoint is empty; staying disconnected");
            return Ok(ConnectionChange::Disconnected { previous });
        }

        match self.connector.connect(target).await {
            Ok(handle) => {
                *self.slot.inner.write().await = Some(handle);
                info!(endpoint = target, backend = self.connector.name(), "Store connected");
                Ok(ConnectionChange::Connected {
                    endpoint: target.to_string(),
                })
            }
            Err(e) => {
                warn!(endpoint = target, "Store connection failed: {}", e);
                Err(e)
            }
        }
    }

    /// The live handle, if any. Callers must not hold it past their run.
    pub async fn current(&self) -> Option<Arc<dyn KvStore>> {
        self.slot.current().await
    }

    /// Shared view of the live handle.
    pub fn slot(&self) -> StoreSlot {
        self.slot.clone()
    }

    pub async fn state(&self) -> ConnectionState {
        match self.slot.current().await {
            Some(handle) if handle.is_connected() => ConnectionState::Connected {
                endpoint: handle.endpoint().to_string(),
            },
            _ => ConnectionState::Disconnected,
        }
    }

    /// Drop the live handle if its connection has been lost.
    ///
    /// Returns `true` if a dead connection was removed.
    pub async fn invalidate_if_dead(&self) -> bool {
        let _guard = self.transition.lock().await;

        let dead = matches!(self.slot.current().await, Some(handle) if !handle.is_connected());
        if dead {
            if let Some(endpoint) = self.close_current().await {
                warn!(endpoint = %endpoint, "Store connection lost; handle dropped");
            }
        }
        dead
    }

    /// Close the live connection, if any.
    pub async fn close(&self) {
        let _guard = self.transition.lock().await;
        self.close_current().await;
    }

    /// Take the handle out of the slot and close it. Caller holds `transition`.
    async fn close_current(&self) -> Option<String> {
        let handle = self.slot.inner.write().await.take()?;
        let endpoint = handle.endpoint().to_string();

        match handle.close().await {
            Ok(()) => info!(endpoint = %endpoint, "Store connection closed"),
            Err(e) => warn!(endpoint = %endpoint, "Error closing store connection: {}", e),
        }
        Some(endpoint)
    }
}
