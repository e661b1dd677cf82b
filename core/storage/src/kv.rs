//! Key-value store client contract.

use async_trait::async_trait;
use std::sync::Arc;

use twinsync_common::Result;

/// One live connection to a key-value store.
///
/// Handles are shared as `Arc<dyn KvStore>`; the connection manager is the
/// only owner that may close one.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Address this connection was opened against.
    fn endpoint(&self) -> &str;

    /// Whether the connection is still usable.
    ///
    /// Implementations flip this to `false` once an I/O failure proves the
    /// connection dead. A store-side rejection of a single command does not.
    fn is_connected(&self) -> bool;

    /// Overwrite `key` with `value`.
    ///
    /// # Errors
    /// - `Error::Write` if the store rejected the command
    /// - `Error::Connection` if the connection failed
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Read `key`; `None` if it does not exist.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Close the connection. Closing twice is a no-op.
    async fn close(&self) -> Result<()>;
}

/// Opens connections to a key-value store.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Backend name (e.g., "resp", "memory").
    fn name(&self) -> &str;

    /// Open a connection to `endpoint`.
    ///
    /// # Preconditions
    /// - `endpoint` is non-empty
    ///
    /// # Errors
    /// - `Error::Connection` if the store is unreachable or rejects the client
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn KvStore>>;
}
