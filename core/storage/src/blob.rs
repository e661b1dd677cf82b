//! Bulk object fetcher contract and in-memory implementation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use twinsync_common::{BlobCoordinates, Error, Result};

/// Downloads the full content of a bulk source object.
#[async_trait]
pub trait BlobFetcher: Send + Sync {
    /// Fetcher name (e.g., "azure", "memory").
    fn name(&self) -> &str;

    /// Fetch the complete object content into memory.
    ///
    /// # Preconditions
    /// - `coords.is_complete()`
    ///
    /// # Errors
    /// - `Error::Fetch { retryable: true, .. }` for transport failures and
    ///   server-side errors that may clear up
    /// - `Error::Fetch { retryable: false, .. }` for missing objects and
    ///   rejected credentials
    async fn fetch(&self, coords: &BlobCoordinates) -> Result<Vec<u8>>;
}

/// Key used by [`MemoryBlobFetcher`]: account, container and object name.
type ObjectKey = (String, String, String);

/// In-memory object store for testing.
///
/// Objects are addressed by account/container/name; the credential must
/// match the one the object was published with.
#[derive(Clone, Default)]
pub struct MemoryBlobFetcher {
    objects: Arc<RwLock<HashMap<ObjectKey, (String, Vec<u8>)>>>,
    transient_failures: Arc<AtomicUsize>,
    fetches: Arc<AtomicUsize>,
}

impl MemoryBlobFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `content` at the location `coords` names.
    pub fn publish(&self, coords: &BlobCoordinates, content: impl Into<Vec<u8>>) {
        self.objects.write().unwrap_or_else(|e| e.into_inner()).insert(
            (
                coords.account.clone(),
                coords.container.clone(),
                coords.blob.clone(),
            ),
            (coords.sas_token.as_query().to_string(), content.into()),
        );
    }

    /// Fail the next `count` fetches with a retryable error.
    pub fn fail_next(&self, count: usize) {
        self.transient_failures.store(count, Ordering::SeqCst);
    }

    /// Number of fetch attempts so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobFetcher for MemoryBlobFetcher {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch(&self, coords: &BlobCoordinates) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let pending = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if pending.is_ok() {
            return Err(Error::fetch_transient("Simulated transient failure"));
        }

        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        let key = (
            coords.account.clone(),
            coords.container.clone(),
            coords.blob.clone(),
        );

        match objects.get(&key) {
            Some((token, data)) if token == coords.sas_token.as_query() => Ok(data.clone()),
            Some(_) => Err(Error::fetch_permanent(format!(
                "Access denied to {}",
                coords
            ))),
            None => Err(Error::fetch_permanent(format!("Object not found: {}", coords))),
        }
    }
}
