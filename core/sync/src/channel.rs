//! Configuration channel contract.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use twinsync_common::{Error, ReportedState, Result};

/// Where reported state goes once fields have been applied.
///
/// Snapshot delivery is the host's concern: it feeds snapshots to the
/// scheduler. The engine only needs to report back.
#[async_trait]
pub trait ConfigChannel: Send + Sync {
    /// Channel name for logs (e.g., "stdout", "memory").
    fn name(&self) -> &str;

    /// Publish one combined reported-state update.
    ///
    /// # Errors
    /// - `Error::Channel` if the update could not be delivered
    async fn report_state(&self, reported: &ReportedState) -> Result<()>;
}

/// In-memory channel for testing; records every report in order.
#[derive(Clone, Default)]
pub struct MemoryChannel {
    reports: Arc<Mutex<Vec<ReportedState>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent reports fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Reports delivered so far.
    pub fn reports(&self) -> Vec<ReportedState> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ConfigChannel for MemoryChannel {
    fn name(&self) -> &str {
        "memory"
    }

    async fn report_state(&self, reported: &ReportedState) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Channel("Reported properties update rejected".to_string()));
        }
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(reported.clone());
        Ok(())
    }
}
