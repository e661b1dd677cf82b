//! Snapshot queueing and the reconciliation worker loop.

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use twinsync_common::{ConfigurationSnapshot, Error, Result};

use crate::engine::{CycleReport, ReconciliationEngine};

type Request = (ConfigurationSnapshot, Option<oneshot::Sender<CycleReport>>);

/// Submits snapshots to the reconciliation worker.
///
/// Snapshots that arrive while a cycle is running wait in a bounded queue.
/// When the worker picks them up, everything queued is merged into one
/// snapshot (later values win) and reconciled in a single cycle.
#[derive(Clone)]
pub struct ReconcileScheduler {
    request_tx: mpsc::Sender<Request>,
    shutdown: CancellationToken,
}

impl ReconcileScheduler {
    /// Create a scheduler and the worker that serves it.
    ///
    /// `shutdown` stops the worker; hand the same token to the engine so
    /// in-flight network steps are aborted too.
    pub fn new(capacity: usize, shutdown: CancellationToken) -> (Self, ReconcileWorker) {
        let (request_tx, request_rx) = mpsc::channel(capacity.max(1));

        let scheduler = Self {
            request_tx,
            shutdown: shutdown.clone(),
        };
        let worker = ReconcileWorker {
            request_rx,
            shutdown,
        };

        (scheduler, worker)
    }

    /// Queue a snapshot without waiting for its cycle.
    pub async fn submit(&self, snapshot: ConfigurationSnapshot) -> Result<()> {
        self.request_tx
            .send((snapshot, None))
            .await
            .map_err(|_| Error::Cancelled)
    }

    /// Queue a snapshot and wait for the cycle that applies it.
    ///
    /// # Errors
    /// - `Error::Cancelled` if the worker stopped before the cycle ran
    pub async fn reconcile(&self, snapshot: ConfigurationSnapshot) -> Result<CycleReport> {
        let (response_tx, response_rx) = oneshot::channel();

        self.request_tx
            .send((snapshot, Some(response_tx)))
            .await
            .map_err(|_| Error::Cancelled)?;

        response_rx.await.map_err(|_| Error::Cancelled)
    }

    /// Stop the worker. Queued snapshots are dropped.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Background half of a [`ReconcileScheduler`].
pub struct ReconcileWorker {
    request_rx: mpsc::Receiver<Request>,
    shutdown: CancellationToken,
}

impl ReconcileWorker {
    /// Run cycles one at a time until shutdown or until every scheduler
    /// handle is dropped. Closes the store connection and hands the engine
    /// back on exit.
    pub async fn run(mut self, mut engine: ReconciliationEngine) -> ReconciliationEngine {
        info!("Reconciliation worker started");

        loop {
            let (mut snapshot, waiter) = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                request = self.request_rx.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            let mut waiters: Vec<_> = waiter.into_iter().collect();
            let mut merged = 1;
            while let Ok((next, waiter)) = self.request_rx.try_recv() {
                snapshot.merge(next);
                waiters.extend(waiter);
                merged += 1;
            }
            if merged > 1 {
                debug!(merged, "Coalesced queued snapshots");
            }

            let report = engine.on_snapshot(&snapshot).await;
            for waiter in waiters {
                let _ = waiter.send(report.clone());
            }
        }

        engine.close().await;
        info!(cycles = engine.cycles(), "Reconciliation worker stopped");
        engine
    }
}
