//! Reconciliation engine that turns configuration snapshots into store state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use twinsync_common::{ConfigField, ConfigurationSnapshot, Error, ReportedState, Result};
use twinsync_storage::{BlobFetcher, StoreConnector};

use crate::bulk::{BulkLoadPipeline, LoadFailure, LoadReport, MalformedLinePolicy};
use crate::channel::ConfigChannel;
use crate::connection::{ConnectionChange, StoreConnectionManager, StoreSlot};
use crate::differ::diff;
use crate::retry::FetchRetry;
use crate::state::{AppliedState, EngineState};

/// Configuration for the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum number of retries for a transient fetch failure.
    pub fetch_max_retries: u32,
    /// Delay before the first fetch retry.
    pub fetch_initial_delay_ms: u64,
    /// Cap on the delay between fetch retries.
    pub fetch_max_delay_ms: u64,
    /// Snapshots that may wait while a cycle runs before submitters block.
    pub queue_capacity: usize,
    /// Handling of bulk source lines without a delimiter.
    pub malformed_line_policy: MalformedLinePolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fetch_max_retries: 3,
            fetch_initial_delay_ms: 1_000,
            fetch_max_delay_ms: 30_000,
            queue_capacity: 16,
            malformed_line_policy: MalformedLinePolicy::Abort,
        }
    }
}

impl SyncConfig {
    /// Retry settings for bulk source downloads.
    pub fn fetch_retry(&self) -> FetchRetry {
        FetchRetry {
            max_retries: self.fetch_max_retries,
            initial_delay: Duration::from_millis(self.fetch_initial_delay_ms),
            max_delay: Duration::from_millis(self.fetch_max_delay_ms),
        }
    }

    /// Check the values make sense together.
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::InvalidInput(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.fetch_initial_delay_ms > self.fetch_max_delay_ms {
            return Err(Error::InvalidInput(
                "fetch_initial_delay_ms must not exceed fetch_max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}

/// What one reconciliation cycle did, step by step.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// 1-based cycle number.
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    /// Fields whose resolved value changed, in field order.
    pub changed: Vec<ConfigField>,
    /// Connection step; `None` when the endpoint did not change.
    pub connection: Option<Result<ConnectionChange>>,
    /// Fields echoed to the channel (only successfully applied ones).
    pub reported: ReportedState,
    /// Set when the reported-state update could not be delivered.
    pub report_error: Option<Error>,
    /// Bulk load step; `None` when no complete bulk source was configured.
    pub bulk_load: Option<std::result::Result<LoadReport, LoadFailure>>,
    /// The cycle stopped early because of shutdown.
    pub cancelled: bool,
}

impl CycleReport {
    fn new(cycle: u64) -> Self {
        Self {
            cycle,
            started_at: Utc::now(),
            duration: Duration::ZERO,
            changed: Vec::new(),
            connection: None,
            reported: ReportedState::new(),
            report_error: None,
            bulk_load: None,
            cancelled: false,
        }
    }

    /// Nothing changed, so nothing was done.
    pub fn is_noop(&self) -> bool {
        self.changed.is_empty()
    }

    /// Every attempted step succeeded.
    pub fn succeeded(&self) -> bool {
        !self.cancelled
            && self.report_error.is_none()
            && !matches!(self.connection, Some(Err(_)))
            && !matches!(self.bulk_load, Some(Err(_)))
    }
}

/// Applies configuration snapshots.
///
/// Owns the applied state and the store connection. `on_snapshot` takes
/// `&mut self`, so cycles cannot overlap on one engine; the scheduler
/// additionally queues snapshots that arrive while a cycle is running.
pub struct ReconciliationEngine {
    applied: AppliedState,
    state: EngineState,
    connections: StoreConnectionManager,
    pipeline: BulkLoadPipeline,
    channel: Arc<dyn ConfigChannel>,
    shutdown: CancellationToken,
    cycles: u64,
}

impl ReconciliationEngine {
    /// Create an engine with empty applied state and no connection.
    pub fn new(
        connector: Arc<dyn StoreConnector>,
        fetcher: Arc<dyn BlobFetcher>,
        channel: Arc<dyn ConfigChannel>,
        config: &SyncConfig,
    ) -> Self {
        let pipeline = BulkLoadPipeline::new(
            fetcher,
            config.fetch_retry(),
            config.malformed_line_policy,
        );

        Self {
            applied: AppliedState::new(),
            state: EngineState::Idle,
            connections: StoreConnectionManager::new(connector),
            pipeline,
            channel,
            shutdown: CancellationToken::new(),
            cycles: 0,
        }
    }

    /// Abort in-flight network steps when `token` is cancelled.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn applied_state(&self) -> &AppliedState {
        &self.applied
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn connections(&self) -> &StoreConnectionManager {
        &self.connections
    }

    /// Shared view of the live store handle, for direct methods.
    pub fn store_slot(&self) -> StoreSlot {
        self.connections.slot()
    }

    /// Number of cycles run so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Close the store connection. Part of process shutdown.
    pub async fn close(&self) {
        self.connections.close().await;
    }

    /// Run one reconciliation cycle for `snapshot`.
    ///
    /// Never fails as a whole: each step's outcome is recorded in the
    /// returned report and the engine is back in `Idle` afterwards.
    pub async fn on_snapshot(&mut self, snapshot: &ConfigurationSnapshot) -> CycleReport {
        self.cycles += 1;
        let mut report = CycleReport::new(self.cycles);
        let start = Instant::now();

        self.state = EngineState::Reconciling;
        self.reconcile(snapshot, &mut report).await;
        self.state = EngineState::Idle;

        report.duration = start.elapsed();
        if !report.is_noop() {
            info!(
                cycle = report.cycle,
                changed = report.changed.len(),
                reported = report.reported.len(),
                succeeded = report.succeeded(),
                "Reconciliation cycle finished in {:?}",
                report.duration
            );
        }
        report
    }

    async fn reconcile(&mut self, snapshot: &ConfigurationSnapshot, report: &mut CycleReport) {
        let changes = diff(&self.applied, snapshot);
        if changes.is_empty() {
            if snapshot.recognized_count() == 0 {
                info!(properties = snapshot.len(), "No recognized configuration fields; snapshot ignored");
            } else {
                debug!("Configuration unchanged");
            }
            return;
        }

        report.changed = changes.fields();

        let mut candidate = self.applied.clone();
        let mut reported = ReportedState::new();
        for change in changes.iter() {
            info!(
                field = %change.field,
                from = change.field.display_value(&change.previous),
                to = change.field.display_value(&change.value),
                "Configuration field changed"
            );
            candidate.set(change.field, change.value.clone());
            reported.insert(change.field, change.value.clone());
        }

        if let Some(change) = changes.get(ConfigField::Endpoint) {
            let outcome = self
                .cancellable(self.connections.ensure_connected(&change.value))
                .await;

            match &outcome {
                Ok(_) => self.applied.set(ConfigField::Endpoint, change.value.clone()),
                Err(e) => {
                    error!(
                        field = %ConfigField::Endpoint,
                        step = "connect",
                        endpoint = %change.value,
                        "Endpoint not applied: {}",
                        e
                    );
                    reported.remove(ConfigField::Endpoint);
                    candidate.set(ConfigField::Endpoint, change.previous.clone());
                }
            }

            let cancelled = matches!(outcome, Err(Error::Cancelled));
            report.connection = Some(outcome);
            if cancelled {
                report.cancelled = true;
                return;
            }
        }

        if !reported.is_empty() {
            match self.channel.report_state(&reported).await {
                Ok(()) => debug!(
                    fields = reported.len(),
                    channel = self.channel.name(),
                    "Reported state updated"
                ),
                Err(e) => {
                    error!(step = "report", channel = self.channel.name(), "Failed to update reported state: {}", e);
                    report.report_error = Some(e);
                }
            }
        }
        report.reported = reported;

        // A load failure does not hold back the coordinates: the load can
        // simply be retried with the same values.
        for field in ConfigField::BLOB_COORDINATES {
            if let Some(change) = changes.get(field) {
                self.applied.set(field, change.value.clone());
            }
        }

        if !candidate.has_blob_source() {
            if changes.touches_blob_source() {
                info!("No bulk source configured; bulk load skipped");
            }
            return;
        }

        if self.shutdown.is_cancelled() {
            report.cancelled = true;
            return;
        }

        let coords = candidate.blob_coordinates();
        let store = self.connections.current().await;
        let outcome = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            result = self.pipeline.run(&coords, store.as_deref()) => Some(result),
        };
        drop(store);

        match outcome {
            None => {
                warn!(source = %coords, "Bulk load interrupted by shutdown");
                report.cancelled = true;
            }
            Some(Ok(load)) => report.bulk_load = Some(Ok(load)),
            Some(Err(failure)) => {
                error!(
                    step = %failure.step,
                    source = %coords,
                    written = failure.records_written,
                    "Bulk load failed: {}",
                    failure.source
                );
                if self.connections.invalidate_if_dead().await {
                    // Forget the endpoint so the next snapshot offering it reconnects.
                    self.applied.set(ConfigField::Endpoint, "");
                }
                report.bulk_load = Some(Err(failure));
            }
        }
    }

    /// Race `operation` against shutdown.
    async fn cancellable<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(Error::Cancelled),
            result = operation => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::LoadStep;
    use crate::channel::MemoryChannel;
    use twinsync_common::BlobCoordinates;
    use twinsync_storage::{MemoryBlobFetcher, MemoryConnector, StoreEvent};

    struct Fixture {
        engine: ReconciliationEngine,
        connector: MemoryConnector,
        fetcher: MemoryBlobFetcher,
        channel: MemoryChannel,
    }

    fn fixture_with(config: SyncConfig) -> Fixture {
        let connector = MemoryConnector::new();
        let fetcher = MemoryBlobFetcher::new();
        let channel = MemoryChannel::new();
        let engine = ReconciliationEngine::new(
            Arc::new(connector.clone()),
            Arc::new(fetcher.clone()),
            Arc::new(channel.clone()),
            &config,
        );
        Fixture {
            engine,
            connector,
            fetcher,
            channel,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(SyncConfig {
            fetch_initial_delay_ms: 1,
            fetch_max_delay_ms: 5,
            ..SyncConfig::default()
        })
    }

    fn coords() -> BlobCoordinates {
        BlobCoordinates::new("acct", "data", "seed.txt", "sv=1")
    }

    fn full_snapshot(endpoint: &str) -> ConfigurationSnapshot {
        ConfigurationSnapshot::new()
            .with_field(ConfigField::Endpoint, endpoint)
            .with_field(ConfigField::StorageAccountName, "acct")
            .with_field(ConfigField::BlobContainerName, "data")
            .with_field(ConfigField::BlobFileName, "seed.txt")
            .with_field(ConfigField::BlobSasToken, "sv=1")
    }

    fn endpoint(value: &str) -> ConfigurationSnapshot {
        ConfigurationSnapshot::new().with_field(ConfigField::Endpoint, value)
    }

    #[tokio::test]
    async fn test_unrecognized_snapshot_is_noop() {
        let mut f = fixture();
        let snapshot = ConfigurationSnapshot::new().with("$version", Some("3"));

        let report = f.engine.on_snapshot(&snapshot).await;

        assert!(report.is_noop());
        assert!(report.connection.is_none());
        assert!(report.bulk_load.is_none());
        assert!(f.connector.journal().is_empty());
        assert!(f.channel.reports().is_empty());
        assert_eq!(f.engine.state(), EngineState::Idle);
    }

    #[tokio::test]
    async fn test_unchanged_snapshot_is_noop() {
        let mut f = fixture();
        f.engine.on_snapshot(&endpoint("a:6379")).await;
        f.connector.clear_journal();

        let report = f.engine.on_snapshot(&endpoint("a:6379")).await;

        assert!(report.is_noop());
        assert!(f.connector.journal().is_empty());
        assert_eq!(f.channel.reports().len(), 1);
    }

    #[tokio::test]
    async fn test_endpoint_change_connects_and_reports() {
        let mut f = fixture();

        let report = f.engine.on_snapshot(&endpoint("a:6379")).await;

        assert!(report.succeeded());
        assert_eq!(
            report.connection,
            Some(Ok(ConnectionChange::Connected {
                endpoint: "a:6379".to_string()
            }))
        );
        assert_eq!(f.engine.applied_state().endpoint(), "a:6379");
        assert_eq!(f.channel.reports()[0].get(ConfigField::Endpoint), Some("a:6379"));
        assert_eq!(f.engine.cycles(), 1);
    }

    #[tokio::test]
    async fn test_failed_connect_keeps_previous_endpoint() {
        let mut f = fixture();
        f.engine.on_snapshot(&endpoint("a:6379")).await;
        f.connector.refuse("b:6379");

        let report = f.engine.on_snapshot(&endpoint("b:6379")).await;

        assert!(matches!(report.connection, Some(Err(Error::Connection(_)))));
        assert!(!report.reported.contains(ConfigField::Endpoint));
        assert_eq!(f.engine.applied_state().endpoint(), "a:6379");
        // Nothing was applied, so nothing new was reported.
        assert_eq!(f.channel.reports().len(), 1);
        assert_eq!(f.engine.state(), EngineState::Idle);

        // The same endpoint is retried on the next snapshot.
        f.connector.accept("b:6379");
        let report = f.engine.on_snapshot(&endpoint("b:6379")).await;
        assert!(report.succeeded());
        assert_eq!(f.engine.applied_state().endpoint(), "b:6379");
    }

    #[tokio::test]
    async fn test_failed_connect_still_reports_other_fields() {
        let mut f = fixture();
        f.connector.refuse("down:6379");
        let snapshot = endpoint("down:6379").with_field(ConfigField::BlobFileName, "seed.txt");

        let report = f.engine.on_snapshot(&snapshot).await;

        assert!(!report.reported.contains(ConfigField::Endpoint));
        assert_eq!(report.reported.get(ConfigField::BlobFileName), Some("seed.txt"));
        assert_eq!(f.channel.reports().len(), 1);
        assert_eq!(f.engine.applied_state().get(ConfigField::BlobFileName), "seed.txt");
        assert_eq!(f.engine.applied_state().endpoint(), "");
    }

    #[tokio::test]
    async fn test_null_endpoint_disconnects() {
        let mut f = fixture();
        f.engine.on_snapshot(&endpoint("a:6379")).await;

        let snapshot = ConfigurationSnapshot::new().with("endpoint", None);
        let report = f.engine.on_snapshot(&snapshot).await;

        assert_eq!(
            report.connection,
            Some(Ok(ConnectionChange::Disconnected {
                previous: Some("a:6379".to_string())
            }))
        );
        assert_eq!(report.reported.get(ConfigField::Endpoint), Some(""));
        assert_eq!(f.engine.applied_state().endpoint(), "");
        assert!(f.engine.connections().current().await.is_none());
    }

    #[tokio::test]
    async fn test_full_configuration_loads_in_order() {
        let mut f = fixture();
        f.fetcher.publish(&coords(), "k1:v1\nk2:v2\n");

        let report = f.engine.on_snapshot(&full_snapshot("a:6379")).await;

        assert!(report.succeeded());
        let load = report.bulk_load.unwrap().unwrap();
        assert_eq!(load.records_written, 2);
        assert_eq!(
            f.connector.writes(),
            vec![
                ("k1".to_string(), "v1".to_string()),
                ("k2".to_string(), "v2".to_string())
            ]
        );

        let applied = f.engine.applied_state();
        assert_eq!(applied.get(ConfigField::StorageAccountName), "acct");
        assert_eq!(applied.get(ConfigField::BlobContainerName), "data");
        assert_eq!(applied.get(ConfigField::BlobFileName), "seed.txt");
        assert_eq!(applied.get(ConfigField::BlobSasToken), "sv=1");

        // One combined report with all five fields.
        let reports = f.channel.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].len(), 5);
    }

    #[tokio::test]
    async fn test_partial_coordinates_skip_load() {
        let mut f = fixture();
        let snapshot = endpoint("a:6379")
            .with_field(ConfigField::StorageAccountName, "acct")
            .with_field(ConfigField::BlobContainerName, "data");

        let report = f.engine.on_snapshot(&snapshot).await;

        assert!(report.bulk_load.is_none());
        assert_eq!(f.fetcher.fetch_count(), 0);
        assert_eq!(f.engine.applied_state().get(ConfigField::BlobContainerName), "data");
    }

    #[tokio::test]
    async fn test_malformed_source_fails_load_but_commits_coordinates() {
        let mut f = fixture();
        f.fetcher.publish(&coords(), "k1:v1\nmalformed-no-colon\n");

        let report = f.engine.on_snapshot(&full_snapshot("a:6379")).await;

        let failure = report.bulk_load.clone().unwrap().unwrap_err();
        assert_eq!(failure.step, LoadStep::Parse);
        assert!(matches!(failure.source, Error::Parse { .. }));
        assert!(!report.succeeded());
        assert!(f.engine.applied_state().has_blob_source());
        assert_eq!(f.engine.applied_state().endpoint(), "a:6379");
    }

    #[tokio::test]
    async fn test_load_without_connection_fails() {
        let mut f = fixture();
        f.fetcher.publish(&coords(), "k1:v1\n");
        f.connector.refuse("down:6379");

        let report = f.engine.on_snapshot(&full_snapshot("down:6379")).await;

        let failure = report.bulk_load.unwrap().unwrap_err();
        assert_eq!(failure.source, Error::ConnectionRequired);
        assert_eq!(f.fetcher.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_endpoint_change_reloads_complete_source() {
        let mut f = fixture();
        f.fetcher.publish(&coords(), "k1:v1\n");
        f.engine.on_snapshot(&full_snapshot("a:6379")).await;

        let report = f.engine.on_snapshot(&endpoint("b:6379")).await;

        assert_eq!(report.changed, vec![ConfigField::Endpoint]);
        assert_eq!(report.bulk_load.unwrap().unwrap().records_written, 1);
        assert_eq!(f.fetcher.fetch_count(), 2);
        assert_eq!(f.connector.value("b:6379", "k1"), Some("v1".to_string()));
    }

    #[tokio::test]
    async fn test_reload_is_idempotent() {
        let mut f = fixture();
        f.fetcher.publish(&coords(), "k1:v1\nk2:v2\nk1:v3\n");
        f.engine.on_snapshot(&full_snapshot("a:6379")).await;
        let after_first = f.connector.contents("a:6379");

        // Change a coordinate back and forth to force two more loads.
        let other = ConfigurationSnapshot::new().with_field(ConfigField::BlobFileName, "other.txt");
        f.engine.on_snapshot(&other).await;
        f.engine.on_snapshot(&full_snapshot("a:6379")).await;

        assert_eq!(f.connector.contents("a:6379"), after_first);
    }

    #[tokio::test]
    async fn test_channel_failure_keeps_applied_state() {
        let mut f = fixture();
        f.channel.set_failing(true);

        let report = f.engine.on_snapshot(&endpoint("a:6379")).await;

        assert!(matches!(report.report_error, Some(Error::Channel(_))));
        assert_eq!(f.engine.applied_state().endpoint(), "a:6379");
        assert!(f.engine.connections().current().await.is_some());
    }

    #[tokio::test]
    async fn test_dead_connection_is_dropped_after_failed_load() {
        let mut f = fixture();
        f.fetcher.publish(&coords(), "k1:v1\n");
        f.engine.on_snapshot(&endpoint("a:6379")).await;
        f.connector.sever_connections();

        let snapshot = full_snapshot("a:6379");
        let report = f.engine.on_snapshot(&snapshot).await;

        let failure = report.bulk_load.unwrap().unwrap_err();
        assert!(matches!(failure.source, Error::Connection(_)));
        assert!(f.engine.connections().current().await.is_none());
        assert_eq!(f.engine.applied_state().endpoint(), "");

        // Offering the endpoint again reconnects and reloads.
        let report = f.engine.on_snapshot(&snapshot).await;
        assert!(report.succeeded());
        assert_eq!(f.connector.value("a:6379", "k1"), Some("v1".to_string()));
    }

    #[tokio::test]
    async fn test_shutdown_aborts_pending_connect() {
        let mut f = fixture();
        let token = CancellationToken::new();
        f.engine = f.engine.with_shutdown(token.clone());
        f.connector.set_connect_delay(Duration::from_secs(5));

        let snapshot = endpoint("slow:6379");
        let (report, _) = tokio::join!(f.engine.on_snapshot(&snapshot), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        assert!(report.cancelled);
        assert_eq!(report.connection, Some(Err(Error::Cancelled)));
        assert_eq!(f.engine.applied_state().endpoint(), "");
        assert_eq!(f.engine.state(), EngineState::Idle);
        assert!(f.channel.reports().is_empty());
        assert!(!f
            .connector
            .journal()
            .contains(&StoreEvent::Connected { endpoint: "slow:6379".to_string() }));
    }

    #[tokio::test]
    async fn test_shutdown_aborts_bulk_load_between_steps() {
        let mut f = fixture_with(SyncConfig {
            fetch_initial_delay_ms: 5_000,
            fetch_max_delay_ms: 5_000,
            ..SyncConfig::default()
        });
        let token = CancellationToken::new();
        f.engine = f.engine.with_shutdown(token.clone());
        f.fetcher.publish(&coords(), "k1:v1\n");
        // The first fetch fails and the retry waits out its backoff.
        f.fetcher.fail_next(1);

        let snapshot = full_snapshot("a:6379");
        let (report, _) = tokio::join!(f.engine.on_snapshot(&snapshot), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        assert!(report.cancelled);
        assert!(report.bulk_load.is_none());
        assert!(!report.succeeded());
        assert_eq!(f.fetcher.fetch_count(), 1);
        assert!(f.connector.writes().is_empty());

        let applied = f.engine.applied_state();
        assert!(applied.has_blob_source());
        assert_eq!(applied.blob_coordinates(), coords());
        assert_eq!(applied.endpoint(), "a:6379");
        assert_eq!(f.engine.state(), EngineState::Idle);
        assert_eq!(f.channel.reports().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_bulk_load() {
        let mut f = fixture();
        let token = CancellationToken::new();
        f.engine = f.engine.with_shutdown(token.clone());
        f.fetcher.publish(&coords(), "k1:v1\n");
        f.engine.on_snapshot(&endpoint("a:6379")).await;
        token.cancel();

        let snapshot = ConfigurationSnapshot::new()
            .with_field(ConfigField::StorageAccountName, "acct")
            .with_field(ConfigField::BlobContainerName, "data")
            .with_field(ConfigField::BlobFileName, "seed.txt")
            .with_field(ConfigField::BlobSasToken, "sv=1");
        let report = f.engine.on_snapshot(&snapshot).await;

        assert!(report.cancelled);
        assert!(report.bulk_load.is_none());
        assert_eq!(f.fetcher.fetch_count(), 0);
        assert!(f.engine.applied_state().has_blob_source());
        assert_eq!(f.engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_config_validation() {
        assert!(SyncConfig::default().validate().is_ok());

        let config = SyncConfig {
            queue_capacity: 0,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());

        let config: SyncConfig =
            serde_json::from_str(r#"{"malformed_line_policy":"skip"}"#).unwrap();
        assert_eq!(config.malformed_line_policy, MalformedLinePolicy::Skip);
        assert_eq!(config.queue_capacity, 16);
    }
}
