//! JSON-lines host: feeds inbound messages to the engine and writes
//! reported state and method responses back out.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use twinsync_common::{ConfigurationSnapshot, Error, ReportedState};
use twinsync_sync::{
    ConfigChannel, DirectMethods, LoadReport, MethodResponse, ReconcileScheduler,
};

/// A message read from the input stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    /// A full or partial desired configuration document.
    Desired { properties: Value },
    /// A direct method call. `payload` is passed on as its JSON text.
    Method {
        name: String,
        #[serde(default)]
        payload: Value,
        #[serde(default)]
        id: Option<String>,
    },
}

/// A message written to the output stream.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound<'a> {
    Reported {
        properties: &'a ReportedState,
    },
    MethodResponse {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<&'a str>,
        name: &'a str,
        response: &'a MethodResponse,
    },
    Load {
        report: &'a LoadReport,
    },
}

/// Writes outbound messages as one JSON document per line.
pub struct JsonLinesWriter<W> {
    out: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> JsonLinesWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub async fn send(&self, message: &Outbound<'_>) -> twinsync_common::Result<()> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');

        let mut out = self.out.lock().await;
        out.write_all(&line)
            .await
            .map_err(|e| Error::Channel(format!("Failed to write output: {}", e)))?;
        out.flush()
            .await
            .map_err(|e| Error::Channel(format!("Failed to flush output: {}", e)))
    }
}

/// Reports state as `{"type":"reported",...}` lines.
pub struct JsonLinesChannel<W> {
    writer: Arc<JsonLinesWriter<W>>,
}

impl<W> JsonLinesChannel<W> {
    pub fn new(writer: Arc<JsonLinesWriter<W>>) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ConfigChannel for JsonLinesChannel<W> {
    fn name(&self) -> &str {
        "json-lines"
    }

    async fn report_state(&self, reported: &ReportedState) -> twinsync_common::Result<()> {
        self.writer
            .send(&Outbound::Reported {
                properties: reported,
            })
            .await
    }
}

/// Counters for one host run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HostSummary {
    pub snapshots: usize,
    pub methods: usize,
    pub ignored: usize,
}

/// Serves the input stream until EOF or shutdown.
pub struct Host<W> {
    scheduler: ReconcileScheduler,
    methods: DirectMethods,
    writer: Arc<JsonLinesWriter<W>>,
    shutdown: CancellationToken,
}

impl<W: AsyncWrite + Unpin + Send> Host<W> {
    pub fn new(
        scheduler: ReconcileScheduler,
        methods: DirectMethods,
        writer: Arc<JsonLinesWriter<W>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            scheduler,
            methods,
            writer,
            shutdown,
        }
    }

    /// Submit an initial desired document before the stream starts.
    pub async fn submit_document(&self, document: Value) -> Result<bool> {
        match desired_snapshot(document)? {
            Some(snapshot) => self.submit(snapshot).await,
            None => Ok(false),
        }
    }

    /// Queue `snapshot`. `false` once shutdown has been requested.
    ///
    /// A worker that is gone without a shutdown request has died. The
    /// shutdown token is cancelled and an error returned, so the process
    /// exits and its supervisor can restart it.
    async fn submit(&self, snapshot: ConfigurationSnapshot) -> Result<bool> {
        match self.scheduler.submit(snapshot).await {
            Ok(()) => Ok(true),
            Err(_) if self.scheduler.is_shut_down() => Ok(false),
            Err(e) => {
                error!("Reconciliation worker is gone; stopping");
                self.shutdown.cancel();
                Err(e).context("Reconciliation worker stopped unexpectedly")
            }
        }
    }

    /// Read messages line by line. Malformed lines are logged and skipped.
    pub async fn serve<R: AsyncBufRead + Unpin>(self, input: R) -> Result<HostSummary> {
        let mut lines = input.lines();
        let mut summary = HostSummary::default();

        loop {
            let line = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested; input no longer read");
                    break;
                }
                line = lines.next_line() => line.context("Failed to read input")?,
            };

            let Some(line) = line else {
                info!("Input closed");
                break;
            };
            if line.trim().is_empty() {
                continue;
            }

            let message: Inbound = match serde_json::from_str(&line) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Ignoring unreadable input line: {}", e);
                    summary.ignored += 1;
                    continue;
                }
            };

            match message {
                Inbound::Desired { properties } => {
                    let snapshot = match desired_snapshot(properties) {
                        Ok(Some(snapshot)) => snapshot,
                        Ok(None) => {
                            summary.ignored += 1;
                            continue;
                        }
                        Err(e) => {
                            warn!("Desired document rejected: {:#}", e);
                            summary.ignored += 1;
                            continue;
                        }
                    };
                    if !self.submit(snapshot).await? {
                        break;
                    }
                    summary.snapshots += 1;
                }
                Inbound::Method { name, payload, id } => {
                    let payload = payload.to_string();
                    let response = self.methods.invoke(&name, payload.as_bytes()).await;
                    self.writer
                        .send(&Outbound::MethodResponse {
                            id: id.as_deref(),
                            name: &name,
                            response: &response,
                        })
                        .await
                        .context("Failed to write method response")?;
                    summary.methods += 1;
                }
            }
        }

        debug!(?summary, "Host finished");
        Ok(summary)
    }
}

/// `None` for a document without any properties.
fn desired_snapshot(document: Value) -> Result<Option<ConfigurationSnapshot>> {
    let snapshot =
        ConfigurationSnapshot::from_value(document).context("Invalid desired document")?;
    if snapshot.is_empty() {
        info!("Empty configuration document ignored");
        return Ok(None);
    }
    Ok(Some(snapshot))
}
