//! Bulk loading of `key:value` records from the blob source into the store.
//!
//! A load is fetch, decode, parse, then sequential writes in source order.
//! There is no rollback: a load that fails partway leaves the store partly
//! updated. Every write is an overwrite, so re-running the whole load is
//! idempotent per key.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use twinsync_common::{BlobCoordinates, Error};
use twinsync_storage::{BlobFetcher, KvStore};

use crate::retry::FetchRetry;

/// What to do with a line that has no `:` delimiter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedLinePolicy {
    /// Fail the load before anything is written.
    #[default]
    Abort,
    /// Write every well-formed line and collect the rest in the report.
    Skip,
}

/// Step of a bulk load, for attributing failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStep {
    Connect,
    Fetch,
    Decode,
    Parse,
    Write,
}

impl fmt::Display for LoadStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadStep::Connect => "connect",
            LoadStep::Fetch => "fetch",
            LoadStep::Decode => "decode",
            LoadStep::Parse => "parse",
            LoadStep::Write => "write",
        };
        f.write_str(name)
    }
}

/// One `key:value` record from the bulk source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkRecord {
    /// 1-based line number in the source.
    pub line: usize,
    pub key: String,
    pub value: String,
}

impl BulkRecord {
    /// Split `text` at the first colon. The value may contain more colons.
    pub fn parse(line: usize, text: &str) -> Result<Self, Error> {
        let (key, value) = text.split_once(':').ok_or_else(|| Error::Parse {
            line,
            message: "missing ':' delimiter".to_string(),
        })?;

        Ok(Self {
            line,
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

/// A line skipped under [`MalformedLinePolicy::Skip`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineFailure {
    pub line: usize,
    pub message: String,
}

/// Outcome of a bulk load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    /// Whether a complete bulk source was configured at all.
    pub configured: bool,
    /// `account/container/object` of the source; never the credential.
    pub source: Option<String>,
    /// Non-empty lines in the source.
    pub lines_found: usize,
    pub records_written: usize,
    pub line_failures: Vec<LineFailure>,
    pub duration: Duration,
}

impl LoadReport {
    /// Report for "no bulk source configured".
    pub fn not_configured() -> Self {
        Self {
            configured: false,
            source: None,
            lines_found: 0,
            records_written: 0,
            line_failures: Vec::new(),
            duration: Duration::ZERO,
        }
    }
}

/// A bulk load that stopped at `step`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("bulk load failed at {step} step after {records_written} writes: {source}")]
pub struct LoadFailure {
    pub step: LoadStep,
    /// Writes that had already been issued and stand.
    pub records_written: usize,
    pub source: Error,
}

impl LoadFailure {
    fn new(step: LoadStep, records_written: usize, source: Error) -> Self {
        Self {
            step,
            records_written,
            source,
        }
    }
}

/// Decode bulk source bytes into non-empty `(line number, text)` pairs.
///
/// Accepts `\n`, `\r\n` and bare `\r` line breaks, drops a leading byte
/// order mark, and discards blank lines.
pub fn split_lines(content: &[u8]) -> Result<Vec<(usize, &str)>, Error> {
    let text = std::str::from_utf8(content)
        .map_err(|e| Error::Decode(format!("Bulk source is not valid UTF-8: {}", e)))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    Ok(physical_lines(text)
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| (index + 1, line))
        .collect())
}

/// Lines of `text` ended by any of `\n`, `\r\n` or `\r`. A final line break
/// does not start another line.
fn physical_lines(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let Some(end) = rest.find(|c: char| c == '\r' || c == '\n') else {
            return Some(std::mem::take(&mut rest));
        };
        let line = &rest[..end];
        let break_len = if rest[end..].starts_with("\r\n") { 2 } else { 1 };
        rest = &rest[end + break_len..];
        Some(line)
    })
}

/// Parse lines under `policy`. Returns the records and the skipped lines.
pub fn parse_records(
    lines: &[(usize, &str)],
    policy: MalformedLinePolicy,
) -> Result<(Vec<BulkRecord>, Vec<LineFailure>), Error> {
    let mut records = Vec::with_capacity(lines.len());
    let mut failures = Vec::new();

    for (line, text) in lines {
        match BulkRecord::parse(*line, text) {
            Ok(record) => records.push(record),
            Err(err) => match policy {
                MalformedLinePolicy::Abort => return Err(err),
                MalformedLinePolicy::Skip => {
                    warn!(line, "Skipping malformed bulk source line: {}", err);
                    failures.push(LineFailure {
                        line: *line,
                        message: err.to_string(),
                    });
                }
            },
        }
    }

    Ok((records, failures))
}

/// Fetches the bulk source and writes its records into the store.
pub struct BulkLoadPipeline {
    fetcher: Arc<dyn BlobFetcher>,
    retry: FetchRetry,
    policy: MalformedLinePolicy,
}

impl BulkLoadPipeline {
    pub fn new(
        fetcher: Arc<dyn BlobFetcher>,
        retry: FetchRetry,
        policy: MalformedLinePolicy,
    ) -> Self {
        Self {
            fetcher,
            retry,
            policy,
        }
    }

    pub fn policy(&self) -> MalformedLinePolicy {
        self.policy
    }

    /// Run one full load.
    ///
    /// Incomplete coordinates are not an error: the report says no source is
    /// configured. With complete coordinates a missing `store` fails with
    /// `Error::ConnectionRequired`. The store handle is only borrowed for
    /// the duration of the run.
    pub async fn run(
        &self,
        coords: &BlobCoordinates,
        store: Option<&dyn KvStore>,
    ) -> Result<LoadReport, LoadFailure> {
        if !coords.is_complete() {
            debug!("No bulk source configured");
            return Ok(LoadReport::not_configured());
        }

        let store =
            store.ok_or_else(|| LoadFailure::new(LoadStep::Connect, 0, Error::ConnectionRequired))?;

        let start = Instant::now();
        info!(source = %coords, endpoint = store.endpoint(), "Bulk load started");

        let content = self
            .retry
            .run(|| self.fetcher.fetch(coords))
            .await
            .map_err(|e| LoadFailure::new(LoadStep::Fetch, 0, e))?;
        debug!(bytes = content.len(), "Bulk source downloaded");

        let lines = split_lines(&content).map_err(|e| LoadFailure::new(LoadStep::Decode, 0, e))?;
        let (records, line_failures) =
            parse_records(&lines, self.policy).map_err(|e| LoadFailure::new(LoadStep::Parse, 0, e))?;

        let mut records_written = 0;
        for record in &records {
            store
                .set(&record.key, &record.value)
                .await
                .map_err(|e| LoadFailure::new(LoadStep::Write, records_written, e))?;
            records_written += 1;
        }

        let report = LoadReport {
            configured: true,
            source: Some(coords.to_string()),
            lines_found: lines.len(),
            records_written,
            line_failures,
            duration: start.elapsed(),
        };

        info!(
            source = %coords,
            lines = report.lines_found,
            written = report.records_written,
            skipped = report.line_failures.len(),
            "Bulk load completed in {:?}",
            report.duration
        );

        Ok(report)
    }
}
