//! Azure Blob Storage fetcher using shared access signatures.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::blob::BlobFetcher;
use twinsync_common::{BlobCoordinates, Error, Result};

/// Public cloud blob service host suffix.
const DEFAULT_HOST_SUFFIX: &str = "blob.core.windows.net";

/// Default timeout for a whole download.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Where blob URLs point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobServiceLocation {
    /// `https://{account}.{suffix}/{container}/{blob}` (public and sovereign clouds).
    HostStyle { suffix: String },
    /// `{base}/{account}/{container}/{blob}` (local emulators, proxies).
    PathStyle { base: String },
}

impl Default for BlobServiceLocation {
    fn default() -> Self {
        Self::HostStyle {
            suffix: DEFAULT_HOST_SUFFIX.to_string(),
        }
    }
}

/// Downloads bulk sources from Azure Blob Storage.
///
/// The SAS credential is appended verbatim as the query string; it is
/// already URL-encoded by whoever issued it.
pub struct AzureBlobFetcher {
    http: Client,
    location: BlobServiceLocation,
}

impl AzureBlobFetcher {
    /// Create a fetcher against the public cloud.
    pub fn new() -> Result<Self> {
        Self::with_location(BlobServiceLocation::default())
    }

    /// Create a fetcher against a specific service location.
    pub fn with_location(location: BlobServiceLocation) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("TwinSync/", env!("CARGO_PKG_VERSION")))
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| Error::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http, location })
    }

    /// Build the download URL for `coords`, credential included.
    pub fn blob_url(&self, coords: &BlobCoordinates) -> Result<Url> {
        let base = match &self.location {
            BlobServiceLocation::HostStyle { suffix } => {
                format!("https://{}.{}", coords.account, suffix)
            }
            BlobServiceLocation::PathStyle { base } => {
                format!("{}/{}", base.trim_end_matches('/'), coords.account)
            }
        };

        let mut url = Url::parse(&base)
            .map_err(|e| Error::InvalidInput(format!("Invalid blob service URL {}: {}", base, e)))?;

        url.path_segments_mut()
            .map_err(|_| Error::InvalidInput(format!("Blob service URL cannot be a base: {}", base)))?
            .pop_if_empty()
            .push(&coords.container)
            .extend(coords.blob.split('/').filter(|s| !s.is_empty()));

        let query = coords.sas_token.as_query();
        if !query.is_empty() {
            url.set_query(Some(query));
        }

        Ok(url)
    }
}

/// Whether a failed HTTP status may succeed on a later attempt.
fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

#[async_trait]
impl BlobFetcher for AzureBlobFetcher {
    fn name(&self) -> &str {
        "azure"
    }

    async fn fetch(&self, coords: &BlobCoordinates) -> Result<Vec<u8>> {
        let url = self.blob_url(coords)?;
        debug!(blob = %coords, "downloading bulk source");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::fetch_transient(format!("Failed to download {}: {}", coords, e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("Download of {} failed: {} - {}", coords, status, body.trim());
            return Err(if is_transient_status(status) {
                Error::fetch_transient(message)
            } else {
                Error::fetch_permanent(message)
            });
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| Error::fetch_transient(format!("Failed to read {}: {}", coords, e.without_url())))
    }
}
