//! Settings file and command-line overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use twinsync_storage::{
    create_default_registry, AzureBlobFetcher, BlobServiceLocation, StoreConnector,
};
use twinsync_sync::{MalformedLinePolicy, SyncConfig};

/// Everything the binary needs to build an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Store backend name (`resp` or `memory`).
    pub store_backend: String,
    /// Backend options, e.g. `{"connect_timeout_ms": 5000}`.
    pub store_options: Value,
    /// Blob service host suffix for sovereign clouds.
    pub blob_host_suffix: Option<String>,
    /// Path-style blob service base URL (emulators, proxies). Wins over the suffix.
    pub blob_service_url: Option<String>,
    pub sync: SyncConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_backend: "resp".to_string(),
            store_options: Value::Null,
            blob_host_suffix: None,
            blob_service_url: None,
            sync: SyncConfig::default(),
        }
    }
}

/// Command-line values that take precedence over the settings file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub store_backend: Option<String>,
    pub connect_timeout_ms: Option<u64>,
    pub blob_service_url: Option<String>,
    pub skip_malformed: bool,
}

impl Settings {
    /// Read settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&content)
            .with_context(|| format!("Invalid settings file {}", path.display()))?;
        Ok(settings)
    }

    /// Settings from `path` if given, defaults otherwise, then overrides.
    pub fn resolve(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        settings.apply(overrides);
        settings.sync.validate().context("Invalid sync settings")?;
        Ok(settings)
    }

    fn apply(&mut self, overrides: &Overrides) {
        if let Some(backend) = &overrides.store_backend {
            self.store_backend = backend.clone();
        }
        if let Some(timeout) = overrides.connect_timeout_ms {
            if !self.store_options.is_object() {
                self.store_options = Value::Object(Default::default());
            }
            if let Some(options) = self.store_options.as_object_mut() {
                options.insert("connect_timeout_ms".to_string(), Value::from(timeout));
            }
        }
        if let Some(url) = &overrides.blob_service_url {
            self.blob_service_url = Some(url.clone());
        }
        if overrides.skip_malformed {
            self.sync.malformed_line_policy = MalformedLinePolicy::Skip;
        }
    }

    pub fn blob_location(&self) -> BlobServiceLocation {
        match (&self.blob_service_url, &self.blob_host_suffix) {
            (Some(base), _) => BlobServiceLocation::PathStyle { base: base.clone() },
            (None, Some(suffix)) => BlobServiceLocation::HostStyle {
                suffix: suffix.clone(),
            },
            (None, None) => BlobServiceLocation::default(),
        }
    }

    /// Resolve the configured store backend.
    pub fn connector(&self) -> Result<Arc<dyn StoreConnector>> {
        let registry = create_default_registry();
        registry
            .resolve(&self.store_backend, self.store_options.clone())
            .with_context(|| {
                format!(
                    "Cannot use store backend '{}' (available: {})",
                    self.store_backend,
                    registry.backends().join(", ")
                )
            })
    }

    pub fn fetcher(&self) -> Result<Arc<AzureBlobFetcher>> {
        let fetcher = AzureBlobFetcher::with_location(self.blob_location())
            .context("Failed to create blob fetcher")?;
        Ok(Arc::new(fetcher))
    }
}
