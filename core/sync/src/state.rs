//! Applied configuration state owned by the reconciliation engine.

use serde::{Deserialize, Serialize};
use std::fmt;

use twinsync_common::{BlobCoordinates, ConfigField};

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineState {
    /// Waiting for the next snapshot.
    Idle,
    /// A reconciliation cycle is in flight.
    Reconciling,
}

/// Last value put into effect for each recognized field.
///
/// Every field starts at the empty sentinel `""`. A value lands here only
/// after the action it drives has been carried out, so this is "what is in
/// effect", not "what was last offered".
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AppliedState {
    endpoint: String,
    storage_account_name: String,
    blob_container_name: String,
    blob_file_name: String,
    blob_sas_token: String,
}

impl AppliedState {
    /// Create a state with every field at the empty sentinel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a field.
    pub fn get(&self, field: ConfigField) -> &str {
        match field {
            ConfigField::Endpoint => &self.endpoint,
            ConfigField::StorageAccountName => &self.storage_account_name,
            ConfigField::BlobContainerName => &self.blob_container_name,
            ConfigField::BlobFileName => &self.blob_file_name,
            ConfigField::BlobSasToken => &self.blob_sas_token,
        }
    }

    /// Replace the value of a field.
    pub fn set(&mut self, field: ConfigField, value: impl Into<String>) {
        let slot = match field {
            ConfigField::Endpoint => &mut self.endpoint,
            ConfigField::StorageAccountName => &mut self.storage_account_name,
            ConfigField::BlobContainerName => &mut self.blob_container_name,
            ConfigField::BlobFileName => &mut self.blob_file_name,
            ConfigField::BlobSasToken => &mut self.blob_sas_token,
        };
        *slot = value.into();
    }

    /// Builder-style setter.
    pub fn with(mut self, field: ConfigField, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    /// Store endpoint currently in effect; empty when disconnected.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Bulk source coordinates assembled from the four coordinate fields.
    pub fn blob_coordinates(&self) -> BlobCoordinates {
        BlobCoordinates::new(
            self.storage_account_name.as_str(),
            self.blob_container_name.as_str(),
            self.blob_file_name.as_str(),
            self.blob_sas_token.as_str(),
        )
    }

    /// Whether all four coordinate fields are non-empty.
    pub fn has_blob_source(&self) -> bool {
        ConfigField::BLOB_COORDINATES
            .iter()
            .all(|field| !self.get(*field).is_empty())
    }
}

impl fmt::Debug for AppliedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppliedState")
            .field("endpoint", &self.endpoint)
            .field("storage_account_name", &self.storage_account_name)
            .field("blob_container_name", &self.blob_container_name)
            .field("blob_file_name", &self.blob_file_name)
            .field(
                "blob_sas_token",
                &ConfigField::BlobSasToken.display_value(&self.blob_sas_token),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_empty() {
        let state = AppliedState::new();
        for field in ConfigField::ALL {
            assert_eq!(state.get(field), "");
        }
        assert!(!state.has_blob_source());
    }

    #[test]
    fn test_set_and_get() {
        let mut state = AppliedState::new();
        state.set(ConfigField::Endpoint, "cache:6379");
        assert_eq!(state.endpoint(), "cache:6379");
        assert_eq!(state.get(ConfigField::BlobFileName), "");
    }

    #[test]
    fn test_blob_source_needs_all_four() {
        let state = AppliedState::new()
            .with(ConfigField::StorageAccountName, "acct")
            .with(ConfigField::BlobContainerName, "data")
            .with(ConfigField::BlobFileName, "seed.txt");
        assert!(!state.has_blob_source());

        let state = state.with(ConfigField::BlobSasToken, "sv=1");
        assert!(state.has_blob_source());
        assert!(state.blob_coordinates().is_complete());
    }

    #[test]
    fn test_debug_redacts_token() {
        let state = AppliedState::new().with(ConfigField::BlobSasToken, "sig=secret");
        let rendered = format!("{:?}", state);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
