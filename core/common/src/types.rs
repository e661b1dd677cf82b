//! Common types used throughout TwinSync.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use zeroize::Zeroize;

/// A configuration field the engine reacts to.
///
/// Wire names are case-sensitive and must match what the configuration
/// channel sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfigField {
    #[serde(rename = "endpoint")]
    Endpoint,
    #[serde(rename = "storageAccountName")]
    StorageAccountName,
    #[serde(rename = "blobContainerName")]
    BlobContainerName,
    #[serde(rename = "blobFileName")]
    BlobFileName,
    #[serde(rename = "blobSasToken")]
    BlobSasToken,
}

impl ConfigField {
    /// All recognized fields, in processing order.
    pub const ALL: [ConfigField; 5] = [
        ConfigField::Endpoint,
        ConfigField::StorageAccountName,
        ConfigField::BlobContainerName,
        ConfigField::BlobFileName,
        ConfigField::BlobSasToken,
    ];

    /// The four fields that together locate the bulk source.
    pub const BLOB_COORDINATES: [ConfigField; 4] = [
        ConfigField::StorageAccountName,
        ConfigField::BlobContainerName,
        ConfigField::BlobFileName,
        ConfigField::BlobSasToken,
    ];

    /// Name of the field as used on the wire.
    pub fn wire_name(&self) -> &'static str {
        match self {
            ConfigField::Endpoint => "endpoint",
            ConfigField::StorageAccountName => "storageAccountName",
            ConfigField::BlobContainerName => "blobContainerName",
            ConfigField::BlobFileName => "blobFileName",
            ConfigField::BlobSasToken => "blobSasToken",
        }
    }

    /// Look up a field by wire name.
    pub fn from_wire_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.wire_name() == name)
    }

    /// Whether the value must never appear in logs.
    pub fn is_secret(&self) -> bool {
        matches!(self, ConfigField::BlobSasToken)
    }

    /// Render a value of this field for logging.
    pub fn display_value<'a>(&self, value: &'a str) -> &'a str {
        if self.is_secret() && !value.is_empty() {
            "[REDACTED]"
        } else {
            value
        }
    }
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Point-in-time configuration document delivered by the channel.
///
/// A field mapped to `None` was sent as null; a field missing from the map
/// was not sent at all. The engine treats those two cases differently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigurationSnapshot {
    properties: BTreeMap<String, Option<String>>,
}

impl ConfigurationSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter for a property.
    pub fn with(mut self, name: impl Into<String>, value: Option<&str>) -> Self {
        self.properties
            .insert(name.into(), value.map(|v| v.to_string()));
        self
    }

    /// Builder-style setter for a recognized field.
    pub fn with_field(self, field: ConfigField, value: &str) -> Self {
        self.with(field.wire_name(), Some(value))
    }

    /// Build a snapshot from a JSON object.
    ///
    /// Strings are taken as-is, `null` becomes an absent value, and other
    /// scalars are kept as their JSON text. Nested objects and arrays are
    /// kept as JSON text too; the engine ignores them unless they sit under
    /// a recognized name.
    pub fn from_value(value: Value) -> crate::Result<Self> {
        let Value::Object(map) = value else {
            return Err(crate::Error::InvalidInput(
                "Configuration document must be a JSON object".to_string(),
            ));
        };

        let properties = map
            .into_iter()
            .map(|(name, value)| {
                let value = match value {
                    Value::Null => None,
                    Value::String(s) => Some(s),
                    other => Some(other.to_string()),
                };
                (name, value)
            })
            .collect();

        Ok(Self { properties })
    }

    /// Parse a snapshot from JSON text.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Raw lookup: `None` if the property was not sent, `Some(None)` if it
    /// was sent as null.
    pub fn get(&self, name: &str) -> Option<Option<&str>> {
        self.properties.get(name).map(|v| v.as_deref())
    }

    /// Raw lookup for a recognized field.
    pub fn field(&self, field: ConfigField) -> Option<Option<&str>> {
        self.get(field.wire_name())
    }

    /// Number of properties, recognized or not.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether the document carries no properties at all.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Number of recognized fields present in the snapshot.
    pub fn recognized_count(&self) -> usize {
        ConfigField::ALL
            .iter()
            .filter(|f| self.properties.contains_key(f.wire_name()))
            .count()
    }

    /// Fold a newer snapshot over this one. Properties sent by `newer` win;
    /// properties only this snapshot carries are kept.
    pub fn merge(&mut self, newer: ConfigurationSnapshot) {
        self.properties.extend(newer.properties);
    }

    /// Iterate over all properties.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_deref()))
    }
}

/// Fields echoed back to the configuration channel after they were applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportedState {
    properties: BTreeMap<String, String>,
}

impl ReportedState {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a field value.
    pub fn insert(&mut self, field: ConfigField, value: impl Into<String>) {
        self.properties
            .insert(field.wire_name().to_string(), value.into());
    }

    /// Drop a staged field.
    pub fn remove(&mut self, field: ConfigField) -> Option<String> {
        self.properties.remove(field.wire_name())
    }

    /// Look up a staged field.
    pub fn get(&self, field: ConfigField) -> Option<&str> {
        self.properties.get(field.wire_name()).map(String::as_str)
    }

    /// Whether a field is staged.
    pub fn contains(&self, field: ConfigField) -> bool {
        self.properties.contains_key(field.wire_name())
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Iterate over staged properties in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Shared access signature for the bulk source; zeroized on drop.
#[derive(Clone, Default, PartialEq, Eq, Zeroize)]
#[zeroize(drop)]
pub struct SasToken(String);

impl SasToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Query string form without a leading `?`.
    pub fn as_query(&self) -> &str {
        self.0.trim_start_matches('?')
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SasToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SasToken([REDACTED; {} chars])", self.0.len())
    }
}

/// The four references that locate the bulk source object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobCoordinates {
    /// Storage account name.
    pub account: String,
    /// Container within the account.
    pub container: String,
    /// Object name within the container.
    pub blob: String,
    /// Credential granting read access to the object.
    pub sas_token: SasToken,
}

impl BlobCoordinates {
    pub fn new(
        account: impl Into<String>,
        container: impl Into<String>,
        blob: impl Into<String>,
        sas_token: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            container: container.into(),
            blob: blob.into(),
            sas_token: SasToken::new(sas_token),
        }
    }

    /// All four references are non-empty.
    pub fn is_complete(&self) -> bool {
        !self.account.is_empty()
            && !self.container.is_empty()
            && !self.blob.is_empty()
            && !self.sas_token.is_empty()
    }
}

impl fmt::Display for BlobCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.account, self.container, self.blob)
    }
}
