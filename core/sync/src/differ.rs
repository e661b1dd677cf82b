//! Configuration diffing.
//!
//! Resolves each recognized field of an incoming snapshot against the
//! applied state:
//! - present with a value: that value
//! - present but null or empty: reset to the empty sentinel
//! - absent: untouched this cycle
//!
//! A field is changed iff its resolved value differs from the applied one.

use std::fmt;

use twinsync_common::{ConfigField, ConfigurationSnapshot};

use crate::state::AppliedState;

/// One field whose resolved value differs from the applied state.
#[derive(Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: ConfigField,
    /// Value in the applied state before this cycle.
    pub previous: String,
    /// Resolved value from the snapshot.
    pub value: String,
}

impl fmt::Debug for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldChange")
            .field("field", &self.field)
            .field("previous", &self.field.display_value(&self.previous))
            .field("value", &self.field.display_value(&self.value))
            .finish()
    }
}

/// Fields changed by a snapshot, in field declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changes: Vec<FieldChange>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldChange> {
        self.changes.iter()
    }

    /// The change for `field`, if it changed.
    pub fn get(&self, field: ConfigField) -> Option<&FieldChange> {
        self.changes.iter().find(|c| c.field == field)
    }

    pub fn contains(&self, field: ConfigField) -> bool {
        self.get(field).is_some()
    }

    /// Changed field names, in order.
    pub fn fields(&self) -> Vec<ConfigField> {
        self.changes.iter().map(|c| c.field).collect()
    }

    /// Whether any bulk source coordinate changed.
    pub fn touches_blob_source(&self) -> bool {
        ConfigField::BLOB_COORDINATES
            .iter()
            .any(|field| self.contains(*field))
    }
}

/// Resolve the value a snapshot asks for; `None` when the field was not sent.
pub fn resolve(field: ConfigField, incoming: &ConfigurationSnapshot) -> Option<String> {
    incoming
        .field(field)
        .map(|value| value.unwrap_or_default().to_string())
}

/// Compute the change-set of `incoming` against `previous`. Pure.
pub fn diff(previous: &AppliedState, incoming: &ConfigurationSnapshot) -> ChangeSet {
    let changes = ConfigField::ALL
        .into_iter()
        .filter_map(|field| {
            let value = resolve(field, incoming)?;
            let current = previous.get(field);
            (value != current).then(|| FieldChange {
                field,
                previous: current.to_string(),
                value,
            })
        })
        .collect();

    ChangeSet { changes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_snapshot_is_noop() {
        let previous = AppliedState::new().with(ConfigField::Endpoint, "a:6379");
        assert!(diff(&previous, &ConfigurationSnapshot::new()).is_empty());
    }

    #[test]
    fn test_unrecognized_fields_are_ignored() {
        let snapshot = ConfigurationSnapshot::new()
            .with("$version", Some("7"))
            .with("Endpoint", Some("wrong-case:6379"));
        assert!(diff(&AppliedState::new(), &snapshot).is_empty());
    }

    #[test]
    fn test_new_value_is_change() {
        let snapshot = ConfigurationSnapshot::new().with_field(ConfigField::Endpoint, "b:6379");
        let previous = AppliedState::new().with(ConfigField::Endpoint, "a:6379");

        let changes = diff(&previous, &snapshot);

        assert_eq!(changes.len(), 1);
        let change = changes.get(ConfigField::Endpoint).unwrap();
        assert_eq!(change.previous, "a:6379");
        assert_eq!(change.value, "b:6379");
    }

    #[test]
    fn test_same_value_is_not_change() {
        let snapshot = ConfigurationSnapshot::new().with_field(ConfigField::Endpoint, "a:6379");
        let previous = AppliedState::new().with(ConfigField::Endpoint, "a:6379");
        assert!(diff(&previous, &snapshot).is_empty());
    }

    #[test]
    fn test_null_resets_to_sentinel() {
        let snapshot = ConfigurationSnapshot::new().with("endpoint", None);
        let previous = AppliedState::new().with(ConfigField::Endpoint, "a:6379");

        let changes = diff(&previous, &snapshot);
        assert_eq!(changes.get(ConfigField::Endpoint).unwrap().value, "");

        // Null against an already-empty field is no change.
        assert!(diff(&AppliedState::new(), &snapshot).is_empty());
    }

    #[test]
    fn test_absent_field_is_untouched() {
        let snapshot = ConfigurationSnapshot::new().with_field(ConfigField::BlobFileName, "seed.txt");
        let previous = AppliedState::new().with(ConfigField::Endpoint, "a:6379");

        let changes = diff(&previous, &snapshot);
        assert_eq!(changes.fields(), vec![ConfigField::BlobFileName]);
        assert!(changes.touches_blob_source());
    }

    #[test]
    fn test_changes_follow_field_order() {
        let snapshot = ConfigurationSnapshot::new()
            .with_field(ConfigField::BlobSasToken, "sv=1")
            .with_field(ConfigField::Endpoint, "a:6379")
            .with_field(ConfigField::StorageAccountName, "acct");

        let changes = diff(&AppliedState::new(), &snapshot);
        assert_eq!(
            changes.fields(),
            vec![
                ConfigField::Endpoint,
                ConfigField::StorageAccountName,
                ConfigField::BlobSasToken
            ]
        );
    }

    #[test]
    fn test_change_debug_redacts_token() {
        let snapshot = ConfigurationSnapshot::new().with_field(ConfigField::BlobSasToken, "sig=secret");
        let changes = diff(&AppliedState::new(), &snapshot);
        assert!(!format!("{:?}", changes).contains("secret"));
    }

    fn field_name() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("endpoint".to_string()),
            Just("storageAccountName".to_string()),
            Just("blobContainerName".to_string()),
            Just("blobFileName".to_string()),
            Just("blobSasToken".to_string()),
            "[a-z]{1,8}",
        ]
    }

    fn snapshot() -> impl Strategy<Value = ConfigurationSnapshot> {
        prop::collection::vec((field_name(), prop::option::of("[a-z0-9:]{0,6}")), 0..8).prop_map(
            |entries| {
                entries
                    .into_iter()
                    .fold(ConfigurationSnapshot::new(), |s, (name, value)| {
                        s.with(name, value.as_deref())
                    })
            },
        )
    }

    fn applied() -> impl Strategy<Value = AppliedState> {
        prop::collection::vec("[a-z0-9:]{0,6}", 5).prop_map(|values| {
            ConfigField::ALL
                .into_iter()
                .zip(values)
                .fold(AppliedState::new(), |state, (field, value)| state.with(field, value))
        })
    }

    proptest! {
        #[test]
        fn prop_diff_is_pure(previous in applied(), incoming in snapshot()) {
            let before = previous.clone();
            let first = diff(&previous, &incoming);
            let second = diff(&previous, &incoming);

            prop_assert_eq!(&first, &second);
            prop_assert_eq!(&previous, &before);
        }

        #[test]
        fn prop_applying_changes_reaches_fixpoint(previous in applied(), incoming in snapshot()) {
            let mut next = previous.clone();
            for change in diff(&previous, &incoming).iter() {
                next.set(change.field, change.value.clone());
            }
            prop_assert!(diff(&next, &incoming).is_empty());
        }
    }
}
