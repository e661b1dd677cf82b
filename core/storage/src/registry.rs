//! Connector registry for selecting a store backend by name.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::kv::StoreConnector;
use twinsync_common::{Error, Result};

/// Factory function type for creating connectors.
pub type ConnectorFactory = Box<dyn Fn(Value) -> Result<Arc<dyn StoreConnector>> + Send + Sync>;

/// Registry for store connector factories.
///
/// Allows dynamic registration and resolution of store backends
/// by name and configuration.
pub struct ConnectorRegistry {
    factories: HashMap<String, ConnectorFactory>,
}

impl ConnectorRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a connector factory.
    ///
    /// # Errors
    /// - Returns error if name is already registered
    pub fn register(&mut self, name: impl Into<String>, factory: ConnectorFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::AlreadyExists(format!(
                "Store backend '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Resolve a connector by name and configuration.
    ///
    /// # Errors
    /// - Backend not found
    /// - Configuration invalid
    pub fn resolve(&self, name: &str, config: Value) -> Result<Arc<dyn StoreConnector>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("Store backend '{}' is not registered", name)))?;
        factory(config)
    }

    /// Get list of registered backend names, sorted.
    pub fn backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a backend is registered.
    pub fn has_backend(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with the built-in backends.
///
/// - `memory`: process-local store, no configuration
/// - `resp`: RESP over TCP; optional `connect_timeout_ms`
pub fn create_default_registry() -> ConnectorRegistry {
    let mut factories: HashMap<String, ConnectorFactory> = HashMap::new();

    factories.insert(
        "memory".to_string(),
        Box::new(|_config| Ok(Arc::new(crate::memory::MemoryConnector::new()))),
    );

    factories.insert(
        "resp".to_string(),
        Box::new(|config| {
            let mut connector = crate::resp::RespConnector::new();
            match config.get("connect_timeout_ms") {
                None | Some(Value::Null) => {}
                Some(value) => {
                    let millis = value.as_u64().ok_or_else(|| {
                        Error::InvalidInput(
                            "resp backend 'connect_timeout_ms' must be a positive integer"
                                .to_string(),
                        )
                    })?;
                    connector = connector.with_connect_timeout(Duration::from_millis(millis));
                }
            }
            Ok(Arc::new(connector))
        }),
    );

    ConnectorRegistry { factories }
}
