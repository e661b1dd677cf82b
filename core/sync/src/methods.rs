//! Direct methods served against the live store connection.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use twinsync_common::{Error, Result};
use twinsync_storage::KvStore;

use crate::connection::StoreSlot;

pub const GET_ITEM: &str = "GetItem";
pub const SET_ITEM: &str = "SetItem";

/// Answer to a direct method call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MethodResponse {
    pub status: u16,
    pub message: String,
}

impl MethodResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: 200,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: 500,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// `GetItem` / `SetItem` handlers.
///
/// They read the current handle through a [`StoreSlot`], so they run
/// alongside reconciliation without waiting for a cycle to finish.
#[derive(Clone)]
pub struct DirectMethods {
    slot: StoreSlot,
}

impl DirectMethods {
    pub fn new(slot: StoreSlot) -> Self {
        Self { slot }
    }

    /// Dispatch a method call by name. Unknown names answer 501.
    pub async fn invoke(&self, name: &str, payload: &[u8]) -> MethodResponse {
        let request = request_text(payload);
        info!(method = name, request = %request, "Direct method called");

        let response = match name {
            GET_ITEM => self.get_item(&request).await,
            SET_ITEM => self.set_item(&request).await,
            _ => MethodResponse {
                status: 501,
                message: format!("Unknown method '{}'", name),
            },
        };

        info!(method = name, status = response.status, "{}", response.message);
        response
    }

    /// Read `key` from the store.
    pub async fn get_item(&self, key: &str) -> MethodResponse {
        let Some(store) = self.live_store().await else {
            return MethodResponse::failed("No connection to store available");
        };

        match store.get(key).await {
            Ok(Some(value)) if !value.is_empty() => MethodResponse::ok(value),
            Ok(_) => MethodResponse::failed("No value available in store"),
            Err(e) => MethodResponse::failed(format!("GetItem error: {}", e)),
        }
    }

    /// Write a `key:value` request to the store.
    pub async fn set_item(&self, request: &str) -> MethodResponse {
        let Some(store) = self.live_store().await else {
            return MethodResponse::failed("No connection to store available");
        };

        match write_item(store.as_ref(), request).await {
            Ok((key, value)) => {
                MethodResponse::ok(format!("Written => key = '{}', value = '{}'", key, value))
            }
            Err(e) => MethodResponse::failed(format!("SetItem error: {}", e)),
        }
    }

    async fn live_store(&self) -> Option<Arc<dyn KvStore>> {
        self.slot
            .current()
            .await
            .filter(|store| store.is_connected())
    }
}

async fn write_item<'a>(store: &dyn KvStore, request: &'a str) -> Result<(&'a str, &'a str)> {
    let (key, value) = request
        .split_once(':')
        .ok_or_else(|| Error::InvalidInput(format!("expected 'key:value', got '{}'", request)))?;
    store.set(key, value).await?;
    Ok((key, value))
}

/// Method payloads arrive as JSON strings; quotes are dropped.
fn request_text(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).replace('"', "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::StoreConnectionManager;
    use twinsync_storage::MemoryConnector;

    async fn connected() -> (StoreConnectionManager, MemoryConnector, DirectMethods) {
        let connector = MemoryConnector::new();
        let manager = StoreConnectionManager::new(Arc::new(connector.clone()));
        manager.ensure_connected("cache:6379").await.unwrap();
        let methods = DirectMethods::new(manager.slot());
        (manager, connector, methods)
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (_manager, connector, methods) = connected().await;

        let response = methods.invoke(SET_ITEM, br#""color:blue""#).await;
        assert_eq!(
            response,
            MethodResponse::ok("Written => key = 'color', value = 'blue'")
        );
        assert_eq!(connector.value("cache:6379", "color"), Some("blue".to_string()));

        let response = methods.invoke(GET_ITEM, br#""color""#).await;
        assert_eq!(response, MethodResponse::ok("blue"));
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let (_manager, _, methods) = connected().await;

        let response = methods.get_item("absent").await;

        assert_eq!(response, MethodResponse::failed("No value available in store"));
    }

    #[tokio::test]
    async fn test_no_connection() {
        let methods = DirectMethods::new(StoreSlot::default());

        assert_eq!(
            methods.get_item("k").await,
            MethodResponse::failed("No connection to store available")
        );
        assert_eq!(methods.set_item("k:v").await.status, 500);
    }

    #[tokio::test]
    async fn test_dead_connection_counts_as_none() {
        let (_manager, connector, methods) = connected().await;
        connector.sever_connections();

        let response = methods.get_item("k").await;

        assert_eq!(response.message, "No connection to store available");
    }

    #[tokio::test]
    async fn test_set_without_delimiter() {
        let (_manager, _, methods) = connected().await;

        let response = methods.set_item("novalue").await;

        assert_eq!(response.status, 500);
        assert!(response.message.starts_with("SetItem error:"));
    }

    #[tokio::test]
    async fn test_set_rejected_write() {
        let (_manager, connector, methods) = connected().await;
        connector.reject_key("locked");

        let response = methods.set_item("locked:1").await;

        assert!(!response.is_success());
        assert!(response.message.contains("locked"));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let (_manager, _, methods) = connected().await;

        let response = methods.invoke("Reboot", b"").await;

        assert_eq!(response.status, 501);
    }

    #[test]
    fn test_response_wire_format() {
        let json = serde_json::to_string(&MethodResponse::ok("v")).unwrap();
        assert_eq!(json, r#"{"Status":200,"Message":"v"}"#);
    }
}
