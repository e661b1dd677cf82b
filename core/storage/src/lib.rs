//! Store and bulk-source backends for TwinSync.
//!
//! This module provides the trait-based interfaces the reconciliation engine
//! talks to, plus concrete backends:
//! - key-value store: RESP over TCP, in-memory
//! - bulk object fetcher: Azure Blob Storage with SAS credentials, in-memory
//!
//! # Design Principles
//! - Backend isolation: no backend-specific logic in the engine
//! - Async operations: all I/O operations are async
//! - Unified error semantics: connection, fetch and write failures map onto
//!   the common error taxonomy

pub mod azure;
pub mod blob;
pub mod kv;
pub mod memory;
pub mod registry;
pub mod resp;

pub use azure::{AzureBlobFetcher, BlobServiceLocation};
pub use blob::{BlobFetcher, MemoryBlobFetcher};
pub use kv::{KvStore, StoreConnector};
pub use memory::{MemoryConnector, MemoryStore, StoreEvent};
pub use registry::{create_default_registry, ConnectorFactory, ConnectorRegistry};
pub use resp::{RespConnector, RespStore};
