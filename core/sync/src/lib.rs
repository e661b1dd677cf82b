//! TwinSync reconciliation engine
//!
//! This module turns configuration snapshots into store state:
//! - Field-level diffing against the last applied configuration
//! - A single managed connection to the key-value store
//! - Bulk loading of `key:value` records from an object store
//! - One-at-a-time reconciliation cycles with snapshot coalescing
//! - Direct `GetItem` / `SetItem` methods against the live connection

pub mod bulk;
pub mod channel;
pub mod connection;
pub mod differ;
pub mod engine;
pub mod methods;
pub mod retry;
pub mod scheduler;
pub mod state;

// Re-export main types
pub use bulk::{BulkLoadPipeline, BulkRecord, LoadFailure, LoadReport, LoadStep, MalformedLinePolicy};
pub use channel::{ConfigChannel, MemoryChannel};
pub use connection::{ConnectionChange, ConnectionState, StoreConnectionManager, StoreSlot};
pub use differ::{diff, ChangeSet, FieldChange};
pub use engine::{CycleReport, ReconciliationEngine, SyncConfig};
pub use methods::{DirectMethods, MethodResponse};
pub use retry::FetchRetry;
pub use scheduler::{ReconcileScheduler, ReconcileWorker};
pub use state::{AppliedState, EngineState};
