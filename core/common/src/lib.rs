//! Common utilities and types shared across TwinSync modules.
//!
//! This module provides the error taxonomy and the configuration document
//! types that the store, fetcher and engine crates agree on.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{BlobCoordinates, ConfigField, ConfigurationSnapshot, ReportedState, SasToken};
