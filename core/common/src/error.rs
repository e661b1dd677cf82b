//! Common error types for TwinSync.

use thiserror::Error;

/// Top-level error type for TwinSync operations.
///
/// Every variant carries owned text so a single error can be cloned into
/// the reports of several coalesced reconciliation requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Store unreachable, connect rejected, or the connection broke mid-use.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A store operation was attempted with no live connection.
    #[error("No store connection available")]
    ConnectionRequired,

    /// Bulk object fetch failed.
    #[error("Fetch error: {message}")]
    Fetch {
        /// Error message.
        message: String,
        /// Whether the fetch may succeed if attempted again.
        retryable: bool,
    },

    /// Bulk object content is not valid text.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Malformed bulk-source line (1-based line number).
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Store rejected a write.
    #[error("Write error for key '{key}': {message}")]
    Write { key: String, message: String },

    /// Reported-state emission failed.
    #[error("Channel error: {0}")]
    Channel(String),

    /// Operation aborted by shutdown.
    #[error("Operation cancelled")]
    Cancelled,

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

impl Error {
    /// Build a fetch error that is worth retrying (transport failures, 5xx).
    pub fn fetch_transient(message: impl Into<String>) -> Self {
        Error::Fetch {
            message: message.into(),
            retryable: true,
        }
    }

    /// Build a fetch error that will not go away on retry (auth, missing object).
    pub fn fetch_permanent(message: impl Into<String>) -> Self {
        Error::Fetch {
            message: message.into(),
            retryable: false,
        }
    }

    /// Whether retrying the failed operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Fetch { retryable: true, .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::fetch_transient("503").is_retryable());
        assert!(!Error::fetch_permanent("403").is_retryable());
        assert!(!Error::Connection("refused".to_string()).is_retryable());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::Parse {
            line: 3,
            message: "missing ':' delimiter".to_string(),
        };
        assert_eq!(err.to_string(), "Parse error on line 3: missing ':' delimiter");

        let err = Error::Write {
            key: "k1".to_string(),
            message: "READONLY".to_string(),
        };
        assert_eq!(err.to_string(), "Write error for key 'k1': READONLY");
    }
}
