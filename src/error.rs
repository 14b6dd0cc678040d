//! Error types for sync operations.

use std::io;
use thiserror::Error;

/// Errors that can occur while synchronizing a collection.
#[derive(Error, Debug)]
pub enum SyncError {
    /// I/O error during checkpoint or output file operations.
    #[error(transparent)]
    IoError(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),

    /// Network or timeout failure on a remote call. Eligible for a retry.
    #[error("Transient fetch failure for collection '{collection}': {message}")]
    TransientFetch {
        /// Collection whose pipeline issued the call.
        collection: String,
        /// Underlying failure description.
        message: String,
    },

    /// The store answered but refused the request or sent an unusable body.
    /// Retrying the same request would fail the same way.
    #[error("Remote store rejected request for collection '{collection}': {message}")]
    Remote {
        /// Collection whose pipeline issued the call.
        collection: String,
        /// HTTP status of the response, if one was received.
        status: Option<u16>,
        /// Underlying failure description.
        message: String,
    },

    /// A real document was expected but its payload was absent.
    #[error("Malformed document '{identifier}' in collection '{collection}'")]
    MalformedDocument {
        /// Owning collection.
        collection: String,
        /// Identifier of the offending document.
        identifier: String,
    },

    /// A persisted checkpoint could not be parsed.
    #[error("Checkpoint '{key}' is corrupt: {message}")]
    CheckpointCorrupt {
        /// Cache key of the checkpoint record.
        key: String,
        /// Parse failure description.
        message: String,
    },

    /// Invalid or incomplete configuration. Fatal at startup.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A paginated query returned an unusable continuation cursor.
    #[error("Pagination failed: {0}")]
    Pagination(String),
}

impl SyncError {
    /// Builds a transient fetch error for `collection`.
    pub fn transient(collection: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::TransientFetch {
            collection: collection.into(),
            message: message.into(),
        }
    }

    /// Whether the orchestrator may retry the pipeline that produced this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::TransientFetch { .. })
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, SyncError>;
