//! Error types for the payments ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Record (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Event JSON decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An event referenced an entity that is not in the store.
    ///
    /// The processor treats this as "skip the event", never as fatal.
    #[error("{kind} not found: {id}")]
    ReferenceNotFound {
        /// Entity kind (rail, user token, ...)
        kind: &'static str,
        /// Human readable id
        id: String,
    },

    /// Rail state transition not allowed by the lifecycle
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Malformed or out-of-place event
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for [`Error::ReferenceNotFound`]
    pub fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        Error::ReferenceNotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// True when the event should be skipped rather than failing the stream
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            Error::ReferenceNotFound { .. } | Error::InvalidTransition(_) | Error::InvalidEvent(_)
        )
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
