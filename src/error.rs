use std::path::PathBuf;

use thiserror::Error;

/// A request that must never reach storage.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError
{
    #[error("event name {0:?} must match <2 chars>[-=]<schema>")]
    EventShape(String),

    #[error("event name {event:?} has mode selector {mode:?}, expected '-' or '='")]
    Mode { event: String, mode: char },

    #[error("database schema {0:?} must be alpha-numeric and not contain a path separator")]
    Schema(String),
}

/// Failure raised by a table operation. These are forwarded to the
/// requester as `("exception", ..)` messages.
#[derive(Debug, Error)]
pub enum StoreError
{
    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("{op}() takes {expected} argument(s) ({given} given)")]
    Arguments { op: &'static str, expected: String, given: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}() result is not iterable")]
    NotIterable(&'static str),

    #[error("store handle is closed")]
    Closed,

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("storage error: {0}")]
    Storage(#[from] rocksdb::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError
{
    /// Stable name carried in the exception payload.
    pub fn kind(&self) -> &'static str
    {
        match self {
            StoreError::KeyNotFound(_) => "KeyNotFound",
            StoreError::Arguments { .. } => "Arguments",
            StoreError::InvalidArgument(_) => "InvalidArgument",
            StoreError::NotIterable(_) => "NotIterable",
            StoreError::Closed => "Closed",
            StoreError::Corrupt(_) => "Corrupt",
            StoreError::Storage(_) => "Storage",
            StoreError::Serialization(_) => "Serialization",
            StoreError::Io(_) => "Io",
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Conditions that end a worker without an `"exception"` message.
#[derive(Debug, Error)]
pub enum WorkerError
{
    #[error("'{0}' is not a valid table operation")]
    InvalidOperation(String),

    #[error("failed to open store {}: {source}", path.display())]
    Open { path: PathBuf, source: std::io::Error },

    #[error("channel send failed: {0}")]
    Channel(#[source] std::io::Error),
}
