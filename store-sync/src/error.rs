//! Error types for store node synchronization.

use std::io;
use thiserror::Error;

/// Main error type for the store-sync crate.
#[derive(Debug, Error)]
pub enum StoreSyncError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),
}

/// Logging-related errors.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to create log directory: {0}")]
    DirectoryCreation(#[from] std::io::Error),

    #[error("Subscriber initialization failed: {0}")]
    SubscriberInit(String),

    #[error("Log rotation failed: {0}")]
    RotationFailed(String),
}

/// Errors raised by the transport and the node directory.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The store node answered with something that cannot be paginated further
    /// (bad cursor, malformed page).
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Store node not connected: {0}")]
    NotConnected(String),

    #[error("Address parse error: {0}")]
    AddressParse(String),

    #[error("Unsupported transport version: {0}")]
    UnsupportedVersion(u32),

    #[error("Filter error: {0}")]
    Filter(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Storage-related errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Data not found: {0}")]
    NotFound(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Clone for StorageError {
    fn clone(&self) -> Self {
        match self {
            StorageError::Corruption(s) => StorageError::Corruption(s.clone()),
            StorageError::NotFound(s) => StorageError::NotFound(s.clone()),
            StorageError::WriteFailed(s) => StorageError::WriteFailed(s.clone()),
            StorageError::ReadFailed(s) => StorageError::ReadFailed(s.clone()),
            StorageError::Io(err) => StorageError::Io(io::Error::new(err.kind(), err.to_string())),
            StorageError::Serialization(s) => StorageError::Serialization(s.clone()),
        }
    }
}

/// Synchronization errors.
///
/// `Clone` so that one coalesced result can be handed to every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// No active store node, or the active one is not connected.
    #[error("mailserver not available")]
    NodeUnavailable,

    /// The node crossed the failure threshold while serving this request.
    #[error("too many failed requests to {0}")]
    TooManyFailedRequests(String),

    /// Cancelled by the caller.
    #[error("Sync cancelled")]
    Cancelled,

    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Transient transport failures (connection refused, reset, dropped peer).
    #[error("Network error: {0}")]
    Network(String),

    /// Malformed responses. Never retried.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Chat not found: {0}")]
    ChatNotFound(String),

    #[error("No filters for chat: {0}")]
    NoFiltersForChat(String),

    #[error("can't sync non-gap message: {0}")]
    NotAGap(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid sync state: {0}")]
    InvalidState(String),
}

impl SyncError {
    /// Returns a static string representing the error category based on the variant
    pub fn category(&self) -> &'static str {
        match self {
            SyncError::NodeUnavailable | SyncError::TooManyFailedRequests(_) => "node",
            SyncError::Cancelled => "cancelled",
            SyncError::Timeout(_) => "timeout",
            SyncError::Network(_) => "network",
            SyncError::Protocol(_) => "protocol",
            SyncError::Storage(_) => "storage",
            SyncError::ChatNotFound(_) | SyncError::NoFiltersForChat(_) | SyncError::NotAGap(_) => {
                "chat"
            }
            SyncError::InvalidRequest(_) => "request",
            SyncError::InvalidState(_) => "state",
        }
    }

    /// Whether the request executor should try the operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Network(_) | SyncError::Timeout(_))
    }
}

/// Type alias for Result with StoreSyncError.
pub type Result<T> = std::result::Result<T, StoreSyncError>;

/// Type alias for network operation results.
pub type NetworkResult<T> = std::result::Result<T, NetworkError>;

/// Type alias for storage operation results.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Type alias for sync operation results.
pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Type alias for logging operation results.
pub type LoggingResult<T> = std::result::Result<T, LoggingError>;

impl From<NetworkError> for SyncError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::Protocol(msg) => SyncError::Protocol(msg),
            NetworkError::Timeout => SyncError::Timeout("store node query".to_string()),
            NetworkError::UnsupportedVersion(v) => {
                SyncError::InvalidState(format!("unsupported transport version {}", v))
            }
            other => SyncError::Network(other.to_string()),
        }
    }
}

impl From<StorageError> for SyncError {
    fn from(err: StorageError) -> Self {
        SyncError::Storage(err.to_string())
    }
}
