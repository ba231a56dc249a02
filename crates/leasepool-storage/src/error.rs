//! Error types for leasepool-storage
//!
//! Storage errors fall into two classes. Transient ones (I/O, database,
//! transaction and availability failures) may succeed when the same
//! operation is repeated; the rest are permanent for the given input.

use thiserror::Error;

/// Errors that can occur in storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error during storage operations
    #[error("I/O error: {0}")]
    Io(String),

    /// Database engine error
    #[error("Database error: {0}")]
    Database(String),

    /// Transaction could not be started or committed
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Backend temporarily unavailable
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Error during serialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error during deserialization
    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl StorageError {
    /// Create a new Unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Whether repeating the failed operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::Io(_)
                | StorageError::Database(_)
                | StorageError::Transaction(_)
                | StorageError::Unavailable(_)
        )
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<redb::DatabaseError> for StorageError {
    fn from(err: redb::DatabaseError) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<redb::TransactionError> for StorageError {
    fn from(err: redb::TransactionError) -> Self {
        StorageError::Transaction(err.to_string())
    }
}

impl From<redb::TableError> for StorageError {
    fn from(err: redb::TableError) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<redb::StorageError> for StorageError {
    fn from(err: redb::StorageError) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<redb::CommitError> for StorageError {
    fn from(err: redb::CommitError) -> Self {
        StorageError::Transaction(err.to_string())
    }
}
