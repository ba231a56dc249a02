//! Error types for the pool coordinator

use std::time::Duration;

use thiserror::Error;

use leasepool_core::PatchError;

/// Errors surfaced synchronously to callers of the pool
#[derive(Debug, Error)]
pub enum PoolError {
    /// Update queue is full; retry later
    #[error("Update queue is full ({max} pending)")]
    CapacityExceeded { max: usize },

    /// Request or patch failed validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Another lease request held the allocation lock for too long
    #[error("Allocation busy, lock not acquired within {0:?}")]
    AllocationBusy(Duration),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] leasepool_storage::StorageError),

    /// Pool already started
    #[error("Pool already started")]
    AlreadyStarted,

    /// Pool stopped; no further updates are accepted
    #[error("Pool is shut down")]
    Closed,
}

impl From<PatchError> for PoolError {
    fn from(e: PatchError) -> Self {
        PoolError::InvalidInput(e.to_string())
    }
}

/// Result type alias for pool operations
pub type PoolResult<T> = Result<T, PoolError>;
