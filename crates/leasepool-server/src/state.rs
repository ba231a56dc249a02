//! Shared handler state

use std::sync::Arc;

use leasepool_node::LeasePool;

use crate::error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<LeasePool>,
}

impl AppState {
    pub fn new(pool: Arc<LeasePool>) -> Self {
        Self { pool }
    }

    /// Run a synchronous pool operation off the async workers
    ///
    /// Allocation waits on a lock and every pool call may hit the disk.
    pub async fn blocking<T, F>(&self, op: F) -> ApiResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&LeasePool) -> Result<T, leasepool_node::PoolError> + Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || op(&pool))
            .await
            .map_err(|e| ApiError::InternalError(e.to_string()))?
            .map_err(ApiError::from)
    }
}
