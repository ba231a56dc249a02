//! Bounded update queue
//!
//! Producers get an immediate accept/reject. A full queue rejects instead of
//! blocking, so callers see backpressure as a retryable error.

use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{trace, warn};

use leasepool_core::{ReleaseRequest, UpdatePatch};

use crate::error::{PoolError, PoolResult};

/// Share of the capacity at which a deep backlog is reported
const HIGH_WATER_PERCENT: usize = 80;

/// Producer side of the update queue
#[derive(Clone)]
pub struct UpdateQueue {
    tx: mpsc::Sender<UpdatePatch>,
    high_water: usize,
}

impl UpdateQueue {
    /// Create the queue and its consumer end
    pub fn channel(max_queue_size: usize) -> (Self, mpsc::Receiver<UpdatePatch>) {
        let capacity = max_queue_size.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let high_water = (capacity * HIGH_WATER_PERCENT).div_ceil(100);
        (Self { tx, high_water }, rx)
    }

    /// Validate and enqueue one raw patch
    pub fn submit(&self, patch: Value) -> PoolResult<()> {
        let patch = UpdatePatch::from_value(patch)?;
        self.push(patch)
    }

    /// Validate and enqueue several raw patches, all or nothing
    pub fn submit_batch(&self, patches: Vec<Value>) -> PoolResult<()> {
        let patches = patches
            .into_iter()
            .map(UpdatePatch::from_value)
            .collect::<Result<Vec<_>, _>>()?;
        self.push_all(patches)
    }

    /// Enqueue release patches for the given accounts, all or nothing
    pub fn release(&self, requests: Vec<ReleaseRequest>) -> PoolResult<()> {
        if requests.iter().any(|request| request.username.is_empty()) {
            return Err(PoolError::InvalidInput("username must not be empty".into()));
        }
        self.push_all(requests.into_iter().map(UpdatePatch::from).collect())
    }

    /// Patches accepted but not yet taken by the applier
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    fn push(&self, patch: UpdatePatch) -> PoolResult<()> {
        match self.tx.try_send(patch) {
            Ok(()) => {
                self.after_push(1);
                Ok(())
            }
            Err(TrySendError::Full(patch)) => {
                warn!(username = patch.username(), max = self.capacity(), "Update queue full, rejecting");
                Err(self.full())
            }
            Err(TrySendError::Closed(_)) => Err(PoolError::Closed),
        }
    }

    fn push_all(&self, patches: Vec<UpdatePatch>) -> PoolResult<()> {
        if patches.is_empty() {
            return Ok(());
        }
        if patches.len() > self.capacity() {
            return Err(self.full());
        }

        let permits = match self.tx.try_reserve_many(patches.len()) {
            Ok(permits) => permits,
            Err(TrySendError::Full(())) => {
                warn!(batch = patches.len(), max = self.capacity(), "Update queue full, rejecting batch");
                return Err(self.full());
            }
            Err(TrySendError::Closed(())) => return Err(PoolError::Closed),
        };

        let count = patches.len();
        for (permit, patch) in permits.zip(patches) {
            permit.send(patch);
        }
        self.after_push(count);
        Ok(())
    }

    fn after_push(&self, count: usize) {
        let depth = self.depth();
        trace!(count, depth, "Enqueued account updates");
        if depth >= self.high_water {
            warn!(depth, max = self.capacity(), "Update queue is running deep");
        }
    }

    fn full(&self) -> PoolError {
        PoolError::CapacityExceeded {
            max: self.capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_submit_validates_and_counts_depth() {
        let (queue, _rx) = UpdateQueue::channel(4);
        assert!(matches!(queue.submit(json!([1, 2])), Err(PoolError::InvalidInput(_))));
        assert!(matches!(queue.submit(json!({"level": 3})), Err(PoolError::InvalidInput(_))));
        assert_eq!(queue.depth(), 0);

        queue.submit(json!({"username": "a1", "level": 3})).unwrap();
        assert_eq!(queue.depth(), 1);
        assert_eq!(queue.capacity(), 4);
    }

    #[test]
    fn test_full_queue_rejects() {
        let (queue, _rx) = UpdateQueue::channel(2);
        queue.submit(json!({"username": "a1"})).unwrap();
        queue.submit(json!({"username": "a2"})).unwrap();

        let result = queue.submit(json!({"username": "a3"}));
        assert!(matches!(result, Err(PoolError::CapacityExceeded { max: 2 })));
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let (queue, mut rx) = UpdateQueue::channel(3);
        queue.submit(json!({"username": "a1"})).unwrap();

        let batch = vec![
            json!({"username": "a2"}),
            json!({"username": "a3"}),
            json!({"username": "a4"}),
        ];
        assert!(matches!(
            queue.submit_batch(batch),
            Err(PoolError::CapacityExceeded { .. })
        ));
        assert_eq!(queue.depth(), 1);

        // One invalid entry rejects the whole batch
        let batch = vec![json!({"username": "a2"}), json!({"nope": true})];
        assert!(matches!(queue.submit_batch(batch), Err(PoolError::InvalidInput(_))));
        assert_eq!(queue.depth(), 1);

        queue
            .submit_batch(vec![json!({"username": "a2"}), json!({"username": "a3"})])
            .unwrap();
        let order: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|patch| patch.username().to_string())
            .collect();
        assert_eq!(order, vec!["a1", "a2", "a3"]);
    }

    #[test]
    fn test_release_carries_reason() {
        let (queue, mut rx) = UpdateQueue::channel(4);
        queue
            .release(vec![ReleaseRequest::new("a1").with_reason("done")])
            .unwrap();

        let patch = rx.try_recv().unwrap();
        assert_eq!(patch.username(), "a1");
        assert_eq!(patch.reason(), Some("done"));
        assert_eq!(patch.fields().get("system_id"), Some(&Value::Null));
    }

    #[test]
    fn test_closed_queue() {
        let (queue, rx) = UpdateQueue::channel(4);
        drop(rx);
        assert!(matches!(queue.submit(json!({"username": "a1"})), Err(PoolError::Closed)));
    }
}
