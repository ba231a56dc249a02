//! Lease allocation
//!
//! Selection and assignment run under one process-wide lock so that two
//! concurrent requests can never be handed the same account. The lock is
//! taken with a bounded wait; updates and reclamation never take it and
//! rely on the per-account transactions of the store instead.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use leasepool_core::{AccountFilter, Clock, LeaseRecord, LeaseRequest};
use leasepool_storage::{AccountStore, AccountWrite};

use crate::error::{PoolError, PoolResult};
use crate::transitions::diff;

/// Hands out accounts to requesting systems
pub struct Allocator {
    store: Arc<dyn AccountStore>,
    clock: Arc<dyn Clock>,
    lock: Mutex<()>,
    lock_timeout: Duration,
}

impl Allocator {
    pub fn new(store: Arc<dyn AccountStore>, clock: Arc<dyn Clock>, lock_timeout: Duration) -> Self {
        Self {
            store,
            clock,
            lock: Mutex::new(()),
            lock_timeout,
        }
    }

    /// Lease up to `request.count` eligible accounts to `request.system_id`
    ///
    /// Returning fewer records than requested is not an error.
    #[instrument(skip(self, request), fields(system_id = %request.system_id, count = request.count))]
    pub fn request(&self, request: &LeaseRequest) -> PoolResult<Vec<LeaseRecord>> {
        validate(request)?;
        if request.count == 0 {
            return Ok(Vec::new());
        }

        let _guard = self
            .lock
            .try_lock_for(self.lock_timeout)
            .ok_or(PoolError::AllocationBusy(self.lock_timeout))?;

        let mut leased = Vec::new();
        for filter in request.search_order() {
            let remaining = request.count - leased.len();
            if remaining == 0 {
                break;
            }

            for candidate in self.store.scan(&filter, Some(remaining))? {
                if let Some(record) = self.assign(&candidate.username, &filter, &request.system_id)? {
                    leased.push(record);
                }
            }
        }

        if leased.len() < request.count {
            debug!(
                requested = request.count,
                leased = leased.len(),
                "Not enough eligible accounts"
            );
        }
        info!(leased = leased.len(), "Leased accounts");
        Ok(leased)
    }

    /// Assign one candidate if it still matches `filter`
    fn assign(
        &self,
        username: &str,
        filter: &AccountFilter,
        system_id: &str,
    ) -> PoolResult<Option<LeaseRecord>> {
        let now = self.clock.now_utc();
        let written = self.store.transact(username, &mut |current| {
            let prev = current?;
            if !filter.matches(&prev) {
                return None;
            }

            let mut next = prev.clone();
            next.system_id = Some(system_id.to_string());
            next.last_modified = now;
            let events = diff(&prev, &next, None, now);
            Some(AccountWrite::new(next).with_events(events))
        })?;

        if written.is_none() {
            debug!(username, "Candidate changed since selection, skipped");
        }
        Ok(written.as_ref().map(LeaseRecord::from))
    }
}

fn validate(request: &LeaseRequest) -> PoolResult<()> {
    if request.system_id.is_empty() {
        return Err(PoolError::InvalidInput("system_id must not be empty".into()));
    }
    if request.min_level > request.max_level {
        return Err(PoolError::InvalidInput(format!(
            "min_level {} exceeds max_level {}",
            request.min_level, request.max_level
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use leasepool_core::{Account, ManualClock};
    use leasepool_storage::InMemoryAccountStore;

    fn allocator_with(accounts: Vec<Account>) -> (Allocator, Arc<InMemoryAccountStore>) {
        let store = Arc::new(InMemoryAccountStore::new());
        for account in accounts {
            store.insert_if_absent(account).unwrap();
        }
        let clock = Arc::new(ManualClock::default());
        let allocator = Allocator::new(store.clone(), clock, Duration::from_millis(100));
        (allocator, store)
    }

    #[test]
    fn test_rejects_invalid_requests() {
        let (allocator, _store) = allocator_with(vec![]);

        let empty = LeaseRequest::new("", 1);
        assert!(matches!(allocator.request(&empty), Err(PoolError::InvalidInput(_))));

        let inverted = LeaseRequest::new("sysA", 1).with_levels(30, 10);
        assert!(matches!(allocator.request(&inverted), Err(PoolError::InvalidInput(_))));
    }

    #[test]
    fn test_zero_count_is_empty() {
        let (allocator, store) = allocator_with(vec![Account::new("a1", Utc::now())]);
        assert!(allocator.request(&LeaseRequest::new("sysA", 0)).unwrap().is_empty());
        assert!(!store.get("a1").unwrap().unwrap().is_leased());
    }

    #[test]
    fn test_count_beyond_pool_returns_what_exists() {
        let (allocator, store) = allocator_with(vec![Account::new("a1", Utc::now())]);

        for count in [usize::MAX, 1usize << 40] {
            let leased = allocator.request(&LeaseRequest::new("sysA", count)).unwrap();
            assert_eq!(leased.len(), 1);
            assert_eq!(leased[0].username, "a1");
        }
        assert_eq!(store.get("a1").unwrap().unwrap().system_id.as_deref(), Some("sysA"));
    }

    #[test]
    fn test_oldest_first_and_assignment_event() {
        let now = Utc::now();
        let (allocator, store) = allocator_with(vec![
            Account::new("newer", now),
            Account::new("older", now - chrono::Duration::minutes(5)),
        ]);

        let leased = allocator.request(&LeaseRequest::new("sysA", 1)).unwrap();
        assert_eq!(leased.len(), 1);
        assert_eq!(leased[0].username, "older");

        let account = store.get("older").unwrap().unwrap();
        assert_eq!(account.system_id.as_deref(), Some("sysA"));
        let events = store.events_for("older").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.description, "Got assigned to [sysA]");
    }

    #[test]
    fn test_reuse_renews_without_event() {
        let now = Utc::now();
        let (allocator, store) = allocator_with(vec![
            Account::new("mine", now).with_system_id("sysA"),
            Account::new("free", now - chrono::Duration::minutes(1)),
        ]);

        let request = LeaseRequest::new("sysA", 1).with_reuse(true);
        let leased = allocator.request(&request).unwrap();
        assert_eq!(leased[0].username, "mine");
        assert!(store.events_for("mine").unwrap().is_empty());
        assert!(!store.get("free").unwrap().unwrap().is_leased());
    }

    #[test]
    fn test_level_bounds_exclude_unknown_level() {
        let now = Utc::now();
        let (allocator, _store) = allocator_with(vec![
            Account::new("unknown", now),
            Account::new("low", now).with_level(5),
            Account::new("high", now).with_level(32),
        ]);

        let request = LeaseRequest::new("sysA", 5).with_levels(30, 40);
        let names: Vec<_> = allocator
            .request(&request)
            .unwrap()
            .into_iter()
            .map(|r| r.username)
            .collect();
        assert_eq!(names, vec!["high"]);
    }

    #[test]
    fn test_busy_lock_times_out() {
        let (allocator, _store) = allocator_with(vec![]);
        let _held = allocator.lock.lock();
        let result = allocator.request(&LeaseRequest::new("sysA", 1));
        assert!(matches!(result, Err(PoolError::AllocationBusy(_))));
    }
}
