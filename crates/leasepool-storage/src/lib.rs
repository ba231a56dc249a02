//! # LeasePool Storage
//!
//! Storage for the account pool: a keyed account repository plus an
//! append-only event log, behind one [`AccountStore`] trait.
//!
//! ## Features
//!
//! - **AccountStore trait**: Point lookups, get-or-create, filtered scans and
//!   atomic read-modify-write of one account together with its events
//! - **InMemoryAccountStore**: In-memory implementation for tests and embedding
//! - **RedbAccountStore**: redb-backed durable implementation
//!
//! ## Example
//!
//! ```rust,ignore
//! use leasepool_core::{Account, AccountEvent, Clock, SystemClock};
//! use leasepool_storage::{AccountStore, AccountWrite, InMemoryAccountStore};
//!
//! let store = InMemoryAccountStore::new();
//! let now = SystemClock.now_utc();
//!
//! store.transact("a1", &mut |current| {
//!     let mut account = current.unwrap_or_else(|| Account::new("a1", now));
//!     account.level = Some(5);
//!     let event = AccountEvent::account("a1", "Level 5 reached", now);
//!     Some(AccountWrite::new(account).with_event(event))
//! })?;
//! ```

pub mod error;
pub mod memory;
pub mod persistent;
mod tables;

// Re-exports
pub use error::StorageError;
pub use memory::InMemoryAccountStore;
pub use persistent::RedbAccountStore;
pub use tables::RedbStoreConfig;

use leasepool_core::{Account, AccountEvent, AccountFilter, StoredEvent};

/// The new state of one account plus the events describing the change
#[derive(Debug, Clone, PartialEq)]
pub struct AccountWrite {
    pub account: Account,
    pub events: Vec<AccountEvent>,
}

impl AccountWrite {
    pub fn new(account: Account) -> Self {
        Self {
            account,
            events: Vec::new(),
        }
    }

    pub fn with_event(mut self, event: AccountEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn with_events(mut self, events: impl IntoIterator<Item = AccountEvent>) -> Self {
        self.events.extend(events);
        self
    }
}

/// Read-modify-write callback for [`AccountStore::transact`]
///
/// Receives the stored account (`None` if absent) and returns the write to
/// commit, or `None` to leave the store untouched.
pub type AccountMutation<'a> = dyn FnMut(Option<Account>) -> Option<AccountWrite> + 'a;

/// Durable keyed repository of accounts and their event log
///
/// Every mutation of an account goes through [`transact`](Self::transact),
/// which reads, modifies and writes the record and appends its events as
/// one atomic unit. Concurrent writers to the same account are serialized.
pub trait AccountStore: Send + Sync {
    /// Point lookup
    fn get(&self, username: &str) -> Result<Option<Account>, StorageError>;

    /// Store `account` unless its username already exists
    ///
    /// Returns `true` if the account was created. An existing record is
    /// never overwritten.
    fn insert_if_absent(&self, account: Account) -> Result<bool, StorageError>;

    /// Atomically read, modify and write one account and its events
    ///
    /// Returns the committed account, or `None` if the mutation declined
    /// to write.
    fn transact(
        &self,
        username: &str,
        mutate: &mut AccountMutation<'_>,
    ) -> Result<Option<Account>, StorageError>;

    /// Accounts matching `filter`, oldest `last_modified` first, at most
    /// `limit` of them
    fn scan(&self, filter: &AccountFilter, limit: Option<usize>) -> Result<Vec<Account>, StorageError>;

    /// All events recorded for an account, in log order
    fn events_for(&self, username: &str) -> Result<Vec<StoredEvent>, StorageError>;

    /// The newest `limit` events, newest first
    fn recent_events(&self, limit: usize) -> Result<Vec<StoredEvent>, StorageError>;
}

/// Apply filter, ordering and limit of a scan to a candidate set
pub(crate) fn select(
    accounts: impl IntoIterator<Item = Account>,
    filter: &AccountFilter,
    limit: Option<usize>,
) -> Vec<Account> {
    let mut matching: Vec<Account> = accounts
        .into_iter()
        .filter(|account| filter.matches(account))
        .collect();
    matching.sort_by(|a, b| {
        a.last_modified
            .cmp(&b.last_modified)
            .then_with(|| a.username.cmp(&b.username))
    });
    if let Some(limit) = limit {
        matching.truncate(limit);
    }
    matching
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use leasepool_core::HolderFilter;

    /// Test that the AccountStore trait is object-safe
    fn _assert_object_safe(_: &dyn AccountStore) {}

    #[test]
    fn test_select_orders_oldest_first() {
        let now = Utc::now();
        let accounts = vec![
            Account::new("c", now),
            Account::new("a", now - Duration::minutes(5)),
            Account::new("b", now - Duration::minutes(5)),
            Account::new("d", now).with_system_id("sysA"),
        ];

        let filter = AccountFilter::all().holder(HolderFilter::Unleased);
        let selected = select(accounts, &filter, Some(2));
        let names: Vec<_> = selected.iter().map(|a| a.username.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
