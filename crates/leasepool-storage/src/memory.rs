//! In-memory storage implementation
//!
//! Suitable for tests and for embedding the pool without persistence. A
//! single mutex guards accounts and events together, which makes every
//! `transact` call trivially atomic.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::trace;

use leasepool_core::{Account, AccountEvent, AccountFilter, StoredEvent};

use crate::error::StorageError;
use crate::{AccountMutation, AccountStore, select};

#[derive(Debug, Default)]
struct MemoryState {
    accounts: HashMap<String, Account>,
    events: Vec<StoredEvent>,
}

impl MemoryState {
    fn push_event(&mut self, event: AccountEvent) {
        let sequence = self.events.len() as u64 + 1;
        self.events.push(StoredEvent { sequence, event });
    }
}

/// In-memory implementation of AccountStore
#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    state: Mutex<MemoryState>,
}

impl InMemoryAccountStore {
    /// Create a new, empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored accounts
    pub fn account_count(&self) -> usize {
        self.state.lock().accounts.len()
    }

    /// Number of logged events
    pub fn event_count(&self) -> usize {
        self.state.lock().events.len()
    }
}

impl AccountStore for InMemoryAccountStore {
    fn get(&self, username: &str) -> Result<Option<Account>, StorageError> {
        Ok(self.state.lock().accounts.get(username).cloned())
    }

    fn insert_if_absent(&self, account: Account) -> Result<bool, StorageError> {
        let mut state = self.state.lock();
        if state.accounts.contains_key(&account.username) {
            return Ok(false);
        }
        state.accounts.insert(account.username.clone(), account);
        Ok(true)
    }

    fn transact(
        &self,
        username: &str,
        mutate: &mut AccountMutation<'_>,
    ) -> Result<Option<Account>, StorageError> {
        let mut state = self.state.lock();
        let current = state.accounts.get(username).cloned();

        let Some(write) = mutate(current) else {
            trace!(username, "Mutation declined, nothing written");
            return Ok(None);
        };
        debug_assert_eq!(write.account.username, username);

        for event in write.events {
            state.push_event(event);
        }
        state
            .accounts
            .insert(username.to_string(), write.account.clone());
        Ok(Some(write.account))
    }

    fn scan(&self, filter: &AccountFilter, limit: Option<usize>) -> Result<Vec<Account>, StorageError> {
        let state = self.state.lock();
        Ok(select(state.accounts.values().cloned(), filter, limit))
    }

    fn events_for(&self, username: &str) -> Result<Vec<StoredEvent>, StorageError> {
        let state = self.state.lock();
        Ok(state
            .events
            .iter()
            .filter(|stored| stored.event.entity_id == username)
            .cloned()
            .collect())
    }

    fn recent_events(&self, limit: usize) -> Result<Vec<StoredEvent>, StorageError> {
        let state = self.state.lock();
        Ok(state.events.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AccountWrite;
    use chrono::Utc;

    #[test]
    fn test_insert_if_absent_never_overwrites() {
        let store = InMemoryAccountStore::new();
        let now = Utc::now();

        assert!(store.insert_if_absent(Account::new("a1", now).with_level(5)).unwrap());
        assert!(!store.insert_if_absent(Account::new("a1", now).with_level(30)).unwrap());

        let stored = store.get("a1").unwrap().unwrap();
        assert_eq!(stored.level, Some(5));
        assert_eq!(store.account_count(), 1);
    }

    #[test]
    fn test_transact_writes_account_and_events() {
        let store = InMemoryAccountStore::new();
        let now = Utc::now();

        let written = store
            .transact("a1", &mut |current| {
                assert!(current.is_none());
                let account = Account::new("a1", now).with_level(3);
                Some(AccountWrite::new(account).with_event(AccountEvent::account("a1", "created", now)))
            })
            .unwrap();

        assert_eq!(written.unwrap().level, Some(3));
        let events = store.events_for("a1").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sequence, 1);
    }

    #[test]
    fn test_transact_declined_writes_nothing() {
        let store = InMemoryAccountStore::new();
        let result = store.transact("a1", &mut |_| None).unwrap();
        assert!(result.is_none());
        assert!(store.get("a1").unwrap().is_none());
        assert_eq!(store.event_count(), 0);
    }

    #[test]
    fn test_recent_events_newest_first() {
        let store = InMemoryAccountStore::new();
        let now = Utc::now();
        for i in 0..5 {
            store
                .transact("a1", &mut |current| {
                    let account = current.unwrap_or_else(|| Account::new("a1", now));
                    let event = AccountEvent::account("a1", format!("event {i}"), now);
                    Some(AccountWrite::new(account).with_event(event))
                })
                .unwrap();
        }

        let recent = store.recent_events(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].sequence, 5);
        assert_eq!(recent[1].sequence, 4);
    }
}
