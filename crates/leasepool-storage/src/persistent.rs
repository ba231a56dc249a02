//! Persistent storage implementation
//!
//! [`RedbAccountStore`] keeps accounts in the `accounts` table keyed by
//! username and events in the `events` table keyed by a monotonically
//! increasing sequence number. redb serializes write transactions, so each
//! [`AccountStore::transact`] call is an isolated read-modify-write of the
//! account and its events.

use redb::{Database, ReadableTable};
use tracing::{debug, instrument, trace};

use leasepool_core::{Account, AccountFilter, StoredEvent};

use crate::error::StorageError;
use crate::tables::{ACCOUNTS, EVENTS, RedbStoreConfig, decode, encode, open_database};
use crate::{AccountMutation, AccountStore, select};

/// redb-backed implementation of AccountStore
pub struct RedbAccountStore {
    db: Database,
    config: RedbStoreConfig,
}

impl RedbAccountStore {
    /// Open or create the store
    pub fn open(config: RedbStoreConfig) -> Result<Self, StorageError> {
        let db = open_database(&config)?;
        Ok(Self { db, config })
    }

    /// Get the configuration
    pub fn config(&self) -> &RedbStoreConfig {
        &self.config
    }

    fn read_account(&self, username: &str) -> Result<Option<Account>, StorageError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ACCOUNTS)?;
        let value = table.get(username)?;
        value.map(|guard| decode(guard.value())).transpose()
    }

    fn read_events(&self) -> Result<Vec<StoredEvent>, StorageError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(EVENTS)?;

        let mut events = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            events.push(StoredEvent {
                sequence: key.value(),
                event: decode(value.value())?,
            });
        }
        Ok(events)
    }
}

impl AccountStore for RedbAccountStore {
    fn get(&self, username: &str) -> Result<Option<Account>, StorageError> {
        self.read_account(username)
    }

    fn insert_if_absent(&self, account: Account) -> Result<bool, StorageError> {
        let write_txn = self.db.begin_write()?;
        let created = {
            let mut table = write_txn.open_table(ACCOUNTS)?;
            let exists = table.get(account.username.as_str())?.is_some();
            if !exists {
                table.insert(account.username.as_str(), encode(&account)?.as_slice())?;
            }
            !exists
        };
        write_txn.commit()?;

        if created {
            debug!(username = %account.username, "Inserted account");
        }
        Ok(created)
    }

    #[instrument(skip(self, mutate))]
    fn transact(
        &self,
        username: &str,
        mutate: &mut AccountMutation<'_>,
    ) -> Result<Option<Account>, StorageError> {
        let write_txn = self.db.begin_write()?;

        let current: Option<Account> = {
            let table = write_txn.open_table(ACCOUNTS)?;
            let value = table.get(username)?;
            value.map(|guard| decode(guard.value())).transpose()?
        };

        let Some(write) = mutate(current) else {
            write_txn.abort()?;
            trace!("Mutation declined, transaction aborted");
            return Ok(None);
        };
        debug_assert_eq!(write.account.username, username);

        {
            let mut table = write_txn.open_table(ACCOUNTS)?;
            table.insert(username, encode(&write.account)?.as_slice())?;
        }

        if !write.events.is_empty() {
            let mut table = write_txn.open_table(EVENTS)?;
            let mut sequence = table.last()?.map(|(key, _)| key.value()).unwrap_or(0);
            for event in &write.events {
                sequence += 1;
                table.insert(sequence, encode(event)?.as_slice())?;
            }
        }

        write_txn.commit()?;
        trace!(events = write.events.len(), "Committed account mutation");
        Ok(Some(write.account))
    }

    fn scan(&self, filter: &AccountFilter, limit: Option<usize>) -> Result<Vec<Account>, StorageError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ACCOUNTS)?;

        let mut accounts = Vec::new();
        for entry in table.iter()? {
            let (_key, value) = entry?;
            accounts.push(decode::<Account>(value.value())?);
        }
        Ok(select(accounts, filter, limit))
    }

    fn events_for(&self, username: &str) -> Result<Vec<StoredEvent>, StorageError> {
        let mut events = self.read_events()?;
        events.retain(|stored| stored.event.entity_id == username);
        Ok(events)
    }

    fn recent_events(&self, limit: usize) -> Result<Vec<StoredEvent>, StorageError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(EVENTS)?;

        let mut events = Vec::with_capacity(limit);
        for entry in table.iter()?.rev().take(limit) {
            let (key, value) = entry?;
            events.push(StoredEvent {
                sequence: key.value(),
                event: decode(value.value())?,
            });
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AccountWrite;
    use chrono::Utc;
    use leasepool_core::{AccountEvent, HolderFilter};
    use tempfile::TempDir;

    fn create_test_store() -> (RedbAccountStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = RedbStoreConfig::with_path(temp_dir.path().join("test.redb"));
        let store = RedbAccountStore::open(config).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_insert_and_get() {
        let (store, _temp) = create_test_store();
        let account = Account::new("a1", Utc::now()).with_level(12);

        assert!(store.insert_if_absent(account.clone()).unwrap());
        assert!(!store.insert_if_absent(account.clone().with_level(30)).unwrap());

        let retrieved = store.get("a1").unwrap().unwrap();
        assert_eq!(retrieved, account);
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_transact_appends_events_in_sequence() {
        let (store, _temp) = create_test_store();
        let now = Utc::now();

        for level in [5u16, 6] {
            store
                .transact("a1", &mut |current| {
                    let mut account = current.unwrap_or_else(|| Account::new("a1", now));
                    account.level = Some(level);
                    let event = AccountEvent::account("a1", format!("Level {level} reached"), now);
                    Some(AccountWrite::new(account).with_event(event))
                })
                .unwrap();
        }

        let events = store.events_for("a1").unwrap();
        let sequences: Vec<_> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2]);
        assert_eq!(events[1].event.description, "Level 6 reached");
        assert_eq!(store.get("a1").unwrap().unwrap().level, Some(6));
    }

    #[test]
    fn test_declined_transaction_leaves_no_trace() {
        let (store, _temp) = create_test_store();
        assert!(store.transact("a1", &mut |_| None).unwrap().is_none());
        assert!(store.get("a1").unwrap().is_none());
        assert!(store.recent_events(10).unwrap().is_empty());
    }

    #[test]
    fn test_scan_filters_and_limits() {
        let (store, _temp) = create_test_store();
        let now = Utc::now();
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            let account = Account::new(*name, now + chrono::Duration::seconds(i as i64));
            store.insert_if_absent(account).unwrap();
        }
        store
            .insert_if_absent(Account::new("held", now).with_system_id("sysA"))
            .unwrap();

        let filter = AccountFilter::all().holder(HolderFilter::Unleased);
        let found = store.scan(&filter, Some(2)).unwrap();
        let names: Vec<_> = found.iter().map(|a| a.username.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        let all = store.scan(&AccountFilter::all(), None).unwrap();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_reopen_preserves_data() {
        let temp_dir = TempDir::new().unwrap();
        let config = RedbStoreConfig::with_path(temp_dir.path().join("reopen.redb"));
        let now = Utc::now();
        let record = |description: &'static str| {
            move |current: Option<Account>| {
                let account = current.unwrap_or_else(|| Account::new("a1", now));
                Some(AccountWrite::new(account).with_event(AccountEvent::account("a1", description, now)))
            }
        };

        {
            let store = RedbAccountStore::open(config.clone()).unwrap();
            store.transact("a1", &mut record("Got banned")).unwrap();
        }

        let store = RedbAccountStore::open(config).unwrap();
        assert!(store.get("a1").unwrap().is_some());
        let recent = store.recent_events(5).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].event.description, "Got banned");

        // Sequence continues after reopen
        store.transact("a1", &mut record("Ban lifted")).unwrap();
        let recent = store.recent_events(5).unwrap();
        assert_eq!(recent[0].sequence, 2);
        assert_eq!(recent[0].event.description, "Ban lifted");
    }
}
