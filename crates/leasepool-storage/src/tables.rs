//! redb table definitions and database setup

use std::path::PathBuf;

use redb::{Database, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};

use crate::error::StorageError;

// Key: username, Value: postcard-encoded Account
pub(crate) const ACCOUNTS: TableDefinition<&str, &[u8]> = TableDefinition::new("accounts");

// Key: log sequence number, Value: postcard-encoded AccountEvent
pub(crate) const EVENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("events");

/// Configuration for the redb store
#[derive(Debug, Clone)]
pub struct RedbStoreConfig {
    /// Path to the database file
    pub db_path: PathBuf,
}

impl Default for RedbStoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/leasepool.redb"),
        }
    }
}

impl RedbStoreConfig {
    pub fn with_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }
}

/// Open or create the database and make sure all tables exist
#[instrument(skip(config), fields(path = %config.db_path.display()))]
pub(crate) fn open_database(config: &RedbStoreConfig) -> Result<Database, StorageError> {
    // Ensure parent directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db = Database::create(&config.db_path)?;
    info!("Opened redb database");

    let write_txn = db.begin_write()?;
    write_txn.open_table(ACCOUNTS)?;
    write_txn.open_table(EVENTS)?;
    write_txn.commit()?;

    debug!("Initialized redb tables");
    Ok(db)
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    postcard::to_allocvec(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    postcard::from_bytes(bytes).map_err(|e| StorageError::Deserialization(e.to_string()))
}
