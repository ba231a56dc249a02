//! Lifecycle events
//!
//! Events form an append-only audit trail of account transitions
//! (assignment, release, health flag changes, level ups).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum stored length of an event description, in characters
pub const MAX_DESCRIPTION_LEN: usize = 255;

/// Kind of entity an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Account,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityType::Account => f.write_str("account"),
        }
    }
}

/// A single audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEvent {
    pub timestamp: DateTime<Utc>,
    pub entity_type: EntityType,
    /// Username of the account
    pub entity_id: String,
    pub description: String,
}

impl AccountEvent {
    /// Create an account event, truncating the description to
    /// [`MAX_DESCRIPTION_LEN`] characters
    pub fn account(
        username: impl Into<String>,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut description = description.into();
        if let Some((cut, _)) = description.char_indices().nth(MAX_DESCRIPTION_LEN) {
            description.truncate(cut);
        }
        Self {
            timestamp,
            entity_type: EntityType::Account,
            entity_id: username.into(),
            description,
        }
    }
}

/// An event together with its position in the log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Monotonic sequence number assigned by the log
    pub sequence: u64,
    pub event: AccountEvent,
}
