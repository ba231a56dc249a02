//! Pool occupancy report

use serde::Serialize;

use leasepool_core::{Account, StoredEvent};

use crate::applier::ApplierStats;

/// Level from which an account counts as high level
const HIGH_LEVEL: u16 = 30;

/// Number of log entries included in a status snapshot
pub const RECENT_EVENTS: usize = 20;

/// Rows of the occupancy table and their membership test
const CONDITIONS: &[(&str, fn(&Account) -> bool)] = &[
    ("ALL", |_| true),
    ("Unknown / New", |a| a.level.is_none()),
    ("In Use", |a| a.system_id.is_some()),
    ("Good", |a| a.banned == Some(false) && a.shadowbanned == Some(false)),
    ("Only Blind", |a| a.banned == Some(false) && a.shadowbanned == Some(true)),
    ("Banned", |a| a.banned == Some(true)),
    ("Captcha", |a| a.captcha == Some(true)),
];

/// Account counts for one condition, split by level
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionRow {
    pub condition: String,
    /// Level 1-29
    pub low: usize,
    /// Level 30+
    pub high: usize,
    /// Level never reported
    pub unknown: usize,
    pub total: usize,
}

impl ConditionRow {
    fn new(condition: &str) -> Self {
        Self {
            condition: condition.to_string(),
            low: 0,
            high: 0,
            unknown: 0,
            total: 0,
        }
    }

    fn count(&mut self, account: &Account) {
        match account.level {
            Some(level) if level >= HIGH_LEVEL => self.high += 1,
            Some(_) => self.low += 1,
            None => self.unknown += 1,
        }
        self.total += 1;
    }
}

/// Update queue fill level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub depth: usize,
    pub capacity: usize,
}

/// Snapshot of the pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub total_accounts: usize,
    pub conditions: Vec<ConditionRow>,
    pub queue: QueueStatus,
    pub applier: ApplierStats,
    /// Newest events first
    pub recent_events: Vec<StoredEvent>,
}

/// Tally accounts into the occupancy table
pub fn condition_rows<'a>(accounts: impl IntoIterator<Item = &'a Account>) -> Vec<ConditionRow> {
    let mut rows: Vec<_> = CONDITIONS.iter().map(|(name, _)| ConditionRow::new(name)).collect();
    for account in accounts {
        for (row, (_, applies)) in rows.iter_mut().zip(CONDITIONS) {
            if applies(account) {
                row.count(account);
            }
        }
    }
    rows
}
