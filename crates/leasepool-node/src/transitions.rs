//! Lifecycle transitions
//!
//! Every writer (allocator, applier, reaper) derives the audit events of a
//! change the same way: it snapshots the account before mutating it and
//! hands both states to [`diff`]. Unchanged values produce no events, which
//! makes re-applying the same patch a no-op for the event log.

use chrono::{DateTime, Utc};

use leasepool_core::{Account, AccountEvent};

/// Reason attached to releases performed by the reaper
pub const AUTO_RELEASE_REASON: &str = "auto-release, idle timeout";

/// A boolean health flag and the messages logged when it flips
pub struct FlagTransition {
    pub flag: &'static str,
    pub read: fn(&Account) -> Option<bool>,
    pub gained: &'static str,
    pub lifted: &'static str,
}

/// Boolean flags whose transitions are logged, in emission order
pub const FLAG_TRANSITIONS: &[FlagTransition] = &[
    FlagTransition {
        flag: "warn",
        read: |account: &Account| account.warn,
        gained: "Got warn flag",
        lifted: "Warn flag lifted",
    },
    FlagTransition {
        flag: "shadowbanned",
        read: |account: &Account| account.shadowbanned,
        gained: "Got shadowban flag",
        lifted: "Shadowban flag lifted",
    },
    FlagTransition {
        flag: "banned",
        read: |account: &Account| account.banned,
        gained: "Got banned",
        lifted: "Ban lifted",
    },
    FlagTransition {
        flag: "ban_flag",
        read: |account: &Account| account.ban_flag,
        gained: "Got ban flag",
        lifted: "Ban flag lifted",
    },
    FlagTransition {
        flag: "captcha",
        read: |account: &Account| account.captcha,
        gained: "Got CAPTCHA'd",
        lifted: "CAPTCHA solved",
    },
];

impl FlagTransition {
    fn message(&self, prev: &Account, curr: &Account) -> Option<&'static str> {
        match ((self.read)(prev), (self.read)(curr)) {
            (Some(true), Some(true)) => None,
            (_, Some(true)) => Some(self.gained),
            (Some(true), Some(false)) => Some(self.lifted),
            _ => None,
        }
    }
}

/// Synthesize the events describing the change from `prev` to `curr`
///
/// `reason` is appended to a release message when present.
pub fn diff(
    prev: &Account,
    curr: &Account,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Vec<AccountEvent> {
    let username = curr.username.as_str();
    let mut descriptions: Vec<String> = FLAG_TRANSITIONS
        .iter()
        .filter_map(|transition| transition.message(prev, curr))
        .map(str::to_owned)
        .collect();

    if let (Some(before), Some(after)) = (prev.level, curr.level)
        && after > before
    {
        descriptions.push(format!("Level {after} reached"));
    }

    match (prev.system_id.as_deref(), curr.system_id.as_deref()) {
        (Some(holder), None) => descriptions.push(match reason {
            Some(reason) if !reason.is_empty() => format!("Got released from [{holder}]: {reason}"),
            _ => format!("Got released from [{holder}]"),
        }),
        (before, Some(holder)) if before != Some(holder) => {
            descriptions.push(format!("Got assigned to [{holder}]"));
        }
        _ => {}
    }

    descriptions
        .into_iter()
        .map(|description| AccountEvent::account(username, description, now))
        .collect()
}
