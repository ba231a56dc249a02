//! Account selection predicates
//!
//! [`AccountFilter`] is the eligibility predicate shared by the allocator
//! (which accounts may be leased), the reaper (which leases are idle) and
//! the store's range scans.

use chrono::{DateTime, Utc};

use crate::account::Account;

/// Lowest level a request can ask for; a lower bound at or below this is
/// not applied
pub const MIN_LEVEL: u16 = 1;

/// Highest level a request can ask for; an upper bound at or above this is
/// not applied
pub const MAX_LEVEL: u16 = 40;

/// Which lease state an account must be in
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HolderFilter {
    #[default]
    Any,
    /// `system_id` is `None`
    Unleased,
    /// `system_id` is set to anything
    Leased,
    /// `system_id` equals the given holder
    LeasedTo(String),
}

impl HolderFilter {
    fn matches(&self, system_id: Option<&str>) -> bool {
        match self {
            HolderFilter::Any => true,
            HolderFilter::Unleased => system_id.is_none(),
            HolderFilter::Leased => system_id.is_some(),
            HolderFilter::LeasedTo(holder) => system_id == Some(holder.as_str()),
        }
    }
}

/// Which health state an account must be in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthFilter {
    #[default]
    Any,
    /// Neither banned nor shadowbanned; unknown passes
    Healthy,
    /// Banned, shadowbanned, or never checked
    Unhealthy,
}

impl HealthFilter {
    fn matches(&self, account: &Account) -> bool {
        match self {
            HealthFilter::Any => true,
            HealthFilter::Healthy => account.is_healthy(),
            HealthFilter::Unhealthy => !account.is_healthy() || account.is_health_unknown(),
        }
    }
}

/// Conjunction of holder, health, level and age conditions
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccountFilter {
    pub holder: HolderFilter,
    pub health: HealthFilter,
    /// Inclusive lower level bound; accounts of unknown level fail it
    pub min_level: Option<u16>,
    /// Inclusive upper level bound; accounts of unknown level fail it
    pub max_level: Option<u16>,
    /// Only accounts last modified at or before this instant
    pub modified_at_or_before: Option<DateTime<Utc>>,
}

impl AccountFilter {
    /// Matches every account
    pub fn all() -> Self {
        Self::default()
    }

    pub fn holder(mut self, holder: HolderFilter) -> Self {
        self.holder = holder;
        self
    }

    pub fn health(mut self, health: HealthFilter) -> Self {
        self.health = health;
        self
    }

    /// Restrict to a level range
    ///
    /// Bounds equal to the outer limits ([`MIN_LEVEL`], [`MAX_LEVEL`]) are
    /// not applied, so accounts whose level was never reported stay
    /// eligible for unrestricted requests.
    pub fn levels(mut self, min_level: u16, max_level: u16) -> Self {
        self.min_level = (min_level > MIN_LEVEL).then_some(min_level);
        self.max_level = (max_level < MAX_LEVEL).then_some(max_level);
        self
    }

    pub fn modified_at_or_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.modified_at_or_before = Some(cutoff);
        self
    }

    pub fn matches(&self, account: &Account) -> bool {
        if !self.holder.matches(account.system_id.as_deref()) {
            return false;
        }
        if !self.health.matches(account) {
            return false;
        }
        if let Some(min) = self.min_level
            && account.level.is_none_or(|level| level < min)
        {
            return false;
        }
        if let Some(max) = self.max_level
            && account.level.is_none_or(|level| level > max)
        {
            return false;
        }
        if let Some(cutoff) = self.modified_at_or_before
            && account.last_modified > cutoff
        {
            return false;
        }
        true
    }
}
