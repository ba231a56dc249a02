//! Lease requests and the records handed out to leasing systems

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::account::{Account, AuthService};
use crate::filter::{AccountFilter, HealthFilter, HolderFilter, MAX_LEVEL, MIN_LEVEL};

fn default_count() -> usize {
    1
}

fn default_min_level() -> u16 {
    MIN_LEVEL
}

fn default_max_level() -> u16 {
    MAX_LEVEL
}

/// Query-string flag: `true`/`false` in any letter case, or `1`/`0`
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    struct FlagVisitor;

    impl Visitor<'_> for FlagVisitor {
        type Value = bool;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a boolean, `1` or `0`")
        }

        fn visit_bool<E: de::Error>(self, value: bool) -> Result<bool, E> {
            Ok(value)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<bool, E> {
            match value {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(E::invalid_value(de::Unexpected::Unsigned(value), &self)),
            }
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<bool, E> {
            if value.eq_ignore_ascii_case("true") || value == "1" {
                Ok(true)
            } else if value.eq_ignore_ascii_case("false") || value == "0" {
                Ok(false)
            } else {
                Err(E::invalid_value(de::Unexpected::Str(value), &self))
            }
        }
    }

    deserializer.deserialize_any(FlagVisitor)
}

/// Parameters of a lease request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRequest {
    /// Identifier of the requesting system; becomes the accounts' `system_id`
    pub system_id: String,
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default = "default_min_level")]
    pub min_level: u16,
    #[serde(default = "default_max_level")]
    pub max_level: u16,
    /// Renew accounts this system already holds before taking new ones
    #[serde(default, deserialize_with = "flag")]
    pub reuse: bool,
    /// Ask for banned, shadowbanned or unchecked accounts instead of
    /// healthy ones. Disables `reuse`.
    #[serde(default, deserialize_with = "flag")]
    pub want_unhealthy: bool,
}

impl LeaseRequest {
    pub fn new(system_id: impl Into<String>, count: usize) -> Self {
        Self {
            system_id: system_id.into(),
            count,
            min_level: MIN_LEVEL,
            max_level: MAX_LEVEL,
            reuse: false,
            want_unhealthy: false,
        }
    }

    pub fn with_levels(mut self, min_level: u16, max_level: u16) -> Self {
        self.min_level = min_level;
        self.max_level = max_level;
        self
    }

    pub fn with_reuse(mut self, reuse: bool) -> Self {
        self.reuse = reuse;
        self
    }

    pub fn with_unhealthy(mut self, want_unhealthy: bool) -> Self {
        self.want_unhealthy = want_unhealthy;
        self
    }

    /// Filters to search, in order: the requester's own leases (when
    /// renewing), then unleased accounts
    pub fn search_order(&self) -> Vec<AccountFilter> {
        let health = if self.want_unhealthy {
            HealthFilter::Unhealthy
        } else {
            HealthFilter::Healthy
        };
        let base = AccountFilter::all()
            .health(health)
            .levels(self.min_level, self.max_level);

        let mut filters = Vec::with_capacity(2);
        if self.reuse && !self.want_unhealthy {
            filters.push(
                base.clone()
                    .holder(HolderFilter::LeasedTo(self.system_id.clone())),
            );
        }
        filters.push(base.holder(HolderFilter::Unleased));
        filters
    }
}

/// The part of an account a leasing system gets to see
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub auth_service: AuthService,
    pub username: String,
    pub password: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub level: Option<u16>,
    pub rareless_scans: Option<i64>,
    pub shadowbanned: Option<bool>,
    pub last_modified: DateTime<Utc>,
}

impl From<&Account> for LeaseRecord {
    fn from(account: &Account) -> Self {
        Self {
            auth_service: account.auth_service,
            username: account.username.clone(),
            password: account.password.clone(),
            latitude: account.latitude,
            longitude: account.longitude,
            level: account.level,
            rareless_scans: account.rareless_scans,
            shadowbanned: account.shadowbanned,
            last_modified: account.last_modified,
        }
    }
}
