//! Account records
//!
//! An [`Account`] is a reusable worker identity held in the pool. Its
//! `system_id` records which client system currently leases it; `None`
//! means the account is available.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Authentication provider an account logs in with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthService {
    /// Trainer club login (default)
    #[default]
    Ptc,
    /// Google login
    Google,
}

impl AuthService {
    /// Wire name of the provider
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthService::Ptc => "ptc",
            AuthService::Google => "google",
        }
    }
}

impl fmt::Display for AuthService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthService {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ptc" => Ok(AuthService::Ptc),
            "google" => Ok(AuthService::Google),
            other => Err(ParseError::AuthService(other.to_string())),
        }
    }
}

/// A pooled account
///
/// Health flags are tri-state: `None` means the flag has never been
/// reported. Everything below the health block is telemetry reported by
/// the leasing systems; only `level` is interpreted by the pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique, immutable account name
    pub username: String,
    pub auth_service: AuthService,
    pub password: Option<String>,
    pub email: Option<String>,
    /// Refreshed on every assignment, update and release
    pub last_modified: DateTime<Utc>,
    /// Lease holder, `None` when available
    pub system_id: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    // Player stats
    pub level: Option<u16>,
    pub xp: Option<i64>,
    pub encounters: Option<i64>,
    pub balls_thrown: Option<i64>,
    pub captures: Option<i64>,
    pub spins: Option<i64>,
    pub walked: Option<f64>,

    // Inbox
    pub team: Option<String>,
    pub coins: Option<i64>,
    pub stardust: Option<i64>,

    // Health
    pub warn: Option<bool>,
    pub banned: Option<bool>,
    pub ban_flag: Option<bool>,
    pub captcha: Option<bool>,
    pub shadowbanned: Option<bool>,
    /// Comma-separated list of completed tutorial steps
    pub tutorial_state: Option<String>,
    pub rareless_scans: Option<i64>,

    // Inventory
    pub balls: Option<i64>,
    pub total_items: Option<i64>,
    pub pokemon: Option<i64>,
    pub eggs: Option<i64>,
    pub incubators: Option<i64>,
}

impl Account {
    /// Create a fresh, unleased account with every optional field unknown
    pub fn new(username: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            username: username.into(),
            auth_service: AuthService::default(),
            password: None,
            email: None,
            last_modified: now,
            system_id: None,
            latitude: None,
            longitude: None,
            level: None,
            xp: None,
            encounters: None,
            balls_thrown: None,
            captures: None,
            spins: None,
            walked: None,
            team: None,
            coins: None,
            stardust: None,
            warn: None,
            banned: None,
            ban_flag: None,
            captcha: None,
            shadowbanned: None,
            tutorial_state: None,
            rareless_scans: None,
            balls: None,
            total_items: None,
            pokemon: None,
            eggs: None,
            incubators: None,
        }
    }

    /// Set credentials
    pub fn with_credentials(mut self, auth_service: AuthService, password: impl Into<String>) -> Self {
        self.auth_service = auth_service;
        self.password = Some(password.into());
        self
    }

    /// Set the trainer level
    pub fn with_level(mut self, level: u16) -> Self {
        self.level = Some(level);
        self
    }

    /// Lease the account to a system
    pub fn with_system_id(mut self, system_id: impl Into<String>) -> Self {
        self.system_id = Some(system_id.into());
        self
    }

    /// Whether the account is currently leased
    pub fn is_leased(&self) -> bool {
        self.system_id.is_some()
    }

    /// Neither banned nor shadowbanned (unknown counts as healthy)
    pub fn is_healthy(&self) -> bool {
        self.banned != Some(true) && self.shadowbanned != Some(true)
    }

    /// No ban state has ever been reported for this account
    pub fn is_health_unknown(&self) -> bool {
        self.banned.is_none() && self.shadowbanned.is_none()
    }
}

/// Health condition forced onto newly seeded accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountCondition {
    /// Leave every health flag unknown
    #[default]
    Unknown,
    Good,
    Banned,
    /// Shadowbanned only
    Blind,
    Captcha,
}

impl AccountCondition {
    /// Overwrite the health flags of `account` to match this condition
    ///
    /// `Unknown` leaves the account untouched.
    pub fn apply_to(&self, account: &mut Account) {
        let (banned, shadowbanned, captcha) = match self {
            AccountCondition::Unknown => return,
            AccountCondition::Good => (false, false, false),
            AccountCondition::Banned => (true, false, false),
            AccountCondition::Blind => (false, true, false),
            AccountCondition::Captcha => (false, false, true),
        };
        account.ban_flag = Some(false);
        account.banned = Some(banned);
        account.shadowbanned = Some(shadowbanned);
        account.captcha = Some(captcha);
    }
}

impl fmt::Display for AccountCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccountCondition::Unknown => "unknown",
            AccountCondition::Good => "good",
            AccountCondition::Banned => "banned",
            AccountCondition::Blind => "blind",
            AccountCondition::Captcha => "captcha",
        };
        f.write_str(name)
    }
}

impl FromStr for AccountCondition {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unknown" => Ok(AccountCondition::Unknown),
            "good" => Ok(AccountCondition::Good),
            "banned" => Ok(AccountCondition::Banned),
            "blind" => Ok(AccountCondition::Blind),
            "captcha" => Ok(AccountCondition::Captcha),
            other => Err(ParseError::Condition(other.to_string())),
        }
    }
}
