//! Bulk import of accounts into the pool

use serde::{Deserialize, Serialize};
use tracing::info;

use leasepool_core::{Account, AccountCondition, AuthService, Clock, MAX_LEVEL, MIN_LEVEL};
use leasepool_storage::AccountStore;

use crate::error::{PoolError, PoolResult};

/// Credentials of an account to import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedAccount {
    #[serde(default)]
    pub auth_service: AuthService,
    pub username: String,
    pub password: String,
}

impl SeedAccount {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            auth_service: AuthService::default(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn with_auth_service(mut self, auth_service: AuthService) -> Self {
        self.auth_service = auth_service;
        self
    }
}

/// State forced onto newly imported accounts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct SeedOptions {
    /// Level of new accounts; required when `condition` is not `unknown`
    #[serde(default)]
    pub level: Option<u16>,
    #[serde(default)]
    pub condition: AccountCondition,
}

impl SeedOptions {
    pub fn with_level(mut self, level: u16) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_condition(mut self, condition: AccountCondition) -> Self {
        self.condition = condition;
        self
    }

    fn validate(&self) -> PoolResult<()> {
        if let Some(level) = self.level
            && !(MIN_LEVEL..=MAX_LEVEL).contains(&level)
        {
            return Err(PoolError::InvalidInput(format!(
                "level {level} outside {MIN_LEVEL}..={MAX_LEVEL}"
            )));
        }
        if self.condition != AccountCondition::Unknown && self.level.is_none() {
            return Err(PoolError::InvalidInput(format!(
                "condition '{}' requires a level",
                self.condition
            )));
        }
        Ok(())
    }
}

/// Outcome of an import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    /// Accounts created
    pub imported: usize,
    /// Accounts that already existed and were left untouched
    pub skipped: usize,
}

/// Create every missing account; existing ones are never overwritten
pub fn seed_accounts(
    store: &dyn AccountStore,
    clock: &dyn Clock,
    accounts: Vec<SeedAccount>,
    options: SeedOptions,
) -> PoolResult<SeedReport> {
    options.validate()?;
    if accounts.iter().any(|seed| seed.username.is_empty()) {
        return Err(PoolError::InvalidInput("username must not be empty".into()));
    }

    let now = clock.now_utc();
    let mut report = SeedReport::default();
    for seed in accounts {
        let mut account =
            Account::new(seed.username, now).with_credentials(seed.auth_service, seed.password);
        account.level = options.level;
        options.condition.apply_to(&mut account);

        if store.insert_if_absent(account)? {
            report.imported += 1;
        } else {
            report.skipped += 1;
        }
    }

    info!(
        imported = report.imported,
        skipped = report.skipped,
        condition = %options.condition,
        "Seeded accounts"
    );
    Ok(report)
}
