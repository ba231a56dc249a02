//! Sparse account updates
//!
//! Leasing systems report account state as loosely shaped JSON objects
//! keyed by `username`. [`UpdatePatch`] splits such an object into record
//! fields and metadata (keys starting with [`METADATA_PREFIX`], which
//! annotate the update but are never stored). The record fields are only
//! turned into typed [`AccountChanges`] when the patch is applied.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::account::{Account, AuthService};
use crate::error::PatchError;

/// Keys starting with this prefix are metadata
pub const METADATA_PREFIX: char = '_';

/// Metadata key carrying the reason of a release
pub const REASON_KEY: &str = "_reason";

/// A validated, not yet applied update for one account
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePatch {
    username: String,
    fields: Map<String, Value>,
    metadata: Map<String, Value>,
}

impl UpdatePatch {
    /// Split a raw JSON patch into record fields and metadata
    pub fn from_value(value: Value) -> Result<Self, PatchError> {
        let Value::Object(object) = value else {
            return Err(PatchError::NotAnObject);
        };

        let mut username = None;
        let mut fields = Map::new();
        let mut metadata = Map::new();

        for (key, value) in object {
            if key == "username" {
                username = value.as_str().map(str::to_owned);
            } else if key.starts_with(METADATA_PREFIX) {
                metadata.insert(key, value);
            } else {
                fields.insert(key, value);
            }
        }

        match username {
            Some(username) if !username.is_empty() => Ok(Self {
                username,
                fields,
                metadata,
            }),
            _ => Err(PatchError::MissingUsername),
        }
    }

    /// A patch that clears the lease holder
    pub fn release(username: impl Into<String>, reason: Option<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("system_id".to_string(), Value::Null);

        let mut metadata = Map::new();
        if let Some(reason) = reason {
            metadata.insert(REASON_KEY.to_string(), Value::String(reason));
        }

        Self {
            username: username.into(),
            fields,
            metadata,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Record fields, excluding `username` and metadata
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Release reason, if the submitter gave one
    pub fn reason(&self) -> Option<&str> {
        self.metadata.get(REASON_KEY).and_then(Value::as_str)
    }

    /// Interpret the record fields against the account schema
    pub fn changes(&self) -> Result<AccountChanges, PatchError> {
        serde_json::from_value(Value::Object(self.fields.clone()))
            .map_err(|e| PatchError::InvalidField(e.to_string()))
    }

    /// Reassemble the full payload, e.g. for logging a dropped patch
    pub fn to_value(&self) -> Value {
        let mut object = Map::with_capacity(1 + self.fields.len() + self.metadata.len());
        object.insert("username".to_string(), Value::String(self.username.clone()));
        object.extend(self.fields.clone());
        object.extend(self.metadata.clone());
        Value::Object(object)
    }
}

/// A request to give an account back to the pool
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseRequest {
    pub username: String,
    #[serde(default)]
    pub reason: Option<String>,
}

impl ReleaseRequest {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl From<ReleaseRequest> for UpdatePatch {
    fn from(request: ReleaseRequest) -> Self {
        UpdatePatch::release(request.username, request.reason)
    }
}

/// Present-but-null must be distinguishable from absent: the outer `Option`
/// tracks presence, the inner one the value.
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Fields that may not be cleared: present means a concrete value.
fn required<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Typed view of a patch
///
/// Every field is `None` when the key was absent from the patch. For
/// nullable record fields, `Some(None)` is an explicit `null`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountChanges {
    #[serde(default, deserialize_with = "required")]
    pub auth_service: Option<AuthService>,
    #[serde(default, deserialize_with = "nullable")]
    pub password: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub system_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub latitude: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub longitude: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub level: Option<Option<u16>>,
    #[serde(default, deserialize_with = "nullable")]
    pub xp: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub encounters: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub balls_thrown: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub captures: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub spins: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub walked: Option<Option<f64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub team: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub coins: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub stardust: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub warn: Option<Option<bool>>,
    #[serde(default, deserialize_with = "nullable")]
    pub banned: Option<Option<bool>>,
    #[serde(default, deserialize_with = "nullable")]
    pub ban_flag: Option<Option<bool>>,
    #[serde(default, deserialize_with = "nullable")]
    pub captcha: Option<Option<bool>>,
    #[serde(default, deserialize_with = "nullable")]
    pub shadowbanned: Option<Option<bool>>,
    #[serde(default, deserialize_with = "nullable")]
    pub tutorial_state: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub rareless_scans: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub balls: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub total_items: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub pokemon: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub eggs: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub incubators: Option<Option<i64>>,
}

macro_rules! merge_present {
    ($changes:expr, $account:expr; $($field:ident),* $(,)?) => {
        $(
            if let Some(value) = &$changes.$field {
                $account.$field = value.clone();
            }
        )*
    };
}

impl AccountChanges {
    /// Overwrite every field present in the patch
    ///
    /// `username` and `last_modified` are never touched here.
    pub fn apply_to(&self, account: &mut Account) {
        if let Some(auth_service) = self.auth_service {
            account.auth_service = auth_service;
        }
        merge_present!(self, account;
            password, email, system_id, latitude, longitude,
            level, xp, encounters, balls_thrown, captures, spins, walked,
            team, coins, stardust,
            warn, banned, ban_flag, captcha, shadowbanned, tutorial_state, rareless_scans,
            balls, total_items, pokemon, eggs, incubators,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_split_metadata() {
        let patch = UpdatePatch::from_value(json!({
            "username": "a1",
            "level": 12,
            "_reason": "captcha loop",
            "_source": "scout-3",
        }))
        .unwrap();

        assert_eq!(patch.username(), "a1");
        assert_eq!(patch.fields().len(), 1);
        assert_eq!(patch.metadata().len(), 2);
        assert_eq!(patch.reason(), Some("captcha loop"));
    }

    #[test]
    fn test_rejects_missing_username() {
        assert_eq!(
            UpdatePatch::from_value(json!({"level": 3})),
            Err(PatchError::MissingUsername)
        );
        assert_eq!(
            UpdatePatch::from_value(json!({"username": ""})),
            Err(PatchError::MissingUsername)
        );
        assert_eq!(
            UpdatePatch::from_value(json!({"username": 7})),
            Err(PatchError::MissingUsername)
        );
        assert_eq!(UpdatePatch::from_value(json!([1, 2])), Err(PatchError::NotAnObject));
    }

    #[test]
    fn test_absent_null_and_value_are_distinct() {
        let patch = UpdatePatch::from_value(json!({
            "username": "a1",
            "system_id": null,
            "level": 20,
        }))
        .unwrap();
        let changes = patch.changes().unwrap();

        assert_eq!(changes.system_id, Some(None));
        assert_eq!(changes.level, Some(Some(20)));
        assert_eq!(changes.banned, None);
    }

    #[test]
    fn test_unknown_field_is_invalid() {
        let patch = UpdatePatch::from_value(json!({"username": "a1", "favourite_colour": "red"})).unwrap();
        assert!(matches!(patch.changes(), Err(PatchError::InvalidField(_))));
    }

    #[test]
    fn test_wrong_type_is_invalid() {
        let patch = UpdatePatch::from_value(json!({"username": "a1", "level": "thirty"})).unwrap();
        assert!(matches!(patch.changes(), Err(PatchError::InvalidField(_))));

        let patch = UpdatePatch::from_value(json!({"username": "a1", "auth_service": null})).unwrap();
        assert!(matches!(patch.changes(), Err(PatchError::InvalidField(_))));
    }

    #[test]
    fn test_apply_merges_only_present_fields() {
        let mut account = Account::new("a1", Utc::now())
            .with_level(10)
            .with_system_id("sysA");
        account.banned = Some(false);

        let patch = UpdatePatch::from_value(json!({
            "username": "a1",
            "banned": true,
            "system_id": null,
            "auth_service": "google",
        }))
        .unwrap();
        patch.changes().unwrap().apply_to(&mut account);

        assert_eq!(account.banned, Some(true));
        assert_eq!(account.system_id, None);
        assert_eq!(account.auth_service, AuthService::Google);
        assert_eq!(account.level, Some(10));
    }

    #[test]
    fn test_release_patch() {
        let patch: UpdatePatch = ReleaseRequest::new("a1").with_reason("done").into();
        assert_eq!(patch.reason(), Some("done"));
        assert_eq!(patch.changes().unwrap().system_id, Some(None));

        let value = patch.to_value();
        assert_eq!(value["username"], "a1");
        assert_eq!(value["system_id"], Value::Null);
        assert_eq!(value[REASON_KEY], "done");
    }
}
