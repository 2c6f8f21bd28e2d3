//! Settings store
//!
//! A small key-value table with typed values. Three well-known keys gate and
//! label the election; their value kind is fixed, other keys accept any kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::audit::{AuditAction, AuditEvent, AuditLog};
use super::context::RequestContext;
use crate::config::ElectionConfig;
use crate::{Error, Result, storage_error, validation_error};

/// Whether ballots are accepted; absent means closed
pub const VOTING_ENABLED: &str = "votingEnabled";
pub const ELECTION_TITLE: &str = "electionTitle";
pub const MAX_CANDIDATES_PER_POSITION: &str = "maxCandidatesPerPosition";

/// A typed setting value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Integer(i64),
    Text(String),
}

/// Kind of a setting value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Bool,
    Integer,
    Text,
}

impl SettingValue {
    pub fn kind(&self) -> SettingKind {
        match self {
            Self::Bool(_) => SettingKind::Bool,
            Self::Integer(_) => SettingKind::Integer,
            Self::Text(_) => SettingKind::Text,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value:?}"),
        }
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Value kind required for a well-known key
pub fn expected_kind(key: &str) -> Option<SettingKind> {
    match key {
        VOTING_ENABLED => Some(SettingKind::Bool),
        ELECTION_TITLE => Some(SettingKind::Text),
        MAX_CANDIDATES_PER_POSITION => Some(SettingKind::Integer),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    pub key: String,
    pub value: SettingValue,
    pub updated_at: DateTime<Utc>,
}

/// Setting rows keyed by name
#[derive(Debug, Default)]
pub(crate) struct SettingsTable {
    rows: HashMap<String, Setting>,
}

impl SettingsTable {
    pub(crate) fn get(&self, key: &str) -> Option<&Setting> {
        self.rows.get(key)
    }

    /// `votingEnabled`, treating a missing or non-boolean row as closed
    pub(crate) fn voting_enabled(&self) -> bool {
        self.get(VOTING_ENABLED)
            .and_then(|setting| setting.value.as_bool())
            .unwrap_or(false)
    }

    pub(crate) fn max_candidates_per_position(&self) -> Option<i64> {
        self.get(MAX_CANDIDATES_PER_POSITION)
            .and_then(|setting| setting.value.as_integer())
    }
}

/// Shared settings store
#[derive(Debug)]
pub struct SettingsStore {
    table: RwLock<SettingsTable>,
    defaults: Vec<(&'static str, SettingValue)>,
    audit: Arc<AuditLog>,
}

impl SettingsStore {
    pub fn new(config: &ElectionConfig, audit: Arc<AuditLog>) -> Self {
        let defaults = vec![
            (VOTING_ENABLED, SettingValue::Bool(false)),
            (
                ELECTION_TITLE,
                SettingValue::Text(config.default_election_title.clone()),
            ),
            (
                MAX_CANDIDATES_PER_POSITION,
                SettingValue::Integer(config.default_max_candidates_per_position),
            ),
        ];
        Self {
            table: RwLock::new(SettingsTable::default()),
            defaults,
            audit,
        }
    }

    pub(crate) fn read_table(&self) -> Result<RwLockReadGuard<'_, SettingsTable>> {
        self.table
            .read()
            .map_err(|_| storage_error!("Settings read error"))
    }

    fn write_table(&self) -> Result<RwLockWriteGuard<'_, SettingsTable>> {
        self.table
            .write()
            .map_err(|_| storage_error!("Settings write error"))
    }

    /// Seed default values for absent well-known keys
    ///
    /// Safe to call on every startup; returns the keys that were seeded.
    pub fn initialize(&self) -> Result<Vec<&'static str>> {
        let mut table = self.write_table()?;
        let now = Utc::now();

        let missing: Vec<_> = self
            .defaults
            .iter()
            .filter(|(key, _)| table.get(key).is_none())
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(Vec::new());
        }

        let seeded: Vec<&'static str> = missing.iter().map(|(key, _)| *key).collect();
        let details = format!("Seeded default settings: {}", seeded.join(", "));
        {
            let mut audit = self.audit.write_log()?;
            let staged = audit.stage(vec![AuditEvent::new(
                AuditAction::InitializeSettings,
                "system",
                details,
                now,
            )])?;
            for (key, value) in missing {
                table.rows.insert(
                    key.to_string(),
                    Setting {
                        key: key.to_string(),
                        value,
                        updated_at: now,
                    },
                );
            }
            audit.commit(staged);
        }

        tracing::info!(keys = ?seeded, "default settings seeded");
        Ok(seeded)
    }

    pub fn get(&self, key: &str) -> Result<Option<Setting>> {
        Ok(self.read_table()?.get(key).cloned())
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        Ok(self.get(key)?.and_then(|s| s.value.as_bool()))
    }

    pub fn get_integer(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.get(key)?.and_then(|s| s.value.as_integer()))
    }

    pub fn get_text(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .get(key)?
            .and_then(|s| s.value.as_text().map(str::to_string)))
    }

    pub fn voting_enabled(&self) -> Result<bool> {
        Ok(self.read_table()?.voting_enabled())
    }

    pub fn election_title(&self) -> Result<Option<String>> {
        self.get_text(ELECTION_TITLE)
    }

    /// All settings ordered by key
    pub fn list(&self) -> Result<Vec<Setting>> {
        let table = self.read_table()?;
        let mut settings: Vec<Setting> = table.rows.values().cloned().collect();
        settings.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(settings)
    }

    /// Create or overwrite a setting
    pub fn set(
        &self,
        ctx: &RequestContext,
        key: &str,
        value: impl Into<SettingValue>,
    ) -> Result<Setting> {
        ctx.require_admin("update setting")?;
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::validation("key"));
        }
        let value = value.into();
        if let Some(kind) = expected_kind(key) {
            if value.kind() != kind {
                return Err(validation_error!("{} expects a {:?} value", key, kind));
            }
        }
        if key == MAX_CANDIDATES_PER_POSITION && value.as_integer().is_some_and(|max| max < 1) {
            return Err(validation_error!("{} must be at least 1", key));
        }

        let mut table = self.write_table()?;
        let now = Utc::now();
        let action = if table.get(key).is_some() {
            AuditAction::UpdateSetting
        } else {
            AuditAction::CreateSetting
        };
        let verb = match action {
            AuditAction::CreateSetting => "Created",
            _ => "Updated",
        };
        let details = format!("{verb} setting: {key} = {value}");

        let setting = Setting {
            key: key.to_string(),
            value,
            updated_at: now,
        };
        {
            let mut audit = self.audit.write_log()?;
            let staged = audit.stage(vec![AuditEvent::new(
                action,
                ctx.performed_by(),
                details,
                now,
            )])?;
            table.rows.insert(setting.key.clone(), setting.clone());
            audit.commit(staged);
        }

        tracing::info!(key = %setting.key, value = %setting.value, "setting written");
        Ok(setting)
    }
}
