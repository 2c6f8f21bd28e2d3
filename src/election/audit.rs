//! Append-only audit log
//!
//! Every successful state change across the registries lands here as one
//! categorized, hash-chained entry. Rejected attempts are never recorded.
//! Only the registries and the voting core append to it, each inside its
//! own transaction; admins read it through [`AuditLog::query`] and
//! [`AuditLog::stats`].

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::chain::{ChainVerification, Chained, ChainedLog};
use super::context::RequestContext;
use crate::types::{ActivityBucket, bucket_by_hour};
use crate::{Result, storage_error};

/// Coarse grouping used to filter the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditCategory {
    Voter,
    Candidate,
    Vote,
    System,
}

impl AuditCategory {
    pub const ALL: [AuditCategory; 4] = [
        AuditCategory::Voter,
        AuditCategory::Candidate,
        AuditCategory::Vote,
        AuditCategory::System,
    ];
}

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    CastVote,
    CreateVoter,
    BulkCreateVoters,
    DeleteVoter,
    CreateCandidate,
    UpdateCandidate,
    DeleteCandidate,
    CreateSetting,
    UpdateSetting,
    InitializeSettings,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CastVote => "CAST_VOTE",
            Self::CreateVoter => "CREATE_VOTER",
            Self::BulkCreateVoters => "BULK_CREATE_VOTERS",
            Self::DeleteVoter => "DELETE_VOTER",
            Self::CreateCandidate => "CREATE_CANDIDATE",
            Self::UpdateCandidate => "UPDATE_CANDIDATE",
            Self::DeleteCandidate => "DELETE_CANDIDATE",
            Self::CreateSetting => "CREATE_SETTING",
            Self::UpdateSetting => "UPDATE_SETTING",
            Self::InitializeSettings => "INITIALIZE_SETTINGS",
        }
    }

    /// Category an action is filed under
    pub fn category(&self) -> AuditCategory {
        match self {
            Self::CastVote => AuditCategory::Vote,
            Self::CreateVoter | Self::BulkCreateVoters | Self::DeleteVoter => AuditCategory::Voter,
            Self::CreateCandidate | Self::UpdateCandidate | Self::DeleteCandidate => {
                AuditCategory::Candidate
            }
            Self::CreateSetting | Self::UpdateSetting | Self::InitializeSettings => {
                AuditCategory::System
            }
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of one audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub action: AuditAction,
    pub performed_by: String,
    pub details: String,
    pub timestamp: DateTime<Utc>,
    pub category: AuditCategory,
}

impl AuditEvent {
    pub fn new(
        action: AuditAction,
        performed_by: impl Into<String>,
        details: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            action,
            performed_by: performed_by.into(),
            details: details.into(),
            timestamp,
            category: action.category(),
        }
    }
}

/// An audit event with its chain link
pub type AuditEntry = Chained<AuditEvent>;

/// Filter for reading the log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditQuery {
    pub category: Option<AuditCategory>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: AuditCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Restrict to `[from, to]`, both ends inclusive
    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, event: &AuditEvent) -> bool {
        self.category.is_none_or(|c| c == event.category)
            && self.from.is_none_or(|from| event.timestamp >= from)
            && self.to.is_none_or(|to| event.timestamp <= to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: AuditCategory,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStats {
    pub total_logs: usize,
    pub by_category: Vec<CategoryCount>,
    /// Hourly counts over the 24 hours before the stats were taken
    pub recent_activity: Vec<ActivityBucket>,
}

/// Shared audit log
#[derive(Debug, Default)]
pub struct AuditLog {
    log: RwLock<ChainedLog<AuditEvent>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn read_log(&self) -> Result<RwLockReadGuard<'_, ChainedLog<AuditEvent>>> {
        self.log
            .read()
            .map_err(|_| storage_error!("Audit log read error"))
    }

    pub(crate) fn write_log(&self) -> Result<RwLockWriteGuard<'_, ChainedLog<AuditEvent>>> {
        self.log
            .write()
            .map_err(|_| storage_error!("Audit log write error"))
    }

    /// Append one event outside any registry transaction
    #[cfg(test)]
    pub(crate) fn record(&self, event: AuditEvent) -> Result<AuditEntry> {
        let mut log = self.write_log()?;
        let entry = log.append(event)?.clone();
        tracing::debug!(
            action = %entry.record.action,
            sequence = entry.link.sequence,
            "audit entry appended"
        );
        Ok(entry)
    }

    /// Entries matching `query`, newest first
    pub fn query(&self, ctx: &RequestContext, query: &AuditQuery) -> Result<Vec<AuditEntry>> {
        ctx.require_admin("read audit log")?;
        let log = self.read_log()?;
        let matching = log
            .entries()
            .iter()
            .rev()
            .filter(|entry| query.matches(&entry.record))
            .cloned();
        Ok(match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    pub fn stats(&self, ctx: &RequestContext) -> Result<AuditStats> {
        ctx.require_admin("read audit statistics")?;
        let log = self.read_log()?;
        let entries = log.entries();

        let by_category = AuditCategory::ALL
            .iter()
            .map(|&category| CategoryCount {
                category,
                count: entries
                    .iter()
                    .filter(|entry| entry.record.category == category)
                    .count(),
            })
            .collect();

        let since = Utc::now() - TimeDelta::hours(24);
        let recent_activity = bucket_by_hour(
            entries
                .iter()
                .map(|entry| entry.record.timestamp)
                .filter(|timestamp| *timestamp >= since),
        );

        Ok(AuditStats {
            total_logs: entries.len(),
            by_category,
            recent_activity,
        })
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read_log()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Re-hash the whole log
    pub fn verify_chain(&self) -> Result<ChainVerification> {
        self.read_log()?.verify()
    }
}
