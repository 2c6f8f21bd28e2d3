//! Voter registry
//!
//! Owns voter records and the set of codes ever issued. A code stays in
//! that set after its voter is deleted, so no code is ever handed out twice.
//! Code generation and insertion happen under one write lock; the table's
//! insert also refuses an issued code, so uniqueness holds at the storage
//! layer and not only in the generator loop.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use super::audit::{AuditAction, AuditEvent, AuditLog};
use super::codes::CodeGenerator;
use super::context::RequestContext;
use crate::types::{ActivityBucket, NewVoter, Voter, VoterCode, bucket_by_hour, percentage};
use crate::{Error, Result, storage_error, validation_error};

/// Outcome of registering one voter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredVoter {
    pub voter_id: Uuid,
    pub code: VoterCode,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterStats {
    pub total_voters: usize,
    pub voted_count: usize,
    pub pending_count: usize,
    pub turnout_percentage: f64,
}

/// Voter rows with their code index
#[derive(Debug, Default)]
pub(crate) struct VoterTable {
    voters: HashMap<Uuid, Voter>,
    by_code: HashMap<VoterCode, Uuid>,
    issued: HashSet<VoterCode>,
}

impl VoterTable {
    pub(crate) fn is_issued(&self, code: &VoterCode) -> bool {
        self.issued.contains(code)
    }

    /// Unique-code constraint: refuses any code ever issued
    pub(crate) fn insert(&mut self, voter: Voter) -> Result<()> {
        if self.issued.contains(&voter.code) {
            return Err(Error::conflict(format!(
                "voter code {} has already been issued",
                voter.code.redacted()
            )));
        }
        self.issued.insert(voter.code.clone());
        self.by_code.insert(voter.code.clone(), voter.id);
        self.voters.insert(voter.id, voter);
        Ok(())
    }

    pub(crate) fn get(&self, id: Uuid) -> Option<&Voter> {
        self.voters.get(&id)
    }

    pub(crate) fn find_by_code(&self, code: &VoterCode) -> Option<&Voter> {
        self.by_code.get(code).and_then(|id| self.voters.get(id))
    }

    pub(crate) fn find_by_code_mut(&mut self, code: &VoterCode) -> Option<&mut Voter> {
        let id = *self.by_code.get(code)?;
        self.voters.get_mut(&id)
    }

    fn remove(&mut self, id: Uuid) -> Option<Voter> {
        let voter = self.voters.remove(&id)?;
        self.by_code.remove(&voter.code);
        Some(voter)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Voter> {
        self.voters.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.voters.len()
    }
}

/// Shared voter registry
#[derive(Debug)]
pub struct VoterRegistry {
    table: RwLock<VoterTable>,
    codes: CodeGenerator,
    audit: Arc<AuditLog>,
}

impl VoterRegistry {
    pub fn new(codes: CodeGenerator, audit: Arc<AuditLog>) -> Self {
        Self {
            table: RwLock::new(VoterTable::default()),
            codes,
            audit,
        }
    }

    pub(crate) fn read_table(&self) -> Result<RwLockReadGuard<'_, VoterTable>> {
        self.table
            .read()
            .map_err(|_| storage_error!("Voter registry read error"))
    }

    pub(crate) fn write_table(&self) -> Result<RwLockWriteGuard<'_, VoterTable>> {
        self.table
            .write()
            .map_err(|_| storage_error!("Voter registry write error"))
    }

    pub fn code_generator(&self) -> &CodeGenerator {
        &self.codes
    }

    /// Register one voter under a freshly generated code
    pub fn register(&self, ctx: &RequestContext, fields: NewVoter) -> Result<RegisteredVoter> {
        ctx.require_admin("create voter")?;
        fields.validate()?;

        let mut table = self.write_table()?;
        let code = self.codes.generate_unique(|code| table.is_issued(code))?;
        self.insert_one(ctx, &mut table, fields, code)
    }

    /// Register one voter under an externally issued code
    pub fn register_with_code(
        &self,
        ctx: &RequestContext,
        fields: NewVoter,
        code: &str,
    ) -> Result<RegisteredVoter> {
        ctx.require_admin("create voter")?;
        fields.validate()?;
        let code = VoterCode::parse(code)?;

        let mut table = self.write_table()?;
        if table.is_issued(&code) {
            return Err(Error::conflict(format!(
                "voter code {} has already been issued",
                code.redacted()
            )));
        }
        self.insert_one(ctx, &mut table, fields, code)
    }

    fn insert_one(
        &self,
        ctx: &RequestContext,
        table: &mut VoterTable,
        fields: NewVoter,
        code: VoterCode,
    ) -> Result<RegisteredVoter> {
        let now = Utc::now();
        let voter = Voter::new(fields, code, now);
        let registered = RegisteredVoter {
            voter_id: voter.id,
            code: voter.code.clone(),
            name: voter.display_name(),
        };

        let mut audit = self.audit.write_log()?;
        let staged = audit.stage(vec![AuditEvent::new(
            AuditAction::CreateVoter,
            ctx.performed_by(),
            format!("Created voter: {} with code {}", registered.name, registered.code),
            now,
        )])?;
        table.insert(voter)?;
        audit.commit(staged);

        tracing::info!(
            voter_id = %registered.voter_id,
            code = %registered.code.redacted(),
            "voter registered"
        );
        Ok(registered)
    }

    /// Register a batch of voters, each under a fresh code
    ///
    /// Every entry is validated and every code allocated before anything is
    /// inserted, so the call either registers the whole batch or nothing.
    pub fn bulk_register(
        &self,
        ctx: &RequestContext,
        entries: Vec<NewVoter>,
    ) -> Result<Vec<RegisteredVoter>> {
        ctx.require_admin("bulk create voters")?;
        for (index, fields) in entries.iter().enumerate() {
            fields
                .validate()
                .map_err(|e| validation_error!("entry {}: {}", index + 1, e))?;
        }

        let mut table = self.write_table()?;
        let now = Utc::now();

        let mut batch_codes: HashSet<VoterCode> = HashSet::with_capacity(entries.len());
        let mut voters = Vec::with_capacity(entries.len());
        for fields in entries {
            let code = self
                .codes
                .generate_unique(|code| table.is_issued(code) || batch_codes.contains(code))?;
            batch_codes.insert(code.clone());
            voters.push(Voter::new(fields, code, now));
        }

        let registered: Vec<RegisteredVoter> = voters
            .iter()
            .map(|voter| RegisteredVoter {
                voter_id: voter.id,
                code: voter.code.clone(),
                name: voter.display_name(),
            })
            .collect();

        let mut audit = self.audit.write_log()?;
        let staged = audit.stage(vec![AuditEvent::new(
            AuditAction::BulkCreateVoters,
            ctx.performed_by(),
            format!("Created {} voters", registered.len()),
            now,
        )])?;
        for voter in voters {
            table.insert(voter)?;
        }
        audit.commit(staged);

        tracing::info!(count = registered.len(), "voters bulk registered");
        Ok(registered)
    }

    /// Exact-match lookup after normalizing the code
    pub fn lookup_by_code(&self, code: &str) -> Result<Option<Voter>> {
        let Some(code) = VoterCode::normalize(code) else {
            return Ok(None);
        };
        Ok(self.read_table()?.find_by_code(&code).cloned())
    }

    pub fn get(&self, ctx: &RequestContext, id: Uuid) -> Result<Voter> {
        ctx.require_admin("read voter")?;
        self.read_table()?
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("voter", id))
    }

    /// All voters, newest first
    pub fn list(&self, ctx: &RequestContext) -> Result<Vec<Voter>> {
        ctx.require_admin("list voters")?;
        let table = self.read_table()?;
        let mut voters: Vec<Voter> = table.iter().cloned().collect();
        voters.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(voters)
    }

    /// Delete a voter who has not voted yet
    pub fn remove(&self, ctx: &RequestContext, id: Uuid) -> Result<Voter> {
        ctx.require_admin("delete voter")?;
        let mut table = self.write_table()?;
        let voter = table.get(id).ok_or_else(|| Error::not_found("voter", id))?;
        if voter.has_voted() {
            return Err(Error::conflict("Cannot delete a voter who has already voted"));
        }

        let mut audit = self.audit.write_log()?;
        let staged = audit.stage(vec![AuditEvent::new(
            AuditAction::DeleteVoter,
            ctx.performed_by(),
            format!("Deleted voter: {} ({})", voter.display_name(), voter.code),
            Utc::now(),
        )])?;
        let removed = table
            .remove(id)
            .ok_or_else(|| Error::not_found("voter", id))?;
        audit.commit(staged);

        tracing::info!(voter_id = %id, "voter deleted");
        Ok(removed)
    }

    pub fn stats(&self, ctx: &RequestContext) -> Result<VoterStats> {
        ctx.require_admin("read voter statistics")?;
        let table = self.read_table()?;
        let total_voters = table.len();
        let voted_count = table.iter().filter(|voter| voter.has_voted()).count();
        Ok(VoterStats {
            total_voters,
            voted_count,
            pending_count: total_voters - voted_count,
            turnout_percentage: percentage(voted_count as u64, total_voters as u64),
        })
    }

    /// Ballots cast per hour, oldest first
    pub fn voting_activity(&self, ctx: &RequestContext) -> Result<Vec<ActivityBucket>> {
        ctx.require_admin("read voting activity")?;
        let table = self.read_table()?;
        Ok(bucket_by_hour(table.iter().filter_map(Voter::voted_at)))
    }
}
