//! Vote ledger
//!
//! One hash-chained entry per accepted ballot line, carrying the candidate
//! and voter names as they were at submission time. Only the voting core
//! appends; nothing edits or removes entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use super::chain::{ChainVerification, Chained, ChainedLog};
use super::context::RequestContext;
use crate::types::VoterCode;
use crate::{Result, storage_error};

/// One accepted ballot line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub voter_code: VoterCode,
    pub candidate_id: Uuid,
    pub candidate_name: String,
    pub position: String,
    pub timestamp: DateTime<Utc>,
    pub voter_name: String,
}

/// A vote with its chain link
pub type LedgerEntry = Chained<Vote>;

/// Shared vote ledger
#[derive(Debug, Default)]
pub struct VoteLedger {
    log: RwLock<ChainedLog<Vote>>,
}

impl VoteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn read_log(&self) -> Result<RwLockReadGuard<'_, ChainedLog<Vote>>> {
        self.log
            .read()
            .map_err(|_| storage_error!("Vote ledger read error"))
    }

    pub(crate) fn write_log(&self) -> Result<RwLockWriteGuard<'_, ChainedLog<Vote>>> {
        self.log
            .write()
            .map_err(|_| storage_error!("Vote ledger write error"))
    }

    /// Every entry, newest first
    pub fn list(&self, ctx: &RequestContext) -> Result<Vec<LedgerEntry>> {
        ctx.require_admin("read vote ledger")?;
        self.filtered(|_| true)
    }

    pub fn by_position(&self, ctx: &RequestContext, position: &str) -> Result<Vec<LedgerEntry>> {
        ctx.require_admin("read vote ledger")?;
        self.filtered(|vote| vote.position == position)
    }

    pub fn by_candidate(&self, ctx: &RequestContext, candidate_id: Uuid) -> Result<Vec<LedgerEntry>> {
        ctx.require_admin("read vote ledger")?;
        self.filtered(|vote| vote.candidate_id == candidate_id)
    }

    pub fn by_voter(&self, ctx: &RequestContext, code: &VoterCode) -> Result<Vec<LedgerEntry>> {
        ctx.require_admin("read vote ledger")?;
        self.filtered(|vote| &vote.voter_code == code)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read_log()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Re-hash the whole ledger
    pub fn verify_chain(&self) -> Result<ChainVerification> {
        self.read_log()?.verify()
    }

    fn filtered(&self, keep: impl Fn(&Vote) -> bool) -> Result<Vec<LedgerEntry>> {
        let log = self.read_log()?;
        Ok(log
            .entries()
            .iter()
            .rev()
            .filter(|entry| keep(&entry.record))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(code: &str, candidate_id: Uuid, position: &str) -> Vote {
        Vote {
            voter_code: VoterCode::parse(code).unwrap(),
            candidate_id,
            candidate_name: "Ada Obi".to_string(),
            position: position.to_string(),
            timestamp: Utc::now(),
            voter_name: "Kofi Mensah".to_string(),
        }
    }

    #[test]
    fn test_filters() {
        let ledger = VoteLedger::new();
        let admin = RequestContext::admin("admin", true);
        let president = Uuid::new_v4();
        let secretary = Uuid::new_v4();
        {
            let mut log = ledger.write_log().unwrap();
            log.append(vote("AAAA2222", president, "President")).unwrap();
            log.append(vote("AAAA2222", secretary, "Secretary")).unwrap();
            log.append(vote("BBBB3333", president, "President")).unwrap();
        }

        assert_eq!(ledger.len().unwrap(), 3);
        assert_eq!(ledger.by_position(&admin, "President").unwrap().len(), 2);
        assert_eq!(ledger.by_candidate(&admin, secretary).unwrap().len(), 1);

        let code = VoterCode::parse("aaaa2222").unwrap();
        assert_eq!(ledger.by_voter(&admin, &code).unwrap().len(), 2);

        let all = ledger.list(&admin).unwrap();
        assert_eq!(all[0].link.sequence, 3);
        assert!(ledger.verify_chain().unwrap().is_intact());
    }

    #[test]
    fn test_reads_require_admin() {
        let ledger = VoteLedger::new();
        assert!(ledger.list(&RequestContext::admin("admin", false)).is_err());
    }
}
