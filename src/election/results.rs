//! Live standings
//!
//! Pure reads over the candidate tallies, plus a reconciliation of those
//! tallies against the vote ledger.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use super::candidates::CandidateRegistry;
use super::context::RequestContext;
use super::ledger::{LedgerEntry, VoteLedger};
use super::voters::VoterRegistry;
use crate::Result;
use crate::types::{Candidate, percentage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateStanding {
    pub id: Uuid,
    pub name: String,
    pub vote_count: u64,
    pub percentage: f64,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionResult {
    pub position: String,
    pub candidates: Vec<CandidateStanding>,
    pub total_votes: u64,
}

impl PositionResult {
    /// Leading candidate, if anyone has votes and nobody ties for first
    pub fn leader(&self) -> Option<&CandidateStanding> {
        let first = self.candidates.first().filter(|c| c.vote_count > 0)?;
        match self.candidates.get(1) {
            Some(second) if second.vote_count == first.vote_count => None,
            _ => Some(first),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedResults {
    pub votes: Vec<LedgerEntry>,
    pub candidates: Vec<Candidate>,
    pub total_voters: usize,
    pub voted_count: usize,
    pub turnout_percentage: f64,
}

/// A candidate whose tally disagrees with their ledger entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TallyMismatch {
    pub candidate_id: Uuid,
    pub tally: u64,
    pub ledger_entries: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub candidates_checked: usize,
    pub ledger_entries: usize,
    pub mismatches: Vec<TallyMismatch>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Read-only views over the registries
#[derive(Debug, Clone)]
pub struct ResultsAggregator {
    voters: Arc<VoterRegistry>,
    candidates: Arc<CandidateRegistry>,
    ledger: Arc<VoteLedger>,
}

impl ResultsAggregator {
    pub fn new(
        voters: Arc<VoterRegistry>,
        candidates: Arc<CandidateRegistry>,
        ledger: Arc<VoteLedger>,
    ) -> Self {
        Self {
            voters,
            candidates,
            ledger,
        }
    }

    /// Standings per position, positions in label order
    pub fn results(&self, ctx: &RequestContext) -> Result<Vec<PositionResult>> {
        ctx.require_admin("read results")?;
        let table = self.candidates.read_table()?;

        let mut by_position: BTreeMap<&str, Vec<&Candidate>> = BTreeMap::new();
        for candidate in table.iter() {
            by_position
                .entry(candidate.position.as_str())
                .or_default()
                .push(candidate);
        }

        Ok(by_position
            .into_iter()
            .map(|(position, mut candidates)| {
                candidates.sort_by(|a, b| {
                    b.vote_count
                        .cmp(&a.vote_count)
                        .then_with(|| a.full_name().cmp(&b.full_name()))
                });
                let total_votes: u64 = candidates.iter().map(|c| c.vote_count).sum();
                PositionResult {
                    position: position.to_string(),
                    candidates: candidates
                        .into_iter()
                        .map(|c| CandidateStanding {
                            id: c.id,
                            name: c.full_name(),
                            vote_count: c.vote_count,
                            percentage: percentage(c.vote_count, total_votes),
                            image_url: c.image_url.clone(),
                        })
                        .collect(),
                    total_votes,
                }
            })
            .collect())
    }

    /// Ledger, candidates and turnout in one snapshot
    pub fn detailed_results(&self, ctx: &RequestContext) -> Result<DetailedResults> {
        ctx.require_admin("read detailed results")?;
        let voters = self.voters.read_table()?;
        let candidates = self.candidates.read_table()?;
        let ledger = self.ledger.read_log()?;

        let total_voters = voters.len();
        let voted_count = voters.iter().filter(|v| v.has_voted()).count();
        let mut candidate_list: Vec<Candidate> = candidates.iter().cloned().collect();
        candidate_list.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(DetailedResults {
            votes: ledger.entries().iter().rev().cloned().collect(),
            candidates: candidate_list,
            total_voters,
            voted_count,
            turnout_percentage: percentage(voted_count as u64, total_voters as u64),
        })
    }

    /// Compare every tally with the number of ledger entries naming that
    /// candidate
    pub fn consistency_report(&self, ctx: &RequestContext) -> Result<ConsistencyReport> {
        ctx.require_admin("read consistency report")?;
        let candidates = self.candidates.read_table()?;
        let ledger = self.ledger.read_log()?;

        let mut counted: HashMap<Uuid, u64> = HashMap::new();
        for entry in ledger.entries() {
            *counted.entry(entry.record.candidate_id).or_default() += 1;
        }

        let mut mismatches: Vec<TallyMismatch> = candidates
            .iter()
            .filter_map(|candidate| {
                let ledger_entries = counted.remove(&candidate.id).unwrap_or(0);
                (ledger_entries != candidate.vote_count).then(|| TallyMismatch {
                    candidate_id: candidate.id,
                    tally: candidate.vote_count,
                    ledger_entries,
                })
            })
            .collect();
        // Ledger entries left over belong to candidates that no longer exist.
        mismatches.extend(counted.into_iter().map(|(candidate_id, ledger_entries)| {
            TallyMismatch {
                candidate_id,
                tally: 0,
                ledger_entries,
            }
        }));
        mismatches.sort_by_key(|m| m.candidate_id);

        if !mismatches.is_empty() {
            tracing::warn!(count = mismatches.len(), "tally and ledger disagree");
        }
        Ok(ConsistencyReport {
            candidates_checked: candidates.iter().count(),
            ledger_entries: ledger.len(),
            mismatches,
        })
    }
}
