//! Ballot submission
//!
//! A ballot is accepted or rejected as a whole. The service takes every
//! lock the transaction touches up front, in the crate-wide order
//! (settings, voters, candidates, ledger, audit), and keeps them until it
//! returns. Inside that critical section:
//!
//! 1. resolve the voter by code (`InvalidCode`)
//! 2. claim the voter if they have not voted (`AlreadyVoted`)
//! 3. require `votingEnabled` (`VotingClosed`)
//! 4. validate every line against live candidate data
//!    (`DuplicatePosition`, `UnknownCandidate`, `PositionMismatch`)
//! 5. stage the ledger and audit entries
//! 6. commit tallies, ledger, audit, and finally the voter's voted flag
//!
//! Steps 1-5 may fail and leave nothing behind. Step 6 has no failure
//! path. Because the voter write lock is held from step 1 to step 6, two
//! submissions with the same code are serialized: the second one observes
//! the first one's commit and fails with `AlreadyVoted`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use super::audit::{AuditAction, AuditEvent, AuditLog};
use super::candidates::CandidateRegistry;
use super::ledger::{Vote, VoteLedger};
use super::settings::SettingsStore;
use super::voters::VoterRegistry;
use crate::types::{BallotLine, Voter, VoterCode};
use crate::{Error, Result};

/// One recorded selection, echoed back to the voter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedLine {
    pub candidate_id: Uuid,
    pub candidate_name: String,
    pub position: String,
}

/// Result of an accepted ballot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotReceipt {
    pub success: bool,
    pub count: usize,
    pub lines: Vec<RecordedLine>,
}

/// The vote-casting transaction core
#[derive(Debug, Clone)]
pub struct VotingService {
    settings: Arc<SettingsStore>,
    voters: Arc<VoterRegistry>,
    candidates: Arc<CandidateRegistry>,
    ledger: Arc<VoteLedger>,
    audit: Arc<AuditLog>,
}

impl VotingService {
    pub fn new(
        settings: Arc<SettingsStore>,
        voters: Arc<VoterRegistry>,
        candidates: Arc<CandidateRegistry>,
        ledger: Arc<VoteLedger>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            settings,
            voters,
            candidates,
            ledger,
            audit,
        }
    }

    /// Login check: the voter behind `code`, provided they may still vote
    pub fn check_voter(&self, code: &str) -> Result<Voter> {
        let code = VoterCode::normalize(code).ok_or(Error::InvalidCode)?;
        let voters = self.voters.read_table()?;
        let voter = voters.find_by_code(&code).ok_or(Error::InvalidCode)?;
        if voter.has_voted() {
            return Err(Error::AlreadyVoted);
        }
        Ok(voter.clone())
    }

    /// Cast a ballot for the voter holding `code`
    pub fn submit_ballot(&self, code: &str, lines: &[BallotLine]) -> Result<BallotReceipt> {
        let result = self.execute(code, lines);
        let voter = VoterCode::normalize(code)
            .map(|c| c.redacted())
            .unwrap_or_default();
        match &result {
            Ok(receipt) => {
                tracing::info!(voter = %voter, lines = receipt.count, "ballot accepted");
            }
            Err(error) => {
                tracing::debug!(kind = error.kind(), voter = %voter, "ballot rejected");
            }
        }
        result
    }

    fn execute(&self, code: &str, lines: &[BallotLine]) -> Result<BallotReceipt> {
        let code = VoterCode::normalize(code).ok_or(Error::InvalidCode)?;

        let settings = self.settings.read_table()?;
        let mut voters = self.voters.write_table()?;
        let mut candidates = self.candidates.write_table()?;
        let mut ledger = self.ledger.write_log()?;
        let mut audit = self.audit.write_log()?;

        let voter = voters.find_by_code_mut(&code).ok_or(Error::InvalidCode)?;
        let voter = voter.eligible()?;

        if !settings.voting_enabled() {
            return Err(Error::VotingClosed);
        }

        let mut seen_positions = HashSet::with_capacity(lines.len());
        let mut recorded = Vec::with_capacity(lines.len());
        for line in lines {
            if !seen_positions.insert(line.position.as_str()) {
                return Err(Error::DuplicatePosition {
                    position: line.position.clone(),
                });
            }
            let candidate = candidates.get(line.candidate_id).ok_or(Error::UnknownCandidate {
                candidate_id: line.candidate_id,
            })?;
            if candidate.position != line.position {
                return Err(Error::PositionMismatch {
                    candidate: candidate.display_name(),
                    submitted: line.position.clone(),
                    actual: candidate.position.clone(),
                });
            }
            recorded.push(RecordedLine {
                candidate_id: candidate.id,
                candidate_name: candidate.display_name(),
                position: candidate.position.clone(),
            });
        }

        let now = Utc::now();
        let voter_name = voter.voter().display_name();
        let votes = recorded
            .iter()
            .map(|line| Vote {
                voter_code: code.clone(),
                candidate_id: line.candidate_id,
                candidate_name: line.candidate_name.clone(),
                position: line.position.clone(),
                timestamp: now,
                voter_name: voter_name.clone(),
            })
            .collect();
        let events = recorded
            .iter()
            .map(|line| {
                AuditEvent::new(
                    AuditAction::CastVote,
                    code.as_str(),
                    format!("Vote cast for {} ({})", line.candidate_name, line.position),
                    now,
                )
            })
            .collect();
        let staged_votes = ledger.stage(votes)?;
        let staged_events = audit.stage(events)?;

        // Tallies first: the increment checks every id before touching any,
        // and everything after it is infallible.
        let candidate_ids: Vec<Uuid> = recorded.iter().map(|line| line.candidate_id).collect();
        candidates.increment_all(&candidate_ids)?;
        ledger.commit(staged_votes);
        audit.commit(staged_events);
        voter.mark_voted(now);

        Ok(BallotReceipt {
            success: true,
            count: recorded.len(),
            lines: recorded,
        })
    }
}
