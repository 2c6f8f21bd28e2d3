//! Election state and the services over it
//!
//! Each store sits behind its own `RwLock`. Any operation that holds more
//! than one lock at a time acquires them in this order:
//!
//! settings → voters → candidates → ledger → audit
//!
//! and releases them only once it has finished writing.

pub mod audit;
pub mod candidates;
pub mod chain;
pub mod codes;
pub mod context;
pub mod ledger;
pub mod results;
pub mod settings;
pub mod voters;
pub mod voting;

pub use audit::{AuditAction, AuditCategory, AuditEntry, AuditEvent, AuditLog, AuditQuery, AuditStats};
pub use candidates::{CandidateRegistry, CandidateStats, PositionStats};
pub use chain::{ChainLink, ChainVerification, Chained};
pub use codes::CodeGenerator;
pub use context::{Actor, RequestContext};
pub use ledger::{LedgerEntry, Vote, VoteLedger};
pub use results::{
    CandidateStanding, ConsistencyReport, DetailedResults, PositionResult, ResultsAggregator,
    TallyMismatch,
};
pub use settings::{Setting, SettingKind, SettingValue, SettingsStore};
pub use voters::{RegisteredVoter, VoterRegistry, VoterStats};
pub use voting::{BallotReceipt, RecordedLine, VotingService};

use std::sync::Arc;

use crate::Result;
use crate::config::ElectionConfig;
use crate::types::{BallotLine, Candidate, Voter};

/// One election: every store plus the services wired over them
#[derive(Debug, Clone)]
pub struct Election {
    settings: Arc<SettingsStore>,
    voters: Arc<VoterRegistry>,
    candidates: Arc<CandidateRegistry>,
    ledger: Arc<VoteLedger>,
    audit: Arc<AuditLog>,
    voting: VotingService,
    results: ResultsAggregator,
}

impl Election {
    /// Build an empty election and seed its default settings
    pub fn new(config: &ElectionConfig) -> Result<Self> {
        config.validate()?;
        let codes = CodeGenerator::new(config)?;

        let audit = Arc::new(AuditLog::new());
        let ledger = Arc::new(VoteLedger::new());
        let settings = Arc::new(SettingsStore::new(config, Arc::clone(&audit)));
        let voters = Arc::new(VoterRegistry::new(codes, Arc::clone(&audit)));
        let candidates = Arc::new(CandidateRegistry::new(
            Arc::clone(&settings),
            Arc::clone(&audit),
        ));

        let voting = VotingService::new(
            Arc::clone(&settings),
            Arc::clone(&voters),
            Arc::clone(&candidates),
            Arc::clone(&ledger),
            Arc::clone(&audit),
        );
        let results = ResultsAggregator::new(
            Arc::clone(&voters),
            Arc::clone(&candidates),
            Arc::clone(&ledger),
        );

        settings.initialize()?;
        tracing::debug!(code_length = config.code_length, "election initialized");

        Ok(Self {
            settings,
            voters,
            candidates,
            ledger,
            audit,
            voting,
            results,
        })
    }

    pub fn for_testing() -> Result<Self> {
        Self::new(&ElectionConfig::for_testing())
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn voters(&self) -> &VoterRegistry {
        &self.voters
    }

    pub fn candidates(&self) -> &CandidateRegistry {
        &self.candidates
    }

    pub fn ledger(&self) -> &VoteLedger {
        &self.ledger
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn voting(&self) -> &VotingService {
        &self.voting
    }

    pub fn results(&self) -> &ResultsAggregator {
        &self.results
    }

    // Voter-facing shortcuts

    pub fn lookup_by_code(&self, code: &str) -> Result<Option<Voter>> {
        self.voters.lookup_by_code(code)
    }

    pub fn submit_ballot(&self, code: &str, lines: &[BallotLine]) -> Result<BallotReceipt> {
        self.voting.submit_ballot(code, lines)
    }

    pub fn list_candidates(&self) -> Result<Vec<Candidate>> {
        self.candidates.list()
    }

    pub fn list_positions(&self) -> Result<Vec<String>> {
        self.candidates.list_positions()
    }
}
