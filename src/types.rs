//! # Core Types for the Election Core
//!
//! Records owned by the registries and the inputs admin and voter requests
//! carry into them.
//!
//! ## Type Categories
//!
//! ### Identity
//! - [`VoterCode`]: normalized single-use voter code
//!
//! ### Core Entities
//! - [`Voter`]: registered voter and their one-way voted transition
//! - [`Candidate`]: candidate, position and live tally
//! - [`BallotLine`]: one (candidate, position) selection on a ballot
//!
//! ### Admin Inputs
//! - [`NewVoter`]: voter registration fields
//! - [`CandidateProfile`]: candidate create/update fields
//!
//! ## Usage Examples
//!
//! ```rust
//! use ballot::types::VoterCode;
//!
//! let code = VoterCode::normalize("  abcd2345 ").unwrap();
//! assert_eq!(code.as_str(), "ABCD2345");
//! assert_eq!(code.redacted(), "ABCD****");
//! ```

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::{Error, Result};

/// Shortest code accepted from outside the generator
pub const MIN_CODE_LEN: usize = 4;

/// Longest code accepted from outside the generator
pub const MAX_CODE_LEN: usize = 32;

/// A voter's single-use code, trimmed and upper-cased
///
/// Codes are compared exactly after normalization, so `abcd2345` and
/// `ABCD2345` name the same voter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoterCode(String);

impl VoterCode {
    /// Normalize raw user input into a code, or `None` if it cannot be one
    pub fn normalize(raw: &str) -> Option<Self> {
        let code = raw.trim().to_ascii_uppercase();
        let well_formed = (MIN_CODE_LEN..=MAX_CODE_LEN).contains(&code.len())
            && code.chars().all(|c| c.is_ascii_alphanumeric());
        well_formed.then_some(Self(code))
    }

    /// Normalize an admin-supplied code, failing with a validation error
    pub fn parse(raw: &str) -> Result<Self> {
        Self::normalize(raw).ok_or_else(|| {
            Error::validation(format!(
                "code must be {MIN_CODE_LEN}-{MAX_CODE_LEN} ASCII letters or digits"
            ))
        })
    }

    /// Wrap a code produced by the generator
    pub(crate) fn from_generated(code: String) -> Self {
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Code with everything after the first four symbols masked, for logs
    pub fn redacted(&self) -> String {
        let visible: String = self.0.chars().take(4).collect();
        let hidden = self.0.len().saturating_sub(visible.len());
        format!("{visible}{}", "*".repeat(hidden))
    }
}

impl fmt::Display for VoterCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registration fields for one voter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVoter {
    pub title: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub surname: String,
    pub gender: String,
}

impl NewVoter {
    pub fn new(
        title: impl Into<String>,
        first_name: impl Into<String>,
        surname: impl Into<String>,
        gender: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            first_name: first_name.into(),
            middle_name: None,
            surname: surname.into(),
            gender: gender.into(),
        }
    }

    /// Reject entries missing a required name field
    pub fn validate(&self) -> Result<()> {
        require_text("firstName", &self.first_name)?;
        require_text("surname", &self.surname)?;
        require_text("gender", &self.gender)?;
        Ok(())
    }
}

/// A registered voter
///
/// The voted flag is derived from `voted_at`, so "has voted" and "has a
/// voted-at timestamp" cannot disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voter {
    pub id: Uuid,
    pub code: VoterCode,
    pub title: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub surname: String,
    pub gender: String,
    voted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Voter {
    pub(crate) fn new(fields: NewVoter, code: VoterCode, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            code,
            title: fields.title.trim().to_string(),
            first_name: fields.first_name.trim().to_string(),
            middle_name: trimmed_optional(fields.middle_name),
            surname: fields.surname.trim().to_string(),
            gender: fields.gender.trim().to_string(),
            voted_at: None,
            created_at,
        }
    }

    pub fn has_voted(&self) -> bool {
        self.voted_at.is_some()
    }

    pub fn voted_at(&self) -> Option<DateTime<Utc>> {
        self.voted_at
    }

    /// "First Surname", as recorded on ledger entries
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.surname)
    }

    /// Claim the voter for a ballot, failing if their code is already spent
    pub(crate) fn eligible(&mut self) -> Result<EligibleVoter<'_>> {
        if self.has_voted() {
            return Err(Error::AlreadyVoted);
        }
        Ok(EligibleVoter { voter: self })
    }
}

/// A voter proven not to have voted, borrowed mutably for the commit
///
/// Completing the transition cannot fail: the only check was done when the
/// borrow was created.
pub(crate) struct EligibleVoter<'a> {
    voter: &'a mut Voter,
}

impl EligibleVoter<'_> {
    pub(crate) fn voter(&self) -> &Voter {
        self.voter
    }

    pub(crate) fn mark_voted(self, at: DateTime<Utc>) {
        self.voter.voted_at = Some(at);
    }
}

/// Admin-editable candidate fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateProfile {
    pub title: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub surname: String,
    pub position: String,
    pub image_url: Option<String>,
    pub biography: Option<String>,
}

impl CandidateProfile {
    pub fn new(
        title: impl Into<String>,
        first_name: impl Into<String>,
        surname: impl Into<String>,
        position: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            first_name: first_name.into(),
            middle_name: None,
            surname: surname.into(),
            position: position.into(),
            image_url: None,
            biography: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        require_text("firstName", &self.first_name)?;
        require_text("surname", &self.surname)?;
        require_text("position", &self.position)?;
        Ok(())
    }
}

/// A candidate standing for exactly one position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: Uuid,
    pub title: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub surname: String,
    pub position: String,
    pub image_url: Option<String>,
    pub biography: Option<String>,
    pub vote_count: u64,
    pub created_at: DateTime<Utc>,
}

impl Candidate {
    pub(crate) fn new(profile: CandidateProfile, created_at: DateTime<Utc>) -> Self {
        let mut candidate = Self {
            id: Uuid::new_v4(),
            title: String::new(),
            first_name: String::new(),
            middle_name: None,
            surname: String::new(),
            position: String::new(),
            image_url: None,
            biography: None,
            vote_count: 0,
            created_at,
        };
        candidate.apply(profile);
        candidate
    }

    /// Overwrite the editable fields; the tally and identity are untouched
    pub(crate) fn apply(&mut self, profile: CandidateProfile) {
        self.title = profile.title.trim().to_string();
        self.first_name = profile.first_name.trim().to_string();
        self.middle_name = trimmed_optional(profile.middle_name);
        self.surname = profile.surname.trim().to_string();
        self.position = profile.position.trim().to_string();
        self.image_url = trimmed_optional(profile.image_url);
        self.biography = trimmed_optional(profile.biography);
    }

    /// "First Surname", as recorded on ledger and audit entries
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.surname)
    }

    /// "Title First Surname", as shown in standings
    pub fn full_name(&self) -> String {
        if self.title.is_empty() {
            self.display_name()
        } else {
            format!("{} {} {}", self.title, self.first_name, self.surname)
        }
    }
}

/// One selection on a ballot: a candidate and the position the voter saw
/// them standing for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotLine {
    pub candidate_id: Uuid,
    pub position: String,
}

impl BallotLine {
    pub fn new(candidate_id: Uuid, position: impl Into<String>) -> Self {
        Self {
            candidate_id,
            position: position.into(),
        }
    }
}

/// Number of events that fell within one wall-clock hour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityBucket {
    pub hour: DateTime<Utc>,
    pub count: usize,
}

/// Group timestamps into hourly buckets, oldest first
pub(crate) fn bucket_by_hour(
    timestamps: impl IntoIterator<Item = DateTime<Utc>>,
) -> Vec<ActivityBucket> {
    let mut buckets: BTreeMap<DateTime<Utc>, usize> = BTreeMap::new();
    for timestamp in timestamps {
        if let Ok(hour) = timestamp.duration_trunc(TimeDelta::hours(1)) {
            *buckets.entry(hour).or_default() += 1;
        }
    }
    buckets
        .into_iter()
        .map(|(hour, count)| ActivityBucket { hour, count })
        .collect()
}

/// Share of `part` in `total` as a percentage, 0 when `total` is 0
pub(crate) fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(field));
    }
    Ok(())
}

fn trimmed_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
