//! Request-scoped caller identity
//!
//! Every mutating operation receives the caller explicitly instead of
//! consulting session state. Whether an admin session is genuine is decided
//! upstream and arrives here as a plain boolean.

use std::fmt;

use crate::types::VoterCode;
use crate::{Error, Result};

/// Who is making the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    /// An administrator, by display name
    Admin(String),
    /// A voter, by their code
    Voter(VoterCode),
    /// Startup and maintenance tasks
    System,
}

/// Log-safe rendering; voter codes are redacted
impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin(name) => write!(f, "admin:{name}"),
            Self::Voter(code) => write!(f, "voter:{}", code.redacted()),
            Self::System => f.write_str("system"),
        }
    }
}

/// Caller identity plus the externally decided authorization flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    actor: Actor,
    authorized: bool,
}

impl RequestContext {
    pub fn admin(name: impl Into<String>, authorized: bool) -> Self {
        Self {
            actor: Actor::Admin(name.into()),
            authorized,
        }
    }

    pub fn voter(code: VoterCode) -> Self {
        Self {
            actor: Actor::Voter(code),
            authorized: false,
        }
    }

    pub fn system() -> Self {
        Self {
            actor: Actor::System,
            authorized: true,
        }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    /// Identifier written to the audit log's `performedBy`
    pub fn performed_by(&self) -> String {
        match &self.actor {
            Actor::Admin(name) => name.clone(),
            Actor::Voter(code) => code.to_string(),
            Actor::System => "system".to_string(),
        }
    }

    /// Fail with `Unauthorized` unless this is an authorized admin or the system
    pub fn require_admin(&self, action: &str) -> Result<()> {
        match self.actor {
            Actor::Admin(_) | Actor::System if self.authorized => Ok(()),
            _ => {
                tracing::warn!(
                    actor = %self.actor,
                    action,
                    "admin operation refused"
                );
                Err(Error::unauthorized(action))
            }
        }
    }
}
