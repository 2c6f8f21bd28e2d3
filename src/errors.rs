//! Error handling for the election core

use uuid::Uuid;

/// Result type alias for the election core
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the election core
///
/// Domain variants are caller-visible and never worth retrying with the same
/// input. `Storage` and `Serialization` are infrastructure failures and are
/// safe to retry verbatim.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// No voter holds the submitted code
    #[error("Invalid voter code")]
    InvalidCode,

    /// The voter's single-use code has already been spent
    #[error("You have already voted")]
    AlreadyVoted,

    /// The `votingEnabled` setting is false or missing
    #[error("Voting is currently disabled")]
    VotingClosed,

    /// A ballot line references a candidate that does not exist
    #[error("Invalid candidate: {candidate_id}")]
    UnknownCandidate { candidate_id: Uuid },

    /// A ballot line's position differs from the candidate's current position
    #[error("Candidate {candidate} is not running for {submitted} (currently {actual})")]
    PositionMismatch {
        candidate: String,
        submitted: String,
        actual: String,
    },

    /// Two ballot lines target the same position
    #[error("More than one selection submitted for {position}")]
    DuplicatePosition { position: String },

    /// Generic missing entity on admin operations
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The operation would break a registry rule
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// The request context is not allowed to perform an admin operation
    #[error("Unauthorized: {action}")]
    Unauthorized { action: String },

    /// Malformed input on an admin operation
    #[error("Validation failed: {field}")]
    Validation { field: String },

    /// Code generation hit its attempt cap without finding a free code
    #[error("No unused voter code found after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },

    /// Store unavailable (e.g. a poisoned lock)
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a new not-found error
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create a new conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a new unauthorized error
    pub fn unauthorized(action: impl Into<String>) -> Self {
        Self::Unauthorized {
            action: action.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(field: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
        }
    }

    /// Create a new storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Whether the same call may succeed if simply repeated
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage { .. } | Self::Serialization(_))
    }

    /// Short stable name of the error kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCode => "invalid_code",
            Self::AlreadyVoted => "already_voted",
            Self::VotingClosed => "voting_closed",
            Self::UnknownCandidate { .. } => "unknown_candidate",
            Self::PositionMismatch { .. } => "position_mismatch",
            Self::DuplicatePosition { .. } => "duplicate_position",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Validation { .. } => "validation",
            Self::CodeSpaceExhausted { .. } => "code_space_exhausted",
            Self::Storage { .. } => "storage",
            Self::Serialization(_) => "serialization",
        }
    }
}

/// Convenience macros for creating specific error types
#[macro_export]
macro_rules! storage_error {
    ($msg:expr) => {
        $crate::Error::storage($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::storage(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr) => {
        $crate::Error::validation($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::validation(format!($fmt, $($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::not_found("voter", Uuid::nil());
        assert!(matches!(err, Error::NotFound { entity: "voter", .. }));

        let err = Error::conflict("voter has already voted");
        assert!(matches!(err, Error::Conflict { .. }));

        let err = Error::validation("firstName");
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_error_macros() {
        let err = storage_error!("voter registry poisoned");
        assert!(matches!(err, Error::Storage { .. }));

        let err = validation_error!("code length {}", 3);
        match err {
            Error::Validation { field } => assert_eq!(field, "code length 3"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_only_infrastructure_errors_are_retryable() {
        assert!(storage_error!("lock poisoned").is_retryable());
        assert!(!Error::AlreadyVoted.is_retryable());
        assert!(!Error::VotingClosed.is_retryable());
        assert!(!Error::InvalidCode.is_retryable());
        assert!(!Error::CodeSpaceExhausted { attempts: 3 }.is_retryable());
    }

    #[test]
    fn test_position_mismatch_message() {
        let err = Error::PositionMismatch {
            candidate: "Ada Obi".to_string(),
            submitted: "President".to_string(),
            actual: "Secretary".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Candidate Ada Obi is not running for President (currently Secretary)"
        );
        assert_eq!(err.kind(), "position_mismatch");
    }
}
