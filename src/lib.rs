//! Vote-casting core for a single electronic election
//!
//! Voters are registered with one-time codes, candidates stand for named
//! positions, and a ballot is cast as one all-or-nothing transaction over
//! the voter roll, the tallies, the vote ledger and the audit log.

pub mod config;
pub mod election;
pub mod errors;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ElectionConfig, LoggingConfig};
pub use election::{BallotReceipt, Election, RequestContext};
pub use errors::{Error, Result};
pub use types::{BallotLine, Candidate, CandidateProfile, NewVoter, Voter, VoterCode};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the global tracing subscriber from `LOG_LEVEL` / `LOG_FORMAT`
pub fn init() -> Result<()> {
    init_with(&LoggingConfig::from_env()?)
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over `logging.level` when set. Calling it again once a
/// subscriber is installed is a no-op.
pub fn init_with(logging: &LoggingConfig) -> Result<()> {
    logging.validate()?;
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.filter_directive().into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match logging.format.as_str() {
        "json" => builder.json().try_init(),
        "pretty" => builder.pretty().try_init(),
        _ => builder.compact().try_init(),
    }
    .is_ok();

    if installed {
        tracing::info!(format = %logging.format, "ballot core v{} initialized", VERSION);
    }
    Ok(())
}
