//! Election configuration
//!
//! Loads tunables from environment variables (with an optional `.env` file)
//! and validates them before any registry is built.

use crate::types::MAX_CODE_LEN;
use crate::{Error, Result, validation_error};
use serde::{Deserialize, Serialize};

/// Default voter code alphabet: upper-case letters and digits without the
/// visually ambiguous `0 O 1 I`.
pub const DEFAULT_CODE_ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Default voter code length
pub const DEFAULT_CODE_LENGTH: usize = 8;

/// Default cap on code generation attempts per registration
pub const DEFAULT_MAX_CODE_ATTEMPTS: u32 = 64;

const AMBIGUOUS_CHARS: &[char] = &['0', 'O', '1', 'I'];
const MIN_CODE_LENGTH: usize = 4;
const MIN_ALPHABET_SIZE: usize = 16;

/// Tunables for code generation and settings bootstrap
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionConfig {
    /// Length of generated voter codes
    pub code_length: usize,

    /// Symbols generated voter codes are drawn from
    pub code_alphabet: String,

    /// Attempts before code generation gives up with `CodeSpaceExhausted`
    pub max_code_attempts: u32,

    /// Value seeded for `electionTitle` when absent
    pub default_election_title: String,

    /// Value seeded for `maxCandidatesPerPosition` when absent
    pub default_max_candidates_per_position: i64,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            code_length: DEFAULT_CODE_LENGTH,
            code_alphabet: DEFAULT_CODE_ALPHABET.to_string(),
            max_code_attempts: DEFAULT_MAX_CODE_ATTEMPTS,
            default_election_title: "General Election".to_string(),
            default_max_candidates_per_position: 20,
        }
    }
}

impl ElectionConfig {
    /// Load election configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let defaults = Self::default();

        let code_length = match std::env::var("BALLOT_CODE_LENGTH") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| Error::validation("Invalid BALLOT_CODE_LENGTH"))?,
            Err(_) => defaults.code_length,
        };

        let code_alphabet =
            std::env::var("BALLOT_CODE_ALPHABET").unwrap_or(defaults.code_alphabet);

        let max_code_attempts = match std::env::var("BALLOT_MAX_CODE_ATTEMPTS") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| Error::validation("Invalid BALLOT_MAX_CODE_ATTEMPTS"))?,
            Err(_) => defaults.max_code_attempts,
        };

        let default_election_title =
            std::env::var("BALLOT_ELECTION_TITLE").unwrap_or(defaults.default_election_title);

        let default_max_candidates_per_position =
            match std::env::var("BALLOT_MAX_CANDIDATES_PER_POSITION") {
                Ok(raw) => raw.parse().map_err(|_| {
                    Error::validation("Invalid BALLOT_MAX_CANDIDATES_PER_POSITION")
                })?,
                Err(_) => defaults.default_max_candidates_per_position,
            };

        let config = Self {
            code_length,
            code_alphabet,
            max_code_attempts,
            default_election_title,
            default_max_candidates_per_position,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create configuration for testing
    pub fn for_testing() -> Self {
        Self::default()
    }

    /// Reject configurations that would make code generation unsafe
    pub fn validate(&self) -> Result<()> {
        if self.code_length < MIN_CODE_LENGTH {
            return Err(Error::validation(format!(
                "code_length must be at least {MIN_CODE_LENGTH}"
            )));
        }
        // Lookups reject anything longer, so longer codes could never be used.
        if self.code_length > MAX_CODE_LEN {
            return Err(Error::validation(format!(
                "code_length must be at most {MAX_CODE_LEN}"
            )));
        }

        // Lookups upper-case their input, so only upper-case symbols can match.
        let mut symbols: Vec<char> = self.code_alphabet.chars().collect();
        if symbols
            .iter()
            .any(|c| !(c.is_ascii_uppercase() || c.is_ascii_digit()))
        {
            return Err(Error::validation(
                "code_alphabet must contain only upper-case ASCII letters and digits",
            ));
        }
        if symbols.iter().any(|c| AMBIGUOUS_CHARS.contains(c)) {
            return Err(Error::validation(
                "code_alphabet must not contain ambiguous characters (0, O, 1, I)",
            ));
        }
        symbols.sort_unstable();
        symbols.dedup();
        if symbols.len() != self.code_alphabet.chars().count() {
            return Err(Error::validation("code_alphabet must not repeat symbols"));
        }
        if symbols.len() < MIN_ALPHABET_SIZE {
            return Err(Error::validation(format!(
                "code_alphabet must have at least {MIN_ALPHABET_SIZE} symbols"
            )));
        }

        if self.max_code_attempts == 0 {
            return Err(Error::validation("max_code_attempts must be at least 1"));
        }
        if self.default_max_candidates_per_position < 1 {
            return Err(Error::validation(
                "default_max_candidates_per_position must be at least 1",
            ));
        }

        Ok(())
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub election: ElectionConfig,
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level applied to this crate's events when `RUST_LOG` is unset
    pub level: String,
    /// `compact`, `pretty` or `json`
    pub format: String,
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["compact", "pretty", "json"];

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Load logging configuration from `LOG_LEVEL` and `LOG_FORMAT`
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        let config = Self {
            level: std::env::var("LOG_LEVEL")
                .map(|level| level.to_ascii_lowercase())
                .unwrap_or(defaults.level),
            format: std::env::var("LOG_FORMAT")
                .map(|format| format.to_ascii_lowercase())
                .unwrap_or(defaults.format),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.level.as_str()) {
            return Err(validation_error!("unknown log level {}", self.level));
        }
        if !LOG_FORMATS.contains(&self.format.as_str()) {
            return Err(validation_error!("unknown log format {}", self.format));
        }
        Ok(())
    }

    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub fn filter_directive(&self) -> String {
        format!("ballot={}", self.level)
    }
}

impl Config {
    /// Load configuration from environment
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            election: ElectionConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }

    /// Create configuration for testing
    pub fn for_testing() -> Self {
        let logging = LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        };

        Self {
            election: ElectionConfig::for_testing(),
            logging,
        }
    }
}
