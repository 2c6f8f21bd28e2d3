//! Voter code generation
//!
//! Codes are drawn uniformly from a restricted alphabet. Uniqueness is the
//! caller's concern: [`CodeGenerator::generate_unique`] takes a membership
//! check and retries a bounded number of times. The registry runs it while
//! holding its write lock, so the check and the insert are one step.

use rand::Rng;

use crate::config::ElectionConfig;
use crate::types::VoterCode;
use crate::{Error, Result};

/// Random fixed-length code source
#[derive(Debug, Clone)]
pub struct CodeGenerator {
    alphabet: Vec<char>,
    length: usize,
    max_attempts: u32,
}

impl CodeGenerator {
    /// Build a generator from validated configuration
    pub fn new(config: &ElectionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            alphabet: config.code_alphabet.chars().collect(),
            length: config.code_length,
            max_attempts: config.max_code_attempts,
        })
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn alphabet(&self) -> &[char] {
        &self.alphabet
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Draw one code from the thread RNG
    pub fn generate(&self) -> VoterCode {
        self.generate_with(&mut rand::thread_rng())
    }

    /// Draw one code from `rng`
    pub fn generate_with<R: Rng + ?Sized>(&self, rng: &mut R) -> VoterCode {
        let code: String = (0..self.length)
            .map(|_| self.alphabet[rng.gen_range(0..self.alphabet.len())])
            .collect();
        VoterCode::from_generated(code)
    }

    /// Draw codes until `is_taken` rejects none, up to the attempt cap
    pub fn generate_unique<F>(&self, is_taken: F) -> Result<VoterCode>
    where
        F: FnMut(&VoterCode) -> bool,
    {
        self.generate_unique_with(&mut rand::thread_rng(), is_taken)
    }

    pub fn generate_unique_with<R, F>(&self, rng: &mut R, mut is_taken: F) -> Result<VoterCode>
    where
        R: Rng + ?Sized,
        F: FnMut(&VoterCode) -> bool,
    {
        for attempt in 1..=self.max_attempts {
            let code = self.generate_with(rng);
            if !is_taken(&code) {
                if attempt > self.max_attempts / 2 {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        "voter code space is nearly saturated"
                    );
                }
                return Ok(code);
            }
        }

        tracing::error!(
            attempts = self.max_attempts,
            "no unused voter code found"
        );
        Err(Error::CodeSpaceExhausted {
            attempts: self.max_attempts,
        })
    }

    /// Whether `code` could have come from this generator
    pub fn is_well_formed(&self, code: &VoterCode) -> bool {
        code.as_str().chars().count() == self.length
            && code.as_str().chars().all(|c| self.alphabet.contains(&c))
    }
}
