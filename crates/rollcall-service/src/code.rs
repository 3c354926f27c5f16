//! Attendance code generation and normalization.
//!
//! Codes are short, human-readable strings drawn from an alphabet with the
//! visually ambiguous symbols removed (`0`, `1`, `I`, `O`), so they can be
//! read off a projector without transcription errors.
//!
//! Randomness comes from `ring::rand::SystemRandom` (OS CSPRNG). Random bytes
//! are mapped onto the alphabet by rejection sampling so every symbol is
//! equally likely; the next code cannot be predicted from the current one.

use crate::errors::RollCallError;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Code alphabet: A-Z and 2-9 without I, O, 0 and 1 (32 symbols).
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Default code length.
pub const DEFAULT_CODE_LENGTH: usize = 4;

/// Shortest code length accepted by configuration.
pub const MIN_CODE_LENGTH: usize = 3;

/// Longest code length accepted by configuration.
pub const MAX_CODE_LENGTH: usize = 12;

/// Attempts to produce a code different from the excluded one before giving up.
///
/// For any code space of size >= 2 the chance of exhausting this is <= 2^-32.
const MAX_REPEAT_RETRIES: usize = 32;

/// Random bytes drawn per refill of the sampling buffer.
const SAMPLE_BATCH_BYTES: usize = 32;

/// A normalized attendance code.
///
/// Normalization (trim + ASCII uppercase) is applied identically when a code
/// is issued and when a participant's input is compared against it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttendanceCode(String);

impl AttendanceCode {
    /// Normalize arbitrary input into a code for comparison.
    #[must_use]
    pub fn normalize(input: &str) -> Self {
        Self(input.trim().to_ascii_uppercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AttendanceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AttendanceCode {
    fn from(value: &str) -> Self {
        Self::normalize(value)
    }
}

/// Produces random attendance codes.
///
/// Holds no mutable state; a single generator can be shared across tasks.
#[derive(Debug, Clone)]
pub struct CodeGenerator {
    alphabet: &'static [u8],
    length: usize,
    rng: SystemRandom,
}

impl CodeGenerator {
    /// Create a generator over [`CODE_ALPHABET`] producing codes of `length`.
    #[must_use]
    pub fn new(length: usize) -> Self {
        Self::with_alphabet(CODE_ALPHABET, length)
    }

    /// Create a generator over a custom alphabet.
    ///
    /// The alphabet must hold between 2 and 256 ASCII bytes. Bytes are not
    /// deduplicated: a repeated symbol is drawn proportionally more often and
    /// shrinks the effective code space.
    #[must_use]
    pub fn with_alphabet(alphabet: &'static [u8], length: usize) -> Self {
        Self {
            alphabet,
            length,
            rng: SystemRandom::new(),
        }
    }

    /// Code length produced by this generator.
    #[must_use]
    pub fn length(&self) -> usize {
        self.length
    }

    /// Produce a new code that differs from `excluding`.
    ///
    /// # Errors
    ///
    /// Returns `RollCallError::Internal` if the OS random source fails, or if
    /// the code space is too small to avoid the excluded code.
    pub fn next(&self, excluding: Option<&AttendanceCode>) -> Result<AttendanceCode, RollCallError> {
        for _ in 0..MAX_REPEAT_RETRIES {
            let code = self.sample()?;
            if excluding != Some(&code) {
                return Ok(code);
            }
        }

        tracing::error!(
            target: "rc.code",
            alphabet_size = self.alphabet.len(),
            length = self.length,
            "Code generator could not avoid repeating the previous code"
        );
        Err(RollCallError::Internal(
            "code generator exhausted retries".to_string(),
        ))
    }

    fn sample(&self) -> Result<AttendanceCode, RollCallError> {
        let alphabet_len = self.alphabet.len();
        if !(2..=256).contains(&alphabet_len) || self.length == 0 {
            return Err(RollCallError::Internal(
                "code generator misconfigured".to_string(),
            ));
        }

        // Largest multiple of the alphabet size that fits in a byte; bytes at
        // or above it are discarded to keep the distribution uniform.
        let zone = 256 - (256 % alphabet_len);

        let mut code = String::with_capacity(self.length);
        let mut buf = [0u8; SAMPLE_BATCH_BYTES];

        while code.len() < self.length {
            self.rng.fill(&mut buf).map_err(|e| {
                tracing::error!(target: "rc.code", error = %e, "Failed to generate random bytes");
                RollCallError::Internal("RNG failure".to_string())
            })?;

            for &byte in &buf {
                if code.len() == self.length {
                    break;
                }
                let byte = usize::from(byte);
                if byte >= zone {
                    continue;
                }
                let ch = self
                    .alphabet
                    .get(byte % alphabet_len)
                    .ok_or_else(|| RollCallError::Internal("alphabet index out of range".to_string()))?;
                code.push(char::from(*ch));
            }
        }

        Ok(AttendanceCode(code))
    }
}
