//! Share code generation and validation.
//!
//! Share codes are fixed-length numeric strings (6 digits by default) that
//! bind a receiver's request to a sender's session. Leading zeros are
//! significant, so a 6-digit code space holds 10^6 codes.
//!
//! ## Generation
//!
//! Codes are drawn from the operating system CSPRNG so that third parties
//! cannot predict live codes. Uniqueness is enforced by rejection sampling
//! against the caller's set of live codes, bounded by a retry limit.
//!
//! ## Example
//!
//! ```rust,ignore
//! use rshare_core::code::{CodeGenerator, ShareCode};
//!
//! let generator = CodeGenerator::new(6, 50)?;
//! let code = generator.generate_unique(|c| live.contains(c))?;
//!
//! let entered = ShareCode::parse("042 917", 6)?;
//! ```

use rand::rngs::OsRng;
use rand::Rng;
use serde::Serialize;

use crate::error::{Error, Result};

/// Default length of a share code
pub const DEFAULT_CODE_LENGTH: usize = 6;

/// Default number of draws before giving up on a unique code
pub const DEFAULT_CODE_RETRY_LIMIT: u32 = 50;

/// Shortest supported code length
pub const MIN_CODE_LENGTH: usize = 4;

/// Longest supported code length
pub const MAX_CODE_LENGTH: usize = 12;

/// A validated share code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ShareCode {
    code: String,
}

impl ShareCode {
    /// Parse and validate a share code from user input.
    ///
    /// Spaces and `-` separators are ignored so that codes read aloud or
    /// displayed in groups (`042 917`, `042-917`) are accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the code has the wrong length or contains
    /// non-digit characters.
    pub fn parse(input: &str, length: usize) -> Result<Self> {
        let normalized: String = input
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();

        if let Some(c) = normalized.chars().find(|c| !c.is_ascii_digit()) {
            return Err(Error::InvalidCodeFormat(format!(
                "invalid character '{c}' in code"
            )));
        }

        if normalized.len() != length {
            return Err(Error::InvalidCodeFormat(format!(
                "code must be {} digits, got {}",
                length,
                normalized.len()
            )));
        }

        Ok(Self { code: normalized })
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.code
    }

    /// Returns the number of digits in the code.
    #[must_use]
    pub fn len(&self) -> usize {
        self.code.len()
    }
}

impl std::fmt::Display for ShareCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code)
    }
}

impl AsRef<str> for ShareCode {
    fn as_ref(&self) -> &str {
        &self.code
    }
}

/// Generator for share codes.
#[derive(Debug, Clone)]
pub struct CodeGenerator {
    length: usize,
    retry_limit: u32,
    space: u64,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self {
            length: DEFAULT_CODE_LENGTH,
            retry_limit: DEFAULT_CODE_RETRY_LIMIT,
            space: 10u64.pow(6),
        }
    }
}

impl CodeGenerator {
    /// Create a generator for codes of `length` digits.
    ///
    /// # Errors
    ///
    /// Returns an error if the length is outside
    /// `MIN_CODE_LENGTH..=MAX_CODE_LENGTH` or the retry limit is zero.
    pub fn new(length: usize, retry_limit: u32) -> Result<Self> {
        if !(MIN_CODE_LENGTH..=MAX_CODE_LENGTH).contains(&length) {
            return Err(Error::InvalidConfig {
                key: "session.code_length".to_string(),
                reason: format!("must be between {MIN_CODE_LENGTH} and {MAX_CODE_LENGTH}"),
            });
        }
        if retry_limit == 0 {
            return Err(Error::InvalidConfig {
                key: "session.code_retry_limit".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        #[allow(clippy::cast_possible_truncation)]
        let space = 10u64.pow(length as u32);

        Ok(Self {
            length,
            retry_limit,
            space,
        })
    }

    /// Number of digits in generated codes.
    #[must_use]
    pub const fn length(&self) -> usize {
        self.length
    }

    /// Total number of distinct codes.
    #[must_use]
    pub const fn space(&self) -> u64 {
        self.space
    }

    /// Draw one random code without checking for collisions.
    #[must_use]
    pub fn generate(&self) -> ShareCode {
        let value = OsRng.gen_range(0..self.space);
        ShareCode {
            code: format!("{value:0width$}", width = self.length),
        }
    }

    /// Draw a code for which `is_taken` returns `false`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CodeSpaceExhausted`] after `retry_limit` colliding
    /// draws.
    pub fn generate_unique<F>(&self, is_taken: F) -> Result<ShareCode>
    where
        F: Fn(&ShareCode) -> bool,
    {
        for attempt in 1..=self.retry_limit {
            let code = self.generate();
            if !is_taken(&code) {
                if attempt > 1 {
                    tracing::debug!("Allocated code after {} draws", attempt);
                }
                return Ok(code);
            }
        }

        Err(Error::CodeSpaceExhausted {
            attempts: self.retry_limit,
        })
    }
}
