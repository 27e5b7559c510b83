//! Error types for Rshare.
//!
//! This module provides a unified error type for all Rshare operations,
//! with specific error variants for different failure modes.

use std::io;

use thiserror::Error;

/// A specialized `Result` type for Rshare operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad failure category of an [`Error`].
///
/// Transport layers use this to decide how a failure is reported to the
/// remote party without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller-correctable input problem (bad code, empty file set, oversized file)
    InvalidInput,
    /// The code does not name a live session
    NotFound,
    /// The session's time-to-live elapsed
    Expired,
    /// An upload exceeded the declared file size
    Overflow,
    /// No unused share code could be allocated
    Exhaustion,
    /// The session was aborted
    Cancelled,
    /// The requested file has not finished uploading
    NotReady,
    /// The operation conflicts with one already in flight
    Conflict,
    /// Local failure (I/O, configuration, serialization)
    Internal,
}

/// The main error type for Rshare.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid share code format (E001)
    #[error("invalid code format: {0}")]
    InvalidCodeFormat(String),

    /// Invalid request input (E001)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A declared file exceeds the per-file limit (E001)
    #[error("file '{name}' is {size} bytes, exceeding the {limit} byte limit")]
    FileTooLarge {
        /// File name
        name: String,
        /// Declared size
        size: u64,
        /// Configured limit
        limit: u64,
    },

    /// The file set exceeds the per-session limit (E001)
    #[error("session totals {total} bytes, exceeding the {limit} byte limit")]
    SessionTooLarge {
        /// Declared total
        total: u64,
        /// Configured limit
        limit: u64,
    },

    /// File index does not exist in the session (E001)
    #[error("file index {index} out of range (session has {count} files)")]
    FileIndexOutOfRange {
        /// Requested index
        index: usize,
        /// Number of files in the session
        count: usize,
    },

    /// Code not found (E003)
    #[error("code '{0}' not found")]
    CodeNotFound(String),

    /// Code has expired (E004)
    #[error("code '{0}' has expired")]
    CodeExpired(String),

    /// Session was cancelled (E005)
    #[error("session '{0}' was cancelled")]
    SessionCancelled(String),

    /// Upload exceeded the declared size (E006)
    #[error("upload overflow for '{file}': declared {declared} bytes, received {attempted}")]
    UploadOverflow {
        /// File name
        file: String,
        /// Declared size
        declared: u64,
        /// Cumulative bytes the write would have produced
        attempted: u64,
    },

    /// File is not fully uploaded yet (E007)
    #[error("file '{file}' is not ready: {transferred} of {total} bytes uploaded")]
    FileNotReady {
        /// File name
        file: String,
        /// Bytes uploaded so far
        transferred: u64,
        /// Declared size
        total: u64,
    },

    /// Code space exhausted (E008)
    #[error("unable to allocate a unique code after {attempts} attempts")]
    CodeSpaceExhausted {
        /// Number of draws made
        attempts: u32,
    },

    /// Every code is held by a live session (E008)
    #[error("all {live} share codes are in use")]
    CodeSpaceFull {
        /// Live sessions holding a code
        live: u64,
    },

    /// Another uploader is attached to the file (E009)
    #[error("an upload is already in progress for '{0}'")]
    UploadInProgress(String),

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Reason for invalidity
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code associated with this error, if any.
    ///
    /// Error codes follow the pattern EXXX where XXX is a 3-digit number.
    #[must_use]
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::InvalidCodeFormat(_)
            | Self::InvalidInput(_)
            | Self::FileTooLarge { .. }
            | Self::SessionTooLarge { .. }
            | Self::FileIndexOutOfRange { .. } => Some("E001"),
            Self::CodeNotFound(_) => Some("E003"),
            Self::CodeExpired(_) => Some("E004"),
            Self::SessionCancelled(_) => Some("E005"),
            Self::UploadOverflow { .. } => Some("E006"),
            Self::FileNotReady { .. } => Some("E007"),
            Self::CodeSpaceExhausted { .. } | Self::CodeSpaceFull { .. } => Some("E008"),
            Self::UploadInProgress(_) => Some("E009"),
            _ => None,
        }
    }

    /// Returns the failure category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCodeFormat(_)
            | Self::InvalidInput(_)
            | Self::FileTooLarge { .. }
            | Self::SessionTooLarge { .. }
            | Self::FileIndexOutOfRange { .. } => ErrorKind::InvalidInput,
            Self::CodeNotFound(_) => ErrorKind::NotFound,
            Self::CodeExpired(_) => ErrorKind::Expired,
            Self::SessionCancelled(_) => ErrorKind::Cancelled,
            Self::UploadOverflow { .. } => ErrorKind::Overflow,
            Self::FileNotReady { .. } => ErrorKind::NotReady,
            Self::CodeSpaceExhausted { .. } | Self::CodeSpaceFull { .. } => ErrorKind::Exhaustion,
            Self::UploadInProgress(_) => ErrorKind::Conflict,
            Self::ConfigError(_)
            | Self::InvalidConfig { .. }
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns whether this error is recoverable (can be retried).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::FileNotReady { .. } | Self::UploadInProgress(_) | Self::Io(_)
        )
    }

    /// Returns a helpful suggestion for resolving the error, if applicable.
    #[must_use]
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::InvalidCodeFormat(_) => Some("Share codes are 6 digits, e.g. 042917"),
            Self::CodeNotFound(_) | Self::CodeExpired(_) => {
                Some("Ask the sender for a new code; codes are only valid for a limited time")
            }
            Self::FileNotReady { .. } => {
                Some("The sender is still uploading. Wait a moment and try again")
            }
            Self::FileTooLarge { .. } | Self::SessionTooLarge { .. } => {
                Some("Split the transfer into smaller sessions")
            }
            Self::CodeSpaceExhausted { .. } | Self::CodeSpaceFull { .. } => {
                Some("Too many active sessions; try again once some have expired")
            }
            _ => None,
        }
    }
}
