//! Configuration management for Rshare.
//!
//! This module handles loading, saving, and validating Rshare configuration.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/rshare/config.toml` |
//! | macOS | `~/Library/Application Support/com.rshare.Rshare/config.toml` |
//! | Windows | `%APPDATA%\rshare\Rshare\config\config.toml` |
//!
//! ## Example
//!
//! ```rust,ignore
//! use rshare_core::config::Config;
//!
//! let config = Config::load()?;
//! println!("Sessions live for {:?}", config.session.session_ttl);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::code::{MAX_CODE_LENGTH, MIN_CODE_LENGTH};
use crate::error::{Error, Result};

/// Longest accepted session time-to-live.
pub const MAX_SESSION_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Main configuration struct for Rshare.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Session limits and lifetime
    pub session: SessionConfig,
    /// Byte streaming settings
    pub transfer: TransferConfig,
    /// Where uploaded bytes are kept
    pub storage: StorageConfig,
    /// HTTP gateway settings
    pub web: WebConfig,
}

/// Session configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Largest accepted file
    pub max_file_size_bytes: u64,
    /// Largest accepted file set (None for unlimited)
    pub max_session_bytes: Option<u64>,
    /// Most files accepted in one session
    pub max_files: usize,
    /// Lifetime of a session from creation
    #[serde(with = "humantime_serde")]
    pub session_ttl: Duration,
    /// Number of digits in share codes
    pub code_length: usize,
    /// Draws before code allocation gives up
    pub code_retry_limit: u32,
    /// Expire a session once every file has been downloaded
    pub single_use: bool,
    /// Interval of the background expiry sweep
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: crate::MAX_FILE_SIZE,
            max_session_bytes: None,
            max_files: 256,
            session_ttl: Duration::from_secs(crate::DEFAULT_SESSION_TTL_SECS),
            code_length: crate::code::DEFAULT_CODE_LENGTH,
            code_retry_limit: crate::code::DEFAULT_CODE_RETRY_LIMIT,
            single_use: false,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Transfer configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Bytes moved per chunk
    pub chunk_size: usize,
    /// Emit a progress event at least every this many bytes
    pub progress_min_bytes: u64,
    /// Emit a progress event at least this often
    #[serde(with = "humantime_serde")]
    pub progress_min_interval: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            progress_min_bytes: 256 * 1024,
            progress_min_interval: Duration::from_millis(250),
        }
    }
}

/// Storage backend for uploaded bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Spool files in a temporary directory
    #[default]
    Disk,
    /// Keep bytes in memory
    Memory,
}

/// Storage configuration options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend kind
    pub backend: StorageBackend,
    /// Directory for disk spools (defaults to the system temp directory)
    pub spool_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Directory used for disk spools.
    #[must_use]
    pub fn spool_dir(&self) -> PathBuf {
        self.spool_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("rshare-spool"))
    }
}

/// Web gateway configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Web server port
    pub port: u16,
    /// Bind to localhost only
    pub localhost_only: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            localhost_only: false,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed, or
    /// fails validation.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a specific file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Check that values are usable together.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, reason: &str| {
            Err(Error::InvalidConfig {
                key: key.to_string(),
                reason: reason.to_string(),
            })
        };

        let session = &self.session;
        if !(MIN_CODE_LENGTH..=MAX_CODE_LENGTH).contains(&session.code_length) {
            return invalid(
                "session.code_length",
                &format!("must be between {MIN_CODE_LENGTH} and {MAX_CODE_LENGTH}"),
            );
        }
        if session.code_retry_limit == 0 {
            return invalid("session.code_retry_limit", "must be at least 1");
        }
        if session.session_ttl.is_zero() {
            return invalid("session.session_ttl", "must be greater than zero");
        }
        if session.session_ttl > MAX_SESSION_TTL {
            return invalid("session.session_ttl", "must be at most 365 days");
        }
        if session.max_files == 0 {
            return invalid("session.max_files", "must be at least 1");
        }
        if session.sweep_interval.is_zero() {
            return invalid("session.sweep_interval", "must be greater than zero");
        }
        if let Some(limit) = session.max_session_bytes {
            if limit < session.max_file_size_bytes {
                return invalid(
                    "session.max_session_bytes",
                    "must not be smaller than session.max_file_size_bytes",
                );
            }
        }
        if self.transfer.chunk_size == 0 {
            return invalid("transfer.chunk_size", "must be greater than zero");
        }

        Ok(())
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "rshare", "Rshare")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid duration '{s}'")))
    }
}

/// Parse a duration string like "250ms", "30s", "5m", "1h" or "7d".
///
/// Returns `None` for an unknown unit, a missing number, or overflow.
#[must_use]
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        return ms.trim().parse().ok().map(Duration::from_millis);
    }

    let (unit_start, _) = s.char_indices().last()?;
    let (digits, unit) = s.split_at(unit_start);
    let n: u64 = digits.trim().parse().ok()?;
    let secs = match unit {
        "s" => n,
        "m" => n.checked_mul(60)?,
        "h" => n.checked_mul(3600)?,
        "d" => n.checked_mul(86_400)?,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}
