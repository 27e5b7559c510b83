//! File descriptors for Rshare.
//!
//! A [`FileDescriptor`] is the sender's declaration of one file in a share:
//! its display name, exact size, and MIME type. Sessions are created from
//! descriptors before any bytes move, so the declared size is what uploads
//! are checked against.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Longest accepted file name in bytes.
pub const MAX_FILE_NAME_LEN: usize = 255;

/// MIME type used when none is declared and the extension is unknown.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Declaration of a single file in a share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// File name as shown to receivers
    pub name: String,
    /// Exact size in bytes
    #[serde(alias = "size")]
    pub size_bytes: u64,
    /// MIME type (guessed from the name when empty)
    #[serde(default, alias = "mimeType")]
    pub mime_type: String,
}

impl FileDescriptor {
    /// Create a descriptor with an explicit MIME type.
    pub fn new(name: impl Into<String>, size_bytes: u64, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Create a descriptor, guessing the MIME type from the file extension.
    pub fn guessed(name: impl Into<String>, size_bytes: u64) -> Self {
        let name = name.into();
        let mime_type = guess_mime_type(&name);
        Self {
            name,
            size_bytes,
            mime_type,
        }
    }

    /// Check the name and size against `max_size`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an unusable name and
    /// [`Error::FileTooLarge`] when the declared size exceeds `max_size`.
    pub fn validate(&self, max_size: u64) -> Result<()> {
        validate_file_name(&self.name)?;

        if self.size_bytes > max_size {
            return Err(Error::FileTooLarge {
                name: self.name.clone(),
                size: self.size_bytes,
                limit: max_size,
            });
        }

        Ok(())
    }

    /// Fill in a missing MIME type from the file extension.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.mime_type.trim().is_empty() {
            self.mime_type = guess_mime_type(&self.name);
        }
        self
    }
}

/// Guess a MIME type from a file name.
#[must_use]
pub fn guess_mime_type(name: &str) -> String {
    mime_guess::from_path(name)
        .first()
        .map_or_else(|| DEFAULT_MIME_TYPE.to_string(), |m| m.essence_str().to_string())
}

/// Check that a file name is safe to hand to receivers.
///
/// Names must be non-empty, at most [`MAX_FILE_NAME_LEN`] bytes, and must
/// not contain path separators or NUL bytes.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] describing the problem.
pub fn validate_file_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput("file name is empty".to_string()));
    }
    if name.len() > MAX_FILE_NAME_LEN {
        return Err(Error::InvalidInput(format!(
            "file name exceeds {MAX_FILE_NAME_LEN} bytes"
        )));
    }
    if name == "." || name == ".." {
        return Err(Error::InvalidInput(format!("invalid file name '{name}'")));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(Error::InvalidInput(format!(
            "file name '{}' contains a path separator",
            name.escape_default()
        )));
    }
    Ok(())
}

/// Format a file size for display.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
