//! Append-only byte spools for uploaded files.
//!
//! Every file in a session is backed by one [`Spool`]. The uploader appends
//! to it in arrival order; downloaders read it through independent
//! [`SpoolReader`] cursors. Readers are only ever created for byte ranges
//! that have already been appended, so no coordination beyond the session's
//! progress bookkeeping is needed between the writer and the readers.
//!
//! ## Backends
//!
//! | Backend | Storage | Cleanup |
//! |---------|---------|---------|
//! | `memory` | `Vec<u8>` per file | dropped with the session |
//! | `disk` | one spool file per file under `spool_dir` | removed when the spool is dropped |

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{Error, Result};

/// Upper bound on the memory reserved up front for an in-memory spool.
const MAX_PREALLOCATION: u64 = 1024 * 1024;

enum Backing {
    Memory(RwLock<Vec<u8>>),
    Disk {
        path: PathBuf,
        writer: Mutex<Option<File>>,
    },
}

/// Append-only byte storage for a single file.
pub struct Spool {
    backing: Backing,
}

impl std::fmt::Debug for Spool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.backing {
            Backing::Memory(_) => f.debug_struct("Spool").field("backend", &"memory").finish(),
            Backing::Disk { path, .. } => f
                .debug_struct("Spool")
                .field("backend", &"disk")
                .field("path", path)
                .finish(),
        }
    }
}

impl Spool {
    /// Create an in-memory spool sized for `expected_len` bytes.
    #[must_use]
    pub fn memory(expected_len: u64) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let reserve = expected_len.min(MAX_PREALLOCATION) as usize;
        Self {
            backing: Backing::Memory(RwLock::new(Vec::with_capacity(reserve))),
        }
    }

    /// Create a disk spool at `dir/name`, truncating any leftover file.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created.
    pub async fn disk(dir: &Path, name: &str) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(name);
        let file = File::create(&path).await?;

        tracing::debug!("Created spool file {}", path.display());

        Ok(Self {
            backing: Backing::Disk {
                path,
                writer: Mutex::new(Some(file)),
            },
        })
    }

    /// Create the spool for file `index` of session `session_id` using the
    /// configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error if a disk spool cannot be created.
    pub async fn for_file(
        config: &StorageConfig,
        session_id: Uuid,
        index: usize,
        expected_len: u64,
    ) -> Result<Self> {
        match config.backend {
            StorageBackend::Memory => Ok(Self::memory(expected_len)),
            StorageBackend::Disk => {
                Self::disk(&config.spool_dir(), &format!("{session_id}-{index}.part")).await
            }
        }
    }

    /// Path of the spool file, for disk spools.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::Memory(_) => None,
            Backing::Disk { path, .. } => Some(path),
        }
    }

    /// Append `data` after all previously appended bytes.
    ///
    /// Once this returns, the bytes are visible to readers created afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the disk write fails or the spool was sealed.
    pub async fn append(&self, data: &[u8]) -> Result<()> {
        match &self.backing {
            Backing::Memory(buf) => {
                buf.write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(data);
                Ok(())
            }
            Backing::Disk { writer, .. } => {
                let mut guard = writer.lock().await;
                let file = guard
                    .as_mut()
                    .ok_or_else(|| Error::Internal("spool already sealed".to_string()))?;
                file.write_all(data).await?;
                file.flush().await?;
                Ok(())
            }
        }
    }

    /// Close the writer once no more bytes will be appended.
    ///
    /// # Errors
    ///
    /// Returns an error if the final sync fails.
    pub async fn seal(&self) -> Result<()> {
        if let Backing::Disk { writer, path } = &self.backing {
            if let Some(file) = writer.lock().await.take() {
                file.sync_all().await?;
                tracing::debug!("Sealed spool file {}", path.display());
            }
        }
        Ok(())
    }

    /// Open an independent cursor over the first `end` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if a disk spool cannot be opened for reading.
    pub async fn reader(self: &Arc<Self>, end: u64) -> Result<SpoolReader> {
        let file = match &self.backing {
            Backing::Memory(_) => None,
            Backing::Disk { path, .. } => Some(File::open(path).await?),
        };

        Ok(SpoolReader {
            spool: Arc::clone(self),
            file,
            position: 0,
            end,
        })
    }
}

impl Drop for Spool {
    fn drop(&mut self) {
        if let Backing::Disk { path, .. } = &self.backing {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to remove spool file {}: {}", path.display(), e);
                }
            }
        }
    }
}

/// Sequential read cursor over a [`Spool`].
#[derive(Debug)]
pub struct SpoolReader {
    spool: Arc<Spool>,
    file: Option<File>,
    position: u64,
    end: u64,
}

impl SpoolReader {
    /// Bytes already returned by this cursor.
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// Bytes left before the end of the readable range.
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.end - self.position
    }

    /// Read up to `max` bytes, or `None` once the readable range is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails.
    pub async fn read_chunk(&mut self, max: usize) -> Result<Option<Vec<u8>>> {
        if self.position >= self.end || max == 0 {
            return Ok(None);
        }

        #[allow(clippy::cast_possible_truncation)]
        let len = self.remaining().min(max as u64) as usize;

        let chunk = match (&self.spool.backing, self.file.as_mut()) {
            (Backing::Memory(buf), _) => {
                let guard = buf.read().unwrap_or_else(PoisonError::into_inner);
                #[allow(clippy::cast_possible_truncation)]
                let start = self.position as usize;
                guard
                    .get(start..start + len)
                    .ok_or_else(|| {
                        Error::Internal(format!(
                            "spool holds {} bytes, read wanted {}",
                            guard.len(),
                            start + len
                        ))
                    })?
                    .to_vec()
            }
            (Backing::Disk { .. }, Some(file)) => {
                let mut chunk = vec![0u8; len];
                file.read_exact(&mut chunk).await?;
                chunk
            }
            (Backing::Disk { .. }, None) => {
                return Err(Error::Internal("disk spool reader not open".to_string()));
            }
        };

        self.position += len as u64;
        Ok(Some(chunk))
    }

    /// Read everything that remains.
    ///
    /// # Errors
    ///
    /// Returns an error if a read fails.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>> {
        #[allow(clippy::cast_possible_truncation)]
        let mut out = Vec::with_capacity(self.remaining().min(MAX_PREALLOCATION) as usize);
        while let Some(chunk) = self.read_chunk(crate::DEFAULT_CHUNK_SIZE).await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }
}
