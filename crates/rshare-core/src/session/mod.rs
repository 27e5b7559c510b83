//! Transfer session state machine.
//!
//! A [`TransferSession`] tracks one share: the declared files, how many bytes
//! of each have been uploaded, which downloaders are attached, and where the
//! session is in its lifecycle.
//!
//! ## States
//!
//! ```text
//! Pending ──first write──▶ Active ──all bytes──▶ Completed ──TTL──▶ Expired
//!    │                       │                      │
//!    └───────────────────────┴──abort / overflow────┴──────────▶ Cancelled
//! ```
//!
//! `Expired` and `Cancelled` are terminal. Expiry is detected lazily on every
//! access and by the store's sweep; entering a terminal state trips the
//! session's cancellation token so in-flight streams stop promptly.
//!
//! A consumed single-use session is the exception: it is `Expired` for new
//! lookups and [`TransferSession::closed`] observers, but downloads already
//! streaming run to completion because [`TransferSession::aborted`] stays
//! pending.
//!
//! All mutable state sits behind one short-lived lock that is never held
//! across I/O.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::code::ShareCode;
use crate::error::{Error, Result};
use crate::file::FileDescriptor;
use crate::storage::{Spool, SpoolReader};

/// Lifecycle state of a session (or of a single file within it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, no bytes received yet
    Pending,
    /// Upload in progress
    Active,
    /// Every declared byte received
    Completed,
    /// Time-to-live elapsed (or consumed, for single-use sessions)
    Expired,
    /// Aborted by the sender, the coordinator, or an overflow
    Cancelled,
}

impl SessionStatus {
    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Expired | Self::Cancelled)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Active => write!(f, "Active"),
            Self::Completed => write!(f, "Completed"),
            Self::Expired => write!(f, "Expired"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Progress of one file.
#[derive(Debug, Clone, Serialize)]
pub struct FileProgress {
    /// Position in the session's file list
    pub index: usize,
    /// File name
    pub file_name: String,
    /// MIME type
    pub mime_type: String,
    /// Bytes uploaded so far
    pub bytes_transferred: u64,
    /// Declared size
    pub total_bytes: u64,
    /// File-level status (the session status once the session is terminal)
    pub status: SessionStatus,
    /// Hex SHA-256 of the content, once fully uploaded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Completed downloads of this file
    pub downloads: u32,
}

impl FileProgress {
    /// Whether the file can be downloaded.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.bytes_transferred == self.total_bytes
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    /// Share code
    pub code: ShareCode,
    /// Session status
    pub status: SessionStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Expiry time
    pub expires_at: DateTime<Utc>,
    /// Seconds until expiry
    pub expires_in_secs: u64,
    /// Per-file progress, in declaration order
    pub files: Vec<FileProgress>,
    /// Downloaders currently attached
    pub active_downloaders: usize,
    /// Bytes uploaded across all files
    pub bytes_transferred: u64,
    /// Declared bytes across all files
    pub total_bytes: u64,
}

impl SessionSnapshot {
    /// Get overall upload progress as a percentage (0.0 - 100.0).
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            100.0
        } else {
            (self.bytes_transferred as f64 / self.total_bytes as f64) * 100.0
        }
    }
}

#[derive(Debug)]
struct FileState {
    uploaded: u64,
    uploading: bool,
    hasher: Option<Sha256>,
    checksum: Option<String>,
    downloads: u32,
}

#[derive(Debug)]
struct Downloader {
    file_index: usize,
    sent: u64,
}

#[derive(Debug)]
struct SessionState {
    status: SessionStatus,
    files: Vec<FileState>,
    downloaders: HashMap<Uuid, Downloader>,
}

/// State and bytes of one share.
pub struct TransferSession {
    id: Uuid,
    code: ShareCode,
    files: Vec<FileDescriptor>,
    spools: Vec<Arc<Spool>>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    deadline: Instant,
    single_use: bool,
    state: Mutex<SessionState>,
    abort: CancellationToken,
    closed: CancellationToken,
    changes: watch::Sender<u64>,
}

impl std::fmt::Debug for TransferSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferSession")
            .field("id", &self.id)
            .field("code", &self.code)
            .field("files", &self.files.len())
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl TransferSession {
    /// Create a session whose TTL clock starts now.
    ///
    /// `spools` must hold one spool per file, in the same order.
    pub(crate) fn new(
        id: Uuid,
        code: ShareCode,
        files: Vec<FileDescriptor>,
        spools: Vec<Arc<Spool>>,
        ttl: Duration,
        single_use: bool,
    ) -> Self {
        debug_assert_eq!(files.len(), spools.len());

        let file_states: Vec<FileState> = files
            .iter()
            .map(|file| {
                if file.size_bytes == 0 {
                    FileState {
                        uploaded: 0,
                        uploading: false,
                        hasher: None,
                        checksum: Some(to_hex(&Sha256::new().finalize())),
                        downloads: 0,
                    }
                } else {
                    FileState {
                        uploaded: 0,
                        uploading: false,
                        hasher: Some(Sha256::new()),
                        checksum: None,
                        downloads: 0,
                    }
                }
            })
            .collect();

        let status = if files.iter().all(|f| f.size_bytes == 0) {
            SessionStatus::Completed
        } else {
            SessionStatus::Pending
        };

        let created_at = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let (changes, _) = watch::channel(0);

        Self {
            id,
            code,
            files,
            spools,
            created_at,
            expires_at,
            deadline: Instant::now() + ttl,
            single_use,
            state: Mutex::new(SessionState {
                status,
                files: file_states,
                downloaders: HashMap::new(),
            }),
            abort: CancellationToken::new(),
            closed: CancellationToken::new(),
            changes,
        }
    }

    /// Unique identifier of this session (distinct from the reusable code).
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Share code bound to this session.
    #[must_use]
    pub const fn code(&self) -> &ShareCode {
        &self.code
    }

    /// Declared files, in order.
    #[must_use]
    pub fn files(&self) -> &[FileDescriptor] {
        &self.files
    }

    /// Declared file at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileIndexOutOfRange`] for an unknown index.
    pub fn file(&self, index: usize) -> Result<&FileDescriptor> {
        self.files.get(index).ok_or(Error::FileIndexOutOfRange {
            index,
            count: self.files.len(),
        })
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Expiry time.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Current status, applying a due expiry first.
    pub fn status(&self) -> SessionStatus {
        let mut state = self.lock();
        self.refresh_expiry(&mut state);
        state.status
    }

    /// Whether the session has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Fail unless the session can still be used.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CodeExpired`] or [`Error::SessionCancelled`].
    pub fn ensure_usable(&self) -> Result<()> {
        let mut state = self.lock();
        self.refresh_expiry(&mut state);
        self.check_usable(&state)
    }

    /// Number of downloaders currently attached.
    pub fn active_downloaders(&self) -> usize {
        self.lock().downloaders.len()
    }

    /// Bytes of file `index` received so far; uploads resume from here.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown index.
    pub fn upload_offset(&self, index: usize) -> Result<u64> {
        self.file(index)?;
        Ok(self.lock().files[index].uploaded)
    }

    /// Abort the session.
    ///
    /// Returns `true` if this call moved the session to `Cancelled`.
    pub fn cancel(&self) -> bool {
        let mut state = self.lock();
        self.refresh_expiry(&mut state);
        if state.status.is_terminal() {
            return false;
        }
        self.enter_terminal(&mut state, SessionStatus::Cancelled);
        tracing::info!("Session {} cancelled", self.code);
        true
    }

    /// Expire the session if its deadline has passed.
    ///
    /// Returns `true` if this call moved the session to `Expired`.
    pub fn expire_if_due(&self) -> bool {
        let mut state = self.lock();
        self.refresh_expiry(&mut state)
    }

    /// Resolves once the session reaches any terminal state or its
    /// deadline passes.
    pub async fn closed(&self) {
        self.until(&self.closed).await;
    }

    /// Resolves once in-flight streams must stop: the session was cancelled
    /// or expired by time. Single-use consumption does not abort.
    pub async fn aborted(&self) {
        self.until(&self.abort).await;
    }

    async fn until(&self, token: &CancellationToken) {
        tokio::select! {
            () = token.cancelled() => {}
            () = tokio::time::sleep_until(self.deadline) => {
                self.expire_if_due();
            }
        }
    }

    /// The error describing why the session can no longer be used.
    pub fn closed_error(&self) -> Error {
        let status = self.status();
        self.terminal_error(status)
    }

    /// Take a point-in-time snapshot. Never waits on transfer I/O.
    pub fn snapshot(&self) -> SessionSnapshot {
        let mut state = self.lock();
        self.refresh_expiry(&mut state);

        let files: Vec<FileProgress> = self
            .files
            .iter()
            .zip(&state.files)
            .enumerate()
            .map(|(index, (file, fs))| {
                let status = if state.status.is_terminal() {
                    state.status
                } else if fs.uploaded == file.size_bytes {
                    SessionStatus::Completed
                } else if fs.uploaded > 0 || fs.uploading {
                    SessionStatus::Active
                } else {
                    SessionStatus::Pending
                };

                FileProgress {
                    index,
                    file_name: file.name.clone(),
                    mime_type: file.mime_type.clone(),
                    bytes_transferred: fs.uploaded,
                    total_bytes: file.size_bytes,
                    status,
                    checksum: fs.checksum.clone(),
                    downloads: fs.downloads,
                }
            })
            .collect();

        SessionSnapshot {
            code: self.code.clone(),
            status: state.status,
            created_at: self.created_at,
            expires_at: self.expires_at,
            expires_in_secs: self
                .deadline
                .saturating_duration_since(Instant::now())
                .as_secs(),
            bytes_transferred: files.iter().map(|f| f.bytes_transferred).sum(),
            total_bytes: files.iter().map(|f| f.total_bytes).sum(),
            active_downloaders: state.downloaders.len(),
            files,
        }
    }

    /// Wait until file `index` is fully uploaded.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown index, or [`Error::CodeExpired`] /
    /// [`Error::SessionCancelled`] if the session closes first.
    pub async fn wait_file_ready(&self, index: usize) -> Result<()> {
        let size = self.file(index)?.size_bytes;
        let mut changes = self.changes.subscribe();

        loop {
            {
                let mut state = self.lock();
                self.refresh_expiry(&mut state);
                self.check_usable(&state)?;
                if state.files[index].uploaded == size {
                    return Ok(());
                }
            }

            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        return Err(Error::Internal("session change feed closed".to_string()));
                    }
                }
                () = self.closed() => return Err(self.closed_error()),
            }
        }
    }

    /// Claim the upload slot of file `index`, returning the resume offset.
    pub(crate) fn begin_upload(&self, index: usize) -> Result<u64> {
        let file = self.file(index)?;
        let mut state = self.lock();
        self.refresh_expiry(&mut state);
        self.check_usable(&state)?;

        let fs = &mut state.files[index];
        if fs.uploading {
            return Err(Error::UploadInProgress(file.name.clone()));
        }
        fs.uploading = true;
        let offset = fs.uploaded;
        drop(state);

        self.notify();
        Ok(offset)
    }

    /// Release the upload slot of file `index`.
    pub(crate) fn end_upload(&self, index: usize) {
        if let Some(fs) = self.lock().files.get_mut(index) {
            fs.uploading = false;
        }
        self.notify();
    }

    /// Append `data` to file `index`, returning the file's new byte count.
    ///
    /// The caller must hold the file's upload slot.
    pub(crate) async fn write_upload(&self, index: usize, data: &[u8]) -> Result<u64> {
        let file = self.file(index)?;
        let len = data.len() as u64;

        {
            let mut state = self.lock();
            self.refresh_expiry(&mut state);
            self.check_usable(&state)?;

            let uploaded = state.files[index].uploaded;
            let attempted = uploaded.saturating_add(len);
            if attempted > file.size_bytes {
                self.enter_terminal(&mut state, SessionStatus::Cancelled);
                tracing::warn!(
                    "Upload overflow on session {} file '{}': declared {}, got {}; session cancelled",
                    self.code,
                    file.name,
                    file.size_bytes,
                    attempted
                );
                return Err(Error::UploadOverflow {
                    file: file.name.clone(),
                    declared: file.size_bytes,
                    attempted,
                });
            }
            if len == 0 {
                return Ok(uploaded);
            }
        }

        self.spools[index].append(data).await?;

        let (uploaded, file_complete) = {
            let mut state = self.lock();
            if state.status.is_terminal() {
                return Err(self.terminal_error(state.status));
            }

            let fs = &mut state.files[index];
            fs.uploaded += len;
            if let Some(hasher) = fs.hasher.as_mut() {
                hasher.update(data);
            }
            let uploaded = fs.uploaded;
            let file_complete = uploaded == file.size_bytes;
            if file_complete {
                fs.checksum = fs.hasher.take().map(|h| to_hex(&h.finalize()));
            }

            if state.status == SessionStatus::Pending {
                state.status = SessionStatus::Active;
                tracing::debug!("Session {} is now active", self.code);
            }
            if file_complete
                && self
                    .files
                    .iter()
                    .zip(&state.files)
                    .all(|(f, fs)| fs.uploaded == f.size_bytes)
            {
                state.status = SessionStatus::Completed;
                tracing::info!("Session {} upload completed", self.code);
            }

            (uploaded, file_complete)
        };

        if file_complete {
            tracing::debug!("File '{}' of session {} complete", file.name, self.code);
            if let Err(e) = self.spools[index].seal().await {
                tracing::warn!("Failed to seal spool for '{}': {}", file.name, e);
            }
        }

        self.notify();
        Ok(uploaded)
    }

    /// SHA-256 of file `index`, once fully uploaded.
    pub(crate) fn file_checksum(&self, index: usize) -> Option<String> {
        self.lock().files.get(index)?.checksum.clone()
    }

    /// Attach a downloader to file `index`, returning its id and a reader
    /// over the complete file.
    pub(crate) async fn begin_download(&self, index: usize) -> Result<(Uuid, SpoolReader)> {
        let file = self.file(index)?;
        let id = Uuid::new_v4();
        {
            let mut state = self.lock();
            self.refresh_expiry(&mut state);
            self.check_usable(&state)?;

            let uploaded = state.files[index].uploaded;
            if uploaded < file.size_bytes {
                return Err(Error::FileNotReady {
                    file: file.name.clone(),
                    transferred: uploaded,
                    total: file.size_bytes,
                });
            }
            state.downloaders.insert(
                id,
                Downloader {
                    file_index: index,
                    sent: 0,
                },
            );
        }

        match self.spools[index].reader(file.size_bytes).await {
            Ok(reader) => {
                tracing::debug!("Downloader {} attached to '{}'", id, file.name);
                self.notify();
                Ok((id, reader))
            }
            Err(e) => {
                self.lock().downloaders.remove(&id);
                Err(e)
            }
        }
    }

    /// Record bytes delivered to downloader `id`.
    pub(crate) fn record_download(&self, id: Uuid, sent: u64) {
        if let Some(downloader) = self.lock().downloaders.get_mut(&id) {
            downloader.sent = downloader.sent.max(sent);
        }
    }

    /// Detach downloader `id`; `completed` marks a full delivery.
    pub(crate) fn finish_download(&self, id: Uuid, completed: bool) {
        let mut state = self.lock();
        let Some(downloader) = state.downloaders.remove(&id) else {
            return;
        };

        if completed {
            state.files[downloader.file_index].downloads += 1;
            tracing::debug!(
                "Downloader {} finished file {} ({} bytes)",
                id,
                downloader.file_index,
                downloader.sent
            );

            if self.single_use
                && state.status == SessionStatus::Completed
                && state.files.iter().all(|fs| fs.downloads > 0)
            {
                // In-flight downloads keep running; new attaches are refused.
                state.status = SessionStatus::Expired;
                self.closed.cancel();
                tracing::info!("Single-use session {} consumed", self.code);
            }
        }
        drop(state);

        self.notify();
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }

    fn refresh_expiry(&self, state: &mut SessionState) -> bool {
        if state.status.is_terminal() || Instant::now() < self.deadline {
            return false;
        }
        self.enter_terminal(state, SessionStatus::Expired);
        tracing::info!("Session {} expired", self.code);
        true
    }

    fn enter_terminal(&self, state: &mut SessionState, status: SessionStatus) {
        state.status = status;
        self.abort.cancel();
        self.closed.cancel();
        self.notify();
    }

    fn check_usable(&self, state: &SessionState) -> Result<()> {
        if state.status.is_terminal() {
            Err(self.terminal_error(state.status))
        } else {
            Ok(())
        }
    }

    fn terminal_error(&self, status: SessionStatus) -> Error {
        match status {
            SessionStatus::Expired => Error::CodeExpired(self.code.to_string()),
            SessionStatus::Cancelled => Error::SessionCancelled(self.code.to_string()),
            other => Error::Internal(format!("session {} is {other}", self.code)),
        }
    }
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
}
