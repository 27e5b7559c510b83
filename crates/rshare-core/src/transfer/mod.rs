//! Transfer coordination for Rshare.
//!
//! The [`TransferCoordinator`] is the entry point for everything that moves
//! bytes:
//!
//! - Creating sessions from a declared file set
//! - Handing out upload sinks and download sources
//! - Chunked, cancellable copies from readers and into writers
//! - Progress snapshots and a broadcast feed of progress events
//!
//! ## Streaming
//!
//! Uploads and downloads are chunked loops (`transfer.chunk_size`, 64 KiB by
//! default). Every chunk is a suspension point that also watches the session
//! for abort, so cancelling or expiring a session unblocks in-flight
//! streams promptly.
//!
//! A file becomes downloadable as soon as its own bytes are complete, even
//! while other files of the same session are still uploading.

pub mod progress;

pub use progress::{ProgressEvent, ProgressThrottle, TransferDirection};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::code::ShareCode;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::file::FileDescriptor;
use crate::session::{SessionSnapshot, TransferSession};
use crate::storage::SpoolReader;
use crate::store::SessionStore;

/// Capacity of the progress event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// What a sender receives after creating a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionTicket {
    /// Share code to hand to receivers
    pub code: ShareCode,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Expiry time
    pub expires_at: DateTime<Utc>,
    /// Seconds until expiry
    pub expires_in_secs: u64,
    /// Accepted files, with MIME types filled in
    pub files: Vec<FileDescriptor>,
}

/// Orchestrates sessions and the byte streams attached to them.
#[derive(Debug)]
pub struct TransferCoordinator {
    store: Arc<SessionStore>,
    config: Config,
    events: broadcast::Sender<ProgressEvent>,
}

impl TransferCoordinator {
    /// Create a coordinator with an empty session store.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let store = SessionStore::new(config.session.clone(), config.storage.clone())?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            store: Arc::new(store),
            config,
            events,
        })
    }

    /// Configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The underlying session store.
    #[must_use]
    pub const fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Create a session for `files` and start its TTL clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the file set is empty, a file or the whole set is
    /// too large, or no code could be allocated.
    pub async fn create_session(&self, files: Vec<FileDescriptor>) -> Result<SessionTicket> {
        let files: Vec<FileDescriptor> = files.into_iter().map(FileDescriptor::normalized).collect();

        if let Some(limit) = self.config.session.max_session_bytes {
            let total = files
                .iter()
                .try_fold(0u64, |acc, f| acc.checked_add(f.size_bytes))
                .unwrap_or(u64::MAX);
            if total > limit {
                tracing::warn!("Rejected session of {} bytes (limit {})", total, limit);
                return Err(Error::SessionTooLarge { total, limit });
            }
        }

        let session = self.store.register(files).await?;
        let snapshot = session.snapshot();

        Ok(SessionTicket {
            code: session.code().clone(),
            created_at: session.created_at(),
            expires_at: session.expires_at(),
            expires_in_secs: snapshot.expires_in_secs,
            files: session.files().to_vec(),
        })
    }

    /// Find the usable session bound to `code`.
    ///
    /// # Errors
    ///
    /// Returns an error if the code is malformed, unknown, expired or
    /// cancelled.
    pub fn session(&self, code: &str) -> Result<Arc<TransferSession>> {
        self.store.lookup(code)
    }

    /// Claim the upload slot of file `index`.
    ///
    /// The sink resumes at the file's current byte count; see
    /// [`UploadSink::offset`].
    ///
    /// # Errors
    ///
    /// Returns an error if the session is not usable, the index is unknown,
    /// or another uploader already holds the file.
    pub fn upload_sink(&self, code: &str, index: usize) -> Result<UploadSink> {
        let session = self.store.lookup(code)?;
        let offset = session.begin_upload(index)?;
        let file = session.file(index)?.clone();

        tracing::debug!(
            "Upload of '{}' on session {} attached at offset {}",
            file.name,
            session.code(),
            offset
        );

        Ok(UploadSink {
            throttle: ProgressThrottle::from_config(&self.config.transfer, offset),
            events: self.events.clone(),
            session,
            index,
            file,
            offset,
        })
    }

    /// Copy `reader` into file `index` until EOF.
    ///
    /// Returns the file's byte count afterwards. A short stream leaves the
    /// file partially uploaded so a later attach can continue from there.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload cannot be attached, the reader fails,
    /// the data exceeds the declared size, or the session closes.
    pub async fn attach_upload_stream<R>(&self, code: &str, index: usize, mut reader: R) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        let mut sink = self.upload_sink(code, index)?;
        let session = Arc::clone(&sink.session);
        let mut buf = vec![0u8; self.config.transfer.chunk_size];

        loop {
            let n = tokio::select! {
                biased;
                () = session.aborted() => return Err(session.closed_error()),
                read = reader.read(&mut buf) => read?,
            };
            if n == 0 {
                break;
            }
            sink.write(&buf[..n]).await?;
        }

        if !sink.is_complete() {
            tracing::debug!(
                "Upload of '{}' stopped at {}/{} bytes",
                sink.file.name,
                sink.offset,
                sink.file.size_bytes
            );
        }
        Ok(sink.offset())
    }

    /// Open a reader over completed file `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileNotReady`] if the file is still uploading, or an
    /// error if the session is not usable.
    pub async fn download_source(&self, code: &str, index: usize) -> Result<DownloadSource> {
        let session = self.store.lookup(code)?;
        let file = session.file(index)?.clone();
        let (downloader_id, reader) = session.begin_download(index).await?;
        let checksum = session.file_checksum(index);

        Ok(DownloadSource {
            throttle: ProgressThrottle::from_config(&self.config.transfer, 0),
            events: self.events.clone(),
            chunk_size: self.config.transfer.chunk_size,
            finished: false,
            session,
            index,
            file,
            checksum,
            downloader_id,
            reader,
        })
    }

    /// Copy completed file `index` into `writer`.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileNotReady`] if the file is incomplete, or an error
    /// if the writer fails or the session closes mid-stream.
    pub async fn attach_download_stream<W>(&self, code: &str, index: usize, mut writer: W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut source = self.download_source(code, index).await?;
        let session = Arc::clone(&source.session);

        while let Some(chunk) = source.next_chunk().await? {
            tokio::select! {
                biased;
                () = session.aborted() => return Err(session.closed_error()),
                written = writer.write_all(&chunk) => written?,
            }
        }
        writer.flush().await?;

        Ok(source.position())
    }

    /// Wait until file `index` has been fully uploaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is not usable or closes while waiting.
    pub async fn wait_for_file(&self, code: &str, index: usize) -> Result<()> {
        let session = self.store.lookup(code)?;
        session.wait_file_ready(index).await
    }

    /// Bytes of file `index` received so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is not usable or the index is unknown.
    pub fn upload_offset(&self, code: &str, index: usize) -> Result<u64> {
        self.store.lookup(code)?.upload_offset(index)
    }

    /// Current progress of the session bound to `code`.
    ///
    /// # Errors
    ///
    /// Returns an error if the code is malformed, unknown, expired or
    /// cancelled.
    pub fn progress(&self, code: &str) -> Result<SessionSnapshot> {
        Ok(self.store.lookup(code)?.snapshot())
    }

    /// Cancel the session bound to `code`. Cancelling twice is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCodeFormat`] for malformed input.
    pub fn cancel_session(&self, code: &str) -> Result<()> {
        self.store.close(code)
    }

    /// Subscribe to progress events of every session.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    /// Sweep closed sessions every `session.sweep_interval` until `shutdown`.
    pub fn spawn_sweeper(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        Arc::clone(&self.store).spawn_sweeper(self.config.session.sweep_interval, shutdown)
    }
}

/// Writable end of one file's upload.
///
/// Holds the file's upload slot until dropped.
#[derive(Debug)]
pub struct UploadSink {
    session: Arc<TransferSession>,
    index: usize,
    file: FileDescriptor,
    offset: u64,
    throttle: ProgressThrottle,
    events: broadcast::Sender<ProgressEvent>,
}

impl UploadSink {
    /// Bytes of the file received so far.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// The file being uploaded.
    #[must_use]
    pub const fn file(&self) -> &FileDescriptor {
        &self.file
    }

    /// Bytes still expected.
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.file.size_bytes - self.offset
    }

    /// Whether every declared byte has been received.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.offset == self.file.size_bytes
    }

    /// Append `data`, returning the new byte count of the file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UploadOverflow`] (cancelling the session) if `data`
    /// would exceed the declared size, or an error if the session is closed
    /// or the write fails.
    pub async fn write(&mut self, data: &[u8]) -> Result<u64> {
        let uploaded = self.session.write_upload(self.index, data).await?;
        self.offset = uploaded;

        let done = self.is_complete();
        if !data.is_empty() && self.throttle.should_emit(uploaded, done) {
            let _ = self.events.send(ProgressEvent {
                code: self.session.code().clone(),
                file_index: self.index,
                file_name: self.file.name.clone(),
                direction: TransferDirection::Upload,
                bytes_transferred: uploaded,
                total_bytes: self.file.size_bytes,
                downloader_id: None,
                done,
            });
        }

        Ok(uploaded)
    }
}

impl Drop for UploadSink {
    fn drop(&mut self) {
        self.session.end_upload(self.index);
    }
}

/// Readable end of one completed file.
///
/// Each source is an independent cursor; dropping it before the end detaches
/// the downloader without counting a completed download.
#[derive(Debug)]
pub struct DownloadSource {
    session: Arc<TransferSession>,
    index: usize,
    file: FileDescriptor,
    checksum: Option<String>,
    downloader_id: Uuid,
    reader: SpoolReader,
    chunk_size: usize,
    throttle: ProgressThrottle,
    events: broadcast::Sender<ProgressEvent>,
    finished: bool,
}

impl DownloadSource {
    /// The file being downloaded.
    #[must_use]
    pub const fn file(&self) -> &FileDescriptor {
        &self.file
    }

    /// Hex SHA-256 of the file's content.
    #[must_use]
    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    /// Identifier of this downloader.
    #[must_use]
    pub const fn downloader_id(&self) -> Uuid {
        self.downloader_id
    }

    /// Bytes returned so far.
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.reader.position()
    }

    /// Bytes left to return.
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.reader.remaining()
    }

    /// Next chunk of the file, or `None` once every byte has been returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CodeExpired`] or [`Error::SessionCancelled`] if the
    /// session closes, or an error if the read fails.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.finished {
            return Ok(None);
        }

        let chunk = tokio::select! {
            biased;
            () = self.session.aborted() => return Err(self.session.closed_error()),
            chunk = self.reader.read_chunk(self.chunk_size) => chunk?,
        };

        let position = self.reader.position();
        let done = chunk.is_none();
        if done {
            self.finished = true;
            self.session.finish_download(self.downloader_id, true);
        } else {
            self.session.record_download(self.downloader_id, position);
        }

        if self.throttle.should_emit(position, done) {
            let _ = self.events.send(ProgressEvent {
                code: self.session.code().clone(),
                file_index: self.index,
                file_name: self.file.name.clone(),
                direction: TransferDirection::Download,
                bytes_transferred: position,
                total_bytes: self.file.size_bytes,
                downloader_id: Some(self.downloader_id),
                done,
            });
        }

        Ok(chunk)
    }

    /// Turn the source into a stream of chunks.
    pub fn into_stream(mut self) -> impl Stream<Item = Result<Vec<u8>>> + Send + 'static {
        async_stream::try_stream! {
            while let Some(chunk) = self.next_chunk().await? {
                yield chunk;
            }
        }
    }
}

impl Drop for DownloadSource {
    fn drop(&mut self) {
        if !self.finished {
            self.session.finish_download(self.downloader_id, false);
        }
    }
}
