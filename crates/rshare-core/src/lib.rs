//! # Rshare Core Library
//!
//! `rshare-core` provides the transfer-session core of Rshare, an ephemeral
//! file-sharing service: a sender declares a set of files, receives a short
//! numeric code, and receivers use that code to download the same bytes.
//!
//! ## Features
//!
//! - **Numeric share codes**: 6-digit codes drawn from the OS CSPRNG
//! - **Streaming delivery**: files become downloadable as soon as each one
//!   finishes uploading
//! - **Concurrent readers**: any number of downloaders per file, one uploader
//! - **Expiry**: sessions are reclaimed after their time-to-live
//!
//! ## Modules
//!
//! - [`code`] - Share code generation and validation
//! - [`config`] - Configuration management
//! - [`mod@file`] - File descriptors and validation
//! - [`storage`] - Append-only byte spools (memory or disk)
//! - [`session`] - Per-share state machine
//! - [`store`] - Registry of live sessions keyed by code
//! - [`transfer`] - Coordinator, upload sinks and download sources
//! - [`web`] - HTTP delivery gateway
//!
//! ## Example
//!
//! ```rust,ignore
//! use rshare_core::config::Config;
//! use rshare_core::file::FileDescriptor;
//! use rshare_core::transfer::TransferCoordinator;
//!
//! let coordinator = TransferCoordinator::new(Config::default())?;
//! let ticket = coordinator
//!     .create_session(vec![FileDescriptor::new("a.txt", 13, "text/plain")])
//!     .await?;
//! println!("Share code: {}", ticket.code);
//!
//! let mut sink = coordinator.upload_sink(ticket.code.as_str(), 0)?;
//! sink.write(b"hello world!!").await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod code;
pub mod config;
pub mod error;
pub mod file;
pub mod session;
pub mod storage;
pub mod store;
pub mod transfer;

#[cfg(feature = "web")]
pub mod web;

pub use error::{Error, ErrorKind, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Largest accepted file (5 GiB)
pub const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Default session time-to-live in seconds (24 hours)
pub const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;

/// Default chunk size for streaming (64 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
