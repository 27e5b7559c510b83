//! Common test utilities for `Rshare` integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rshare_core::config::{Config, StorageBackend};
use rshare_core::file::FileDescriptor;
use rshare_core::transfer::TransferCoordinator;

/// Configuration with in-memory spools and small chunks.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.storage.backend = StorageBackend::Memory;
    config.transfer.chunk_size = 1024;
    config
}

/// Configuration with disk spools under `dir`.
pub fn disk_config(dir: &std::path::Path) -> Config {
    let mut config = test_config();
    config.storage.backend = StorageBackend::Disk;
    config.storage.spool_dir = Some(dir.to_path_buf());
    config
}

/// Configuration with a short session time-to-live.
pub fn short_ttl_config(ttl: Duration) -> Config {
    let mut config = test_config();
    config.session.session_ttl = ttl;
    config
}

/// Create a coordinator from `config`.
pub fn coordinator_with(config: Config) -> Arc<TransferCoordinator> {
    Arc::new(TransferCoordinator::new(config).expect("Failed to create coordinator"))
}

/// Create a coordinator with the default test configuration.
pub fn coordinator() -> Arc<TransferCoordinator> {
    coordinator_with(test_config())
}

/// Create a temporary directory for spool files.
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Describe a file of `size` bytes.
pub fn file(name: &str, size: usize) -> FileDescriptor {
    FileDescriptor::guessed(name, size as u64)
}

/// Generate random bytes for testing.
pub fn random_bytes(size: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Upload `data` as file `index` of `code` through an upload sink.
pub async fn upload(coordinator: &TransferCoordinator, code: &str, index: usize, data: &[u8]) {
    let mut sink = coordinator
        .upload_sink(code, index)
        .expect("Failed to attach upload");
    for chunk in data.chunks(777) {
        sink.write(chunk).await.expect("Failed to write chunk");
    }
}

/// Download file `index` of `code` in full.
pub async fn download(coordinator: &TransferCoordinator, code: &str, index: usize) -> Vec<u8> {
    let mut out = Vec::new();
    coordinator
        .attach_download_stream(code, index, &mut out)
        .await
        .expect("Failed to download");
    out
}
