//! Tests for the session lifecycle as seen through the coordinator.

mod common;

use std::time::Duration;

use rshare_core::file::FileDescriptor;
use rshare_core::session::SessionStatus;
use rshare_core::Error;

use common::{coordinator, coordinator_with, download, file, short_ttl_config, upload};

/// A single 13-byte file uploads, reports Completed, and downloads intact.
#[tokio::test]
async fn test_hello_world_roundtrip() {
    let coordinator = coordinator();
    let ticket = coordinator
        .create_session(vec![FileDescriptor::new("a.txt", 13, "text/plain")])
        .await
        .unwrap();
    let code = ticket.code.as_str();
    assert_eq!(code.len(), 6);
    assert!(code.chars().all(|c| c.is_ascii_digit()));

    upload(&coordinator, code, 0, b"hello world!!").await;

    let progress = coordinator.progress(code).unwrap();
    assert_eq!(progress.status, SessionStatus::Completed);
    assert_eq!(progress.files[0].file_name, "a.txt");
    assert_eq!(progress.files[0].bytes_transferred, 13);
    assert_eq!(progress.files[0].total_bytes, 13);
    assert_eq!(progress.files[0].status, SessionStatus::Completed);

    assert_eq!(download(&coordinator, code, 0).await, b"hello world!!");
}

/// Bytes written in order are the bytes read back, for several files.
#[tokio::test]
async fn test_multi_file_roundtrip() {
    let coordinator = coordinator();
    let contents = [
        common::random_bytes(10_000),
        common::random_bytes(1),
        common::random_bytes(4096),
    ];
    let files = contents
        .iter()
        .enumerate()
        .map(|(i, c)| file(&format!("file{i}.bin"), c.len()))
        .collect();
    let ticket = coordinator.create_session(files).await.unwrap();
    let code = ticket.code.as_str();

    for (index, content) in contents.iter().enumerate() {
        upload(&coordinator, code, index, content).await;
    }

    for (index, content) in contents.iter().enumerate() {
        assert_eq!(&download(&coordinator, code, index).await, content);
    }
}

/// A file of exactly the size limit is accepted; one byte more is rejected.
#[tokio::test]
async fn test_file_size_boundary() {
    let mut config = common::test_config();
    config.session.max_file_size_bytes = 1024;
    let coordinator = coordinator_with(config);

    assert!(coordinator
        .create_session(vec![file("exact.bin", 1024)])
        .await
        .is_ok());

    let err = coordinator
        .create_session(vec![file("over.bin", 1025)])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::FileTooLarge { .. }));
    assert_eq!(err.kind(), rshare_core::ErrorKind::InvalidInput);
}

/// An empty file set is rejected.
#[tokio::test]
async fn test_empty_file_set_rejected() {
    let coordinator = coordinator();
    let err = coordinator.create_session(vec![]).await.unwrap_err();
    assert_eq!(err.kind(), rshare_core::ErrorKind::InvalidInput);
}

/// Downloading a half-uploaded file fails with NotReady.
#[tokio::test]
async fn test_download_half_uploaded_file_not_ready() {
    let coordinator = coordinator();
    let ticket = coordinator
        .create_session(vec![file("half.bin", 100)])
        .await
        .unwrap();
    let code = ticket.code.as_str();

    upload(&coordinator, code, 0, &[7u8; 50]).await;

    let err = coordinator.download_source(code, 0).await.unwrap_err();
    assert!(matches!(
        err,
        Error::FileNotReady {
            transferred: 50,
            total: 100,
            ..
        }
    ));
    assert_eq!(err.kind(), rshare_core::ErrorKind::NotReady);
}

/// A finished file is downloadable before the rest of the session completes.
#[tokio::test]
async fn test_partial_availability() {
    let coordinator = coordinator();
    let ticket = coordinator
        .create_session(vec![file("first.txt", 5), file("second.txt", 5)])
        .await
        .unwrap();
    let code = ticket.code.as_str();

    upload(&coordinator, code, 0, b"first").await;
    assert_eq!(
        coordinator.progress(code).unwrap().status,
        SessionStatus::Active
    );
    assert_eq!(download(&coordinator, code, 0).await, b"first");
    assert!(coordinator.download_source(code, 1).await.is_err());
}

/// Cancelling twice leaves the session cancelled and reports no error.
#[tokio::test]
async fn test_cancel_idempotent() {
    let coordinator = coordinator();
    let ticket = coordinator
        .create_session(vec![file("a.txt", 4)])
        .await
        .unwrap();
    let code = ticket.code.as_str();
    let session = coordinator.session(code).unwrap();

    coordinator.cancel_session(code).unwrap();
    coordinator.cancel_session(code).unwrap();

    assert_eq!(session.status(), SessionStatus::Cancelled);
    assert!(matches!(
        coordinator.progress(code),
        Err(Error::CodeNotFound(_))
    ));
}

/// Writing past the declared size cancels the session.
#[tokio::test]
async fn test_overflow_cancels_session() {
    let coordinator = coordinator();
    let ticket = coordinator
        .create_session(vec![file("small.txt", 4)])
        .await
        .unwrap();
    let code = ticket.code.as_str();

    let err = coordinator
        .attach_upload_stream(code, 0, &b"more than four"[..])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UploadOverflow { declared: 4, .. }));
    assert!(matches!(
        coordinator.progress(code),
        Err(Error::SessionCancelled(_))
    ));
}

/// An interrupted upload resumes from the recorded offset.
#[tokio::test]
async fn test_upload_resumes_at_offset() {
    let coordinator = coordinator();
    let data = common::random_bytes(3000);
    let ticket = coordinator
        .create_session(vec![file("resume.bin", data.len())])
        .await
        .unwrap();
    let code = ticket.code.as_str();

    let written = coordinator
        .attach_upload_stream(code, 0, &data[..1200])
        .await
        .unwrap();
    assert_eq!(written, 1200);
    assert_eq!(coordinator.upload_offset(code, 0).unwrap(), 1200);

    let sink = coordinator.upload_sink(code, 0).unwrap();
    assert_eq!(sink.offset(), 1200);
    assert_eq!(sink.remaining(), 1800);
    drop(sink);

    let offset = coordinator.upload_offset(code, 0).unwrap() as usize;
    let written = coordinator
        .attach_upload_stream(code, 0, &data[offset..])
        .await
        .unwrap();
    assert_eq!(written, 3000);
    assert_eq!(download(&coordinator, code, 0).await, data);
}

/// Without uploads, the session expires after its TTL and the code is freed.
#[tokio::test(start_paused = true)]
async fn test_ttl_expiry_frees_code() {
    let coordinator = coordinator_with(short_ttl_config(Duration::from_secs(60)));
    let ticket = coordinator
        .create_session(vec![file("a.txt", 4)])
        .await
        .unwrap();
    let code = ticket.code.to_string();

    tokio::time::advance(Duration::from_secs(59)).await;
    assert!(coordinator.progress(&code).is_ok());

    tokio::time::advance(Duration::from_secs(2)).await;
    let err = coordinator.progress(&code).unwrap_err();
    assert!(matches!(err, Error::CodeExpired(_)));

    // Evicted on lookup; the code is unbound now.
    assert!(matches!(
        coordinator.progress(&code),
        Err(Error::CodeNotFound(_))
    ));
    assert!(coordinator.store().is_empty());
}

/// The sweep reclaims expired sessions that nobody looks up.
#[tokio::test(start_paused = true)]
async fn test_sweep_reclaims_expired_sessions() {
    let coordinator = coordinator_with(short_ttl_config(Duration::from_secs(10)));
    for i in 0..5 {
        coordinator
            .create_session(vec![file(&format!("{i}.txt"), 1)])
            .await
            .unwrap();
    }
    assert_eq!(coordinator.store().len(), 5);

    tokio::time::advance(Duration::from_secs(11)).await;
    assert_eq!(coordinator.store().sweep(), 5);
    assert!(coordinator.store().is_empty());
}

/// Live sessions never share a code.
#[tokio::test]
async fn test_codes_unique_among_live_sessions() {
    let mut config = common::test_config();
    config.session.code_length = 4;
    config.session.code_retry_limit = 1000;
    let coordinator = coordinator_with(config);

    let mut codes = std::collections::HashSet::new();
    for _ in 0..500 {
        let ticket = coordinator
            .create_session(vec![file("a.txt", 1)])
            .await
            .unwrap();
        assert!(codes.insert(ticket.code.to_string()));
    }
    assert_eq!(coordinator.store().len(), 500);
}

/// Single-use sessions expire once every file has been downloaded.
#[tokio::test]
async fn test_single_use_session() {
    let mut config = common::test_config();
    config.session.single_use = true;
    let coordinator = coordinator_with(config);

    let ticket = coordinator
        .create_session(vec![file("once.txt", 4)])
        .await
        .unwrap();
    let code = ticket.code.as_str();
    upload(&coordinator, code, 0, b"once").await;

    assert_eq!(download(&coordinator, code, 0).await, b"once");
    assert!(matches!(
        coordinator.download_source(code, 0).await,
        Err(Error::CodeExpired(_))
    ));
}

/// Codes entered with separators resolve to the same session.
#[tokio::test]
async fn test_code_input_normalisation() {
    let coordinator = coordinator();
    let ticket = coordinator
        .create_session(vec![file("a.txt", 1)])
        .await
        .unwrap();
    let code = ticket.code.as_str();
    let spaced = format!("{} {}", &code[..3], &code[3..]);
    let dashed = format!("{}-{}", &code[..3], &code[3..]);

    assert!(coordinator.progress(&spaced).is_ok());
    assert!(coordinator.progress(&dashed).is_ok());
    assert!(matches!(
        coordinator.progress("12x456"),
        Err(Error::InvalidCodeFormat(_))
    ));
    assert!(matches!(
        coordinator.progress("12345"),
        Err(Error::InvalidCodeFormat(_))
    ));
}

/// Checksums appear in the snapshot once a file is complete.
#[tokio::test]
async fn test_checksum_in_snapshot() {
    let coordinator = coordinator();
    let ticket = coordinator
        .create_session(vec![file("a.txt", 13)])
        .await
        .unwrap();
    let code = ticket.code.as_str();
    upload(&coordinator, code, 0, b"hello world!!").await;

    let checksum = coordinator.progress(code).unwrap().files[0]
        .checksum
        .clone()
        .unwrap();
    assert_eq!(checksum.len(), 64);
    assert!(checksum.chars().all(|c| c.is_ascii_hexdigit()));
}

/// Disk spools round-trip and are removed with the session.
#[tokio::test]
async fn test_disk_backend_cleanup() {
    let dir = common::create_temp_dir();
    let coordinator = coordinator_with(common::disk_config(dir.path()));
    let data = common::random_bytes(5000);

    let ticket = coordinator
        .create_session(vec![file("disk.bin", data.len())])
        .await
        .unwrap();
    let code = ticket.code.as_str();
    upload(&coordinator, code, 0, &data).await;
    assert_eq!(download(&coordinator, code, 0).await, data);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

    coordinator.cancel_session(code).unwrap();
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
