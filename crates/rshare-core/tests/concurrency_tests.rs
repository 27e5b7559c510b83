//! Tests for concurrent uploaders, downloaders and cancellation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use rshare_core::session::SessionStatus;
use rshare_core::transfer::TransferDirection;
use rshare_core::Error;

use common::{coordinator, coordinator_with, download, file, short_ttl_config, upload};

/// Wait until `count` downloaders are attached to the session.
async fn wait_for_downloaders(session: &rshare_core::session::TransferSession, count: usize) {
    while session.active_downloaders() < count {
        tokio::task::yield_now().await;
    }
}

/// Many downloaders of the same file each get the complete byte stream.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_downloaders_identical_streams() {
    let coordinator = coordinator();
    let data = common::random_bytes(200_000);
    let ticket = coordinator
        .create_session(vec![file("shared.bin", data.len())])
        .await
        .unwrap();
    let code = ticket.code.to_string();
    upload(&coordinator, &code, 0, &data).await;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let coordinator = Arc::clone(&coordinator);
        let code = code.clone();
        handles.push(tokio::spawn(async move {
            let mut source = coordinator.download_source(&code, 0).await.unwrap();
            let mut out = Vec::new();
            while let Some(chunk) = source.next_chunk().await.unwrap() {
                out.extend_from_slice(&chunk);
                tokio::task::yield_now().await;
            }
            out
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), data);
    }

    let snapshot = coordinator.progress(&code).unwrap();
    assert_eq!(snapshot.active_downloaders, 0);
    assert_eq!(snapshot.files[0].downloads, 16);
}

/// Different files of one session upload concurrently.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_uploads_of_different_files() {
    let coordinator = coordinator();
    let contents: Vec<Vec<u8>> = (0..4).map(|_| common::random_bytes(50_000)).collect();
    let files = contents
        .iter()
        .enumerate()
        .map(|(i, c)| file(&format!("part{i}.bin"), c.len()))
        .collect();
    let ticket = coordinator.create_session(files).await.unwrap();
    let code = ticket.code.to_string();

    let mut handles = Vec::new();
    for (index, content) in contents.iter().cloned().enumerate() {
        let coordinator = Arc::clone(&coordinator);
        let code = code.clone();
        handles.push(tokio::spawn(async move {
            coordinator
                .attach_upload_stream(&code, index, &content[..])
                .await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 50_000);
    }

    assert_eq!(
        coordinator.progress(&code).unwrap().status,
        SessionStatus::Completed
    );
    for (index, content) in contents.iter().enumerate() {
        assert_eq!(&download(&coordinator, &code, index).await, content);
    }
}

/// A second uploader for the same file is turned away.
#[tokio::test]
async fn test_second_uploader_rejected() {
    let coordinator = coordinator();
    let ticket = coordinator
        .create_session(vec![file("a.bin", 10)])
        .await
        .unwrap();
    let code = ticket.code.as_str();

    let mut first = coordinator.upload_sink(code, 0).unwrap();
    first.write(b"12345").await.unwrap();

    let err = coordinator
        .attach_upload_stream(code, 0, &b"67890"[..])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UploadInProgress(_)));

    first.write(b"67890").await.unwrap();
    assert!(first.is_complete());
}

/// Cancelling a session unblocks a download stuck on a slow sink.
#[tokio::test]
async fn test_cancel_unblocks_stalled_download() {
    let coordinator = coordinator();
    let data = common::random_bytes(64 * 1024);
    let ticket = coordinator
        .create_session(vec![file("big.bin", data.len())])
        .await
        .unwrap();
    let code = ticket.code.to_string();
    upload(&coordinator, &code, 0, &data).await;
    let session = coordinator.session(&code).unwrap();

    // Nobody reads from the other half, so writes stall once the pipe fills.
    let (writer, _reader) = tokio::io::duplex(64);
    let handle = {
        let coordinator = Arc::clone(&coordinator);
        let code = code.clone();
        tokio::spawn(async move { coordinator.attach_download_stream(&code, 0, writer).await })
    };

    wait_for_downloaders(&session, 1).await;
    coordinator.cancel_session(&code).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("download should unblock promptly")
        .unwrap();
    assert!(matches!(result, Err(Error::SessionCancelled(_))));
    assert_eq!(session.active_downloaders(), 0);
}

/// The TTL deadline unblocks a stalled download even without a sweep.
#[tokio::test(start_paused = true)]
async fn test_expiry_unblocks_stalled_download() {
    let coordinator = coordinator_with(short_ttl_config(Duration::from_secs(30)));
    let data = common::random_bytes(16 * 1024);
    let ticket = coordinator
        .create_session(vec![file("big.bin", data.len())])
        .await
        .unwrap();
    let code = ticket.code.to_string();
    upload(&coordinator, &code, 0, &data).await;

    let (writer, _reader) = tokio::io::duplex(64);
    let result = coordinator.attach_download_stream(&code, 0, writer).await;
    assert!(matches!(result, Err(Error::CodeExpired(_))));
}

/// A receiver waiting for a file is released when the upload finishes.
#[tokio::test]
async fn test_wait_for_file_released_by_upload() {
    let coordinator = coordinator();
    let ticket = coordinator
        .create_session(vec![file("later.txt", 5)])
        .await
        .unwrap();
    let code = ticket.code.to_string();

    let waiter = {
        let coordinator = Arc::clone(&coordinator);
        let code = code.clone();
        tokio::spawn(async move {
            coordinator.wait_for_file(&code, 0).await?;
            let mut out = Vec::new();
            coordinator
                .attach_download_stream(&code, 0, &mut out)
                .await?;
            Ok::<_, Error>(out)
        })
    };

    tokio::task::yield_now().await;
    upload(&coordinator, &code, 0, b"later").await;

    let out = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("waiter should be released")
        .unwrap()
        .unwrap();
    assert_eq!(out, b"later");
}

/// A receiver waiting for a file is released with an error on cancellation.
#[tokio::test]
async fn test_wait_for_file_released_by_cancel() {
    let coordinator = coordinator();
    let ticket = coordinator
        .create_session(vec![file("never.txt", 5)])
        .await
        .unwrap();
    let code = ticket.code.to_string();

    let waiter = {
        let coordinator = Arc::clone(&coordinator);
        let code = code.clone();
        tokio::spawn(async move { coordinator.wait_for_file(&code, 0).await })
    };

    tokio::task::yield_now().await;
    coordinator.cancel_session(&code).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("waiter should be released")
        .unwrap();
    assert!(matches!(
        result,
        Err(Error::SessionCancelled(_) | Error::CodeNotFound(_))
    ));
}

/// Download progress events are monotonic and end with a final event.
#[tokio::test]
async fn test_download_progress_events_monotonic() {
    let mut config = common::test_config();
    config.transfer.progress_min_bytes = 4096;
    let coordinator = coordinator_with(config);
    let data = common::random_bytes(40_000);
    let ticket = coordinator
        .create_session(vec![file("events.bin", data.len())])
        .await
        .unwrap();
    let code = ticket.code.to_string();
    upload(&coordinator, &code, 0, &data).await;

    let mut events = coordinator.subscribe();
    download(&coordinator, &code, 0).await;

    let mut last = 0;
    let mut count = 0;
    loop {
        let event = events.recv().await.unwrap();
        assert_eq!(event.direction, TransferDirection::Download);
        assert!(event.bytes_transferred >= last);
        last = event.bytes_transferred;
        count += 1;
        if event.done {
            break;
        }
    }
    assert_eq!(last, 40_000);
    assert!(count < 40, "events should be throttled, got {count}");
}

/// The background sweeper reclaims expired sessions and stops on shutdown.
#[tokio::test(start_paused = true)]
async fn test_background_sweeper() {
    let mut config = short_ttl_config(Duration::from_secs(5));
    config.session.sweep_interval = Duration::from_secs(1);
    let coordinator = coordinator_with(config);
    coordinator
        .create_session(vec![file("a.txt", 1)])
        .await
        .unwrap();

    let shutdown = tokio_util::sync::CancellationToken::new();
    let sweeper = coordinator.spawn_sweeper(shutdown.clone());

    tokio::time::sleep(Duration::from_secs(7)).await;
    assert!(coordinator.store().is_empty());

    shutdown.cancel();
    sweeper.await.unwrap();
}
