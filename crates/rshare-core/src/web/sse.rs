//! Server-Sent Events (SSE) for real-time progress updates.
//!
//! A client subscribed to a session first receives a `snapshot` event, then a
//! `progress` event for every throttled upload or download update of that
//! session, and finally a `closed` event when the session is cancelled,
//! expires or, if single-use, has been fully downloaded.

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::session::SessionSnapshot;
use crate::transfer::ProgressEvent;

use super::error::ApiResult;
use super::state::SharedState;

/// Payload of the final `closed` event.
#[derive(Debug, Serialize)]
struct ClosedEvent {
    code: String,
    message: String,
}

fn snapshot_event(snapshot: &SessionSnapshot) -> Event {
    let data = serde_json::to_string(snapshot).unwrap_or_default();
    Event::default().event("snapshot").data(data)
}

fn progress_event(progress: &ProgressEvent) -> Event {
    let data = serde_json::to_string(progress).unwrap_or_default();
    Event::default().event("progress").data(data)
}

/// GET /api/sessions/{code}/events - SSE stream of a session's progress.
pub async fn session_events(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let session = state.coordinator.session(&code)?;
    let mut events = state.coordinator.subscribe();

    let stream = async_stream::stream! {
        yield Ok(snapshot_event(&session.snapshot()));

        loop {
            let received = tokio::select! {
                () = session.closed() => None,
                received = events.recv() => Some(received),
            };

            match received {
                None => {
                    let closed = ClosedEvent {
                        code: session.code().to_string(),
                        message: session.closed_error().to_string(),
                    };
                    let data = serde_json::to_string(&closed).unwrap_or_default();
                    yield Ok(Event::default().event("closed").data(data));
                    break;
                }
                Some(Ok(event)) if &event.code == session.code() => {
                    yield Ok(progress_event(&event));
                }
                Some(Ok(_)) => {}
                Some(Err(RecvError::Lagged(skipped))) => {
                    tracing::debug!("SSE subscriber lagged by {} events", skipped);
                    yield Ok(snapshot_event(&session.snapshot()));
                }
                Some(Err(RecvError::Closed)) => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::ShareCode;
    use crate::transfer::TransferDirection;

    #[test]
    fn test_progress_event_payload() {
        let progress = ProgressEvent {
            code: ShareCode::parse("123456", 6).unwrap(),
            file_index: 1,
            file_name: "test.txt".to_string(),
            direction: TransferDirection::Upload,
            bytes_transferred: 500,
            total_bytes: 1000,
            downloader_id: None,
            done: false,
        };

        let data = serde_json::to_value(&progress).unwrap();
        assert_eq!(data["file_index"], 1);
        assert_eq!(data["file_name"], "test.txt");
        assert_eq!(data["bytes_transferred"], 500);

        // Building the event must not panic on ordinary payloads.
        let _ = progress_event(&progress);
    }
}
