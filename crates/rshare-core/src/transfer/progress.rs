//! Progress events and emission throttling.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use crate::code::ShareCode;
use crate::config::TransferConfig;

/// Transfer direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    /// Sender to server
    Upload,
    /// Server to receiver
    Download,
}

/// Byte progress of one upload or download stream.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    /// Session code
    pub code: ShareCode,
    /// File index within the session
    pub file_index: usize,
    /// File name
    pub file_name: String,
    /// Upload or download
    pub direction: TransferDirection,
    /// Bytes moved so far (absolute offset for uploads)
    pub bytes_transferred: u64,
    /// Declared size of the file
    pub total_bytes: u64,
    /// Downloader that produced the event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloader_id: Option<Uuid>,
    /// Whether this is the final event of the stream
    pub done: bool,
}

impl ProgressEvent {
    /// Get progress as a percentage (0.0 - 100.0).
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            100.0
        } else {
            (self.bytes_transferred as f64 / self.total_bytes as f64) * 100.0
        }
    }
}

/// Rate limiter for progress events.
///
/// An event passes when at least `min_bytes` have moved or `min_interval`
/// has elapsed since the last emitted event. Final events always pass.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    min_bytes: u64,
    min_interval: Duration,
    last_bytes: u64,
    last_emit: Instant,
}

impl ProgressThrottle {
    /// Create a throttle starting at `start_bytes`.
    #[must_use]
    pub fn new(min_bytes: u64, min_interval: Duration, start_bytes: u64) -> Self {
        Self {
            min_bytes,
            min_interval,
            last_bytes: start_bytes,
            last_emit: Instant::now(),
        }
    }

    /// Create a throttle from transfer settings.
    #[must_use]
    pub fn from_config(config: &TransferConfig, start_bytes: u64) -> Self {
        Self::new(
            config.progress_min_bytes,
            config.progress_min_interval,
            start_bytes,
        )
    }

    /// Decide whether progress at `bytes` should be reported.
    pub fn should_emit(&mut self, bytes: u64, done: bool) -> bool {
        let due = done
            || bytes.saturating_sub(self.last_bytes) >= self.min_bytes
            || self.last_emit.elapsed() >= self.min_interval;

        if due {
            self.last_bytes = bytes;
            self.last_emit = Instant::now();
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_throttle_by_bytes() {
        let mut throttle = ProgressThrottle::new(100, Duration::from_secs(60), 0);
        assert!(!throttle.should_emit(50, false));
        assert!(throttle.should_emit(100, false));
        assert!(!throttle.should_emit(150, false));
        assert!(throttle.should_emit(200, false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_by_interval() {
        let mut throttle = ProgressThrottle::new(1_000_000, Duration::from_millis(250), 0);
        assert!(!throttle.should_emit(10, false));

        tokio::time::advance(Duration::from_millis(300)).await;
        assert!(throttle.should_emit(20, false));
        assert!(!throttle.should_emit(30, false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_event_always_emitted() {
        let mut throttle = ProgressThrottle::new(1_000_000, Duration::from_secs(60), 0);
        assert!(throttle.should_emit(5, true));
    }

    #[test]
    fn test_event_percentage() {
        let event = ProgressEvent {
            code: ShareCode::parse("123456", 6).unwrap(),
            file_index: 0,
            file_name: "a.txt".to_string(),
            direction: TransferDirection::Download,
            bytes_transferred: 25,
            total_bytes: 100,
            downloader_id: None,
            done: false,
        };
        assert!((event.percentage() - 25.0).abs() < f64::EPSILON);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["direction"], "download");
        assert_eq!(json["code"], "123456");
        assert!(json.get("downloader_id").is_none());
    }
}
