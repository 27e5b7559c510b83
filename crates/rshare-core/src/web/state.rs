//! Application state shared across HTTP handlers.

use std::sync::Arc;
use std::time::Instant;

use crate::transfer::TransferCoordinator;

/// State reachable from every handler.
#[derive(Debug)]
pub struct AppState {
    /// Session coordinator
    pub coordinator: Arc<TransferCoordinator>,
    /// When the server started
    pub started_at: Instant,
}

impl AppState {
    /// Create state around an existing coordinator.
    #[must_use]
    pub fn new(coordinator: Arc<TransferCoordinator>) -> Self {
        Self {
            coordinator,
            started_at: Instant::now(),
        }
    }
}

/// Shared application state type.
pub type SharedState = Arc<AppState>;
