//! HTTP delivery gateway for Rshare.
//!
//! Exposes the transfer coordinator over HTTP so that senders can upload
//! with a plain `PUT` and receivers can download with a plain `GET`.
//!
//! ## Starting the Gateway
//!
//! ```bash
//! rshare serve                     # Default port 8080
//! rshare serve --port 9000         # Custom port
//! rshare serve --localhost-only    # Restrict to localhost
//! ```
//!
//! ## API Endpoints
//!
//! | Method | Endpoint | Description |
//! |--------|----------|-------------|
//! | GET | /api/health | Liveness |
//! | POST | /api/sessions | Create a session |
//! | GET | /api/sessions/{code} | Progress snapshot |
//! | DELETE | /api/sessions/{code} | Cancel a session |
//! | PUT | /api/sessions/{code}/files/{index} | Upload (resumes at the current offset) |
//! | GET | /api/sessions/{code}/files/{index}?wait=true | Download |
//! | GET | /api/sessions/{code}/events | Progress (SSE) |

pub mod error;
pub mod handlers;
pub mod sse;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::config::WebConfig;
use crate::error::Result;
use crate::transfer::TransferCoordinator;

pub use handlers::CHECKSUM_HEADER;
pub use state::{AppState, SharedState};

/// Configuration for the web server.
#[derive(Debug, Clone)]
pub struct WebServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Bind to localhost only
    pub localhost_only: bool,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self::from(&WebConfig::default())
    }
}

impl From<&WebConfig> for WebServerConfig {
    fn from(config: &WebConfig) -> Self {
        Self {
            port: config.port,
            localhost_only: config.localhost_only,
        }
    }
}

impl WebServerConfig {
    /// Get the bind address for the server.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        if self.localhost_only {
            SocketAddr::from(([127, 0, 0, 1], self.port))
        } else {
            SocketAddr::from(([0, 0, 0, 0], self.port))
        }
    }
}

/// Build the API router around `state`.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/sessions", post(handlers::create_session))
        .route(
            "/api/sessions/{code}",
            get(handlers::get_session).delete(handlers::cancel_session),
        )
        .route(
            "/api/sessions/{code}/files/{index}",
            put(handlers::upload_file)
                .layer(DefaultBodyLimit::disable())
                .get(handlers::download_file),
        )
        .route("/api/sessions/{code}/events", get(sse::session_events))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// The web server instance.
#[derive(Debug)]
pub struct WebServer {
    config: WebServerConfig,
    coordinator: Arc<TransferCoordinator>,
}

impl WebServer {
    /// Create a new web server serving `coordinator`.
    #[must_use]
    pub const fn new(config: WebServerConfig, coordinator: Arc<TransferCoordinator>) -> Self {
        Self {
            config,
            coordinator,
        }
    }

    /// Get the server configuration.
    #[must_use]
    pub const fn config(&self) -> &WebServerConfig {
        &self.config
    }

    /// Bind the configured address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(&self) -> Result<TcpListener> {
        Ok(TcpListener::bind(self.config.bind_addr()).await?)
    }

    /// Serve requests on `listener` until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails.
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let state = Arc::new(AppState::new(Arc::clone(&self.coordinator)));
        let app = router(state);

        tracing::info!("Web server listening on {}", listener.local_addr()?);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        tracing::info!("Web server stopped");
        Ok(())
    }

    /// Bind and serve until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be started.
    pub async fn start(&self, shutdown: CancellationToken) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_addr() {
        let config = WebServerConfig {
            port: 9000,
            localhost_only: true,
        };
        assert_eq!(config.bind_addr().to_string(), "127.0.0.1:9000");

        let config = WebServerConfig::default();
        assert_eq!(config.bind_addr().to_string(), "0.0.0.0:8080");
    }
}
