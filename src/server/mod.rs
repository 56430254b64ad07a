//! HTTP server
//!
//! Serves cached content to podcast clients with byte-range support.

pub mod handlers;
pub mod range;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::media::MediaCoordinator;
use crate::principal::PrincipalDirectory;

pub use handlers::AppState;

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/files/{username}/{file_id}", get(handlers::get_file))
        .route("/files/{username}/{file_id}/thumbnail", get(handlers::get_thumbnail))
        .with_state(state)
}

/// HTTP server bound to one listen address
pub struct MediaServer {
    state: AppState,
    listener: Option<TcpListener>,
}

impl MediaServer {
    pub fn new(coordinator: Arc<MediaCoordinator>, principals: Arc<PrincipalDirectory>) -> Self {
        Self {
            state: AppState {
                coordinator,
                principals,
            },
            listener: None,
        }
    }

    /// Bind the listen socket, returning the bound address
    pub async fn start(&mut self, addr: &str) -> Result<SocketAddr> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        let local = listener.local_addr().context("Failed to read bound address")?;

        info!(addr = %local, users = self.state.principals.len(), "HTTP server started");
        self.listener = Some(listener);
        Ok(local)
    }

    /// Serve requests until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = self.listener.context("Server not started")?;
        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await
            .context("HTTP server error")
    }
}
