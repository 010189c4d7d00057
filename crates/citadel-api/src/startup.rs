//! Server startup helper for embedding in the engine binary.
//!
//! [`spawn_server`] binds before returning, then serves on a background
//! Tokio task until the shutdown signal flips.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::server::{ServerConfig, ServerError, bind, serve};
use crate::state::AppState;

/// Errors that can occur when spawning the server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Bind `config` and serve the bridge on a background task.
///
/// The task stops once `shutdown` holds `true` or its sender is dropped.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the address cannot be bound.
pub async fn spawn_server(
    config: &ServerConfig,
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<JoinHandle<()>, StartupError> {
    let listener = bind(config).await?;

    let signal = async move {
        while !*shutdown.borrow_and_update() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }
    };

    let handle = tokio::spawn(async move {
        if let Err(e) = serve(listener, state, signal).await {
            tracing::error!(error = %e, "Citadel bridge exited with error");
        }
    });

    tracing::info!(
        host = %config.host,
        port = config.port,
        "Citadel bridge spawned on background task"
    );

    Ok(handle)
}
