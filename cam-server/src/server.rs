//! Serve the router until Ctrl-C, then stop capture and park the servos.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::config::ServerArgs;
use crate::routes::{create_router, AppState};

pub async fn run_server(state: Arc<AppState>, args: &ServerArgs) -> Result<()> {
    let addr = args.socket_addr()?;
    let app = create_router(state.clone());

    info!("Starting server on http://{addr}");
    info!("Video stream: http://{addr}/api/video/");
    info!("Metrics: http://{addr}/metrics");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(state.clone()))
    .await
    .context("Server error")?;

    let mount = state.mount.clone();
    tokio::task::spawn_blocking(move || mount.release())
        .await
        .context("Release task failed")?
        .context("Failed to release servos")?;
    info!("Servos released, bye");
    Ok(())
}

/// Resolves on Ctrl-C after stopping capture, so open video streams end and
/// graceful shutdown does not wait on them forever.
async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {e}");
        return;
    }
    info!("Shutting down");

    let capture = state.capture.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || capture.stop()).await {
        warn!("Capture stop task failed: {e}");
    }
}
