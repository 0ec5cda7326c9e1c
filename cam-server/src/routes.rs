//! HTTP routes.
//!
//! | Method | Path                         | Purpose                              |
//! |--------|------------------------------|--------------------------------------|
//! | GET    | `/`                          | Control page                         |
//! | GET    | `/api/video/`                | MJPEG stream, starts capture         |
//! | GET    | `/api/video/reset`           | Stop capture, ending every stream    |
//! | POST   | `/api/control/{direction}`   | Step the mount, empty 200 on success |
//! | GET    | `/api/control/position`      | Current yaw and pitch as JSON        |
//! | GET    | `/metrics`                   | Prometheus metrics                   |
//!
//! Capture start/stop, servo commands and position reads take blocking locks,
//! so they run on the blocking pool.

use std::convert::Infallible;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use camera::{CaptureLoop, StreamEncoder, MULTIPART_CONTENT_TYPE};
use futures::StreamExt;
use hardware::{Direction, MountController, MountPosition};
use tracing::{error, info};

use crate::assets::serve_index;
use crate::metrics::{ClientGuard, ServerMetrics};

pub struct AppState {
    pub mount: Arc<MountController>,
    pub capture: Arc<CaptureLoop>,
    pub encoder: StreamEncoder,
    pub metrics: ServerMetrics,
}

impl AppState {
    pub fn new(
        mount: Arc<MountController>,
        capture: Arc<CaptureLoop>,
        jpeg_quality: u8,
    ) -> prometheus::Result<Self> {
        let encoder = StreamEncoder::new(capture.store().clone(), jpeg_quality);
        Ok(Self {
            mount,
            capture,
            encoder,
            metrics: ServerMetrics::new()?,
        })
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/api/video", get(video_feed))
        .route("/api/video/", get(video_feed))
        .route("/api/video/reset", get(video_reset))
        .route("/api/control/position", get(position))
        .route("/api/control/{direction}", post(control))
        .route("/metrics", get(metrics))
        .with_state(state)
}

fn internal_error(message: String) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
}

async fn video_feed(State(state): State<Arc<AppState>>) -> Response {
    let capture = state.capture.clone();
    match tokio::task::spawn_blocking(move || capture.start()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!("Failed to start capture: {e}");
            return internal_error(e.to_string());
        }
        Err(e) => {
            error!("Capture start task failed: {e}");
            return internal_error(e.to_string());
        }
    }

    let guard = ClientGuard::new(&state.metrics.stream_clients);
    let encoded = state.metrics.frames_encoded.clone();
    let stream = state.encoder.stream().map(move |part| {
        let _client = &guard;
        encoded.inc();
        Ok::<_, Infallible>(part)
    });

    (
        [
            (header::CONTENT_TYPE, MULTIPART_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

async fn video_reset(State(state): State<Arc<AppState>>) -> Response {
    let capture = state.capture.clone();
    match tokio::task::spawn_blocking(move || capture.stop()).await {
        Ok(()) => {
            info!("Video reset");
            (StatusCode::OK, "OK").into_response()
        }
        Err(e) => {
            error!("Capture stop task failed: {e}");
            internal_error(e.to_string())
        }
    }
}

async fn control(
    State(state): State<Arc<AppState>>,
    Path(direction): Path<String>,
) -> Response {
    let Ok(direction) = Direction::from_str(&direction) else {
        return (
            StatusCode::NOT_FOUND,
            format!("Unknown direction: {direction}"),
        )
            .into_response();
    };

    let mount = state.mount.clone();
    let result = tokio::task::spawn_blocking(move || mount.step(direction, None)).await;

    match result {
        Ok(Ok(_)) => {
            state
                .metrics
                .moves
                .with_label_values(&[direction.to_string().as_str()])
                .inc();
            StatusCode::OK.into_response()
        }
        Ok(Err(e)) => {
            error!("Move {direction} failed: {e}");
            state.metrics.move_failures.inc();
            internal_error(e.to_string())
        }
        Err(e) => {
            error!("Move {direction} task failed: {e}");
            state.metrics.move_failures.inc();
            internal_error(e.to_string())
        }
    }
}

async fn position(State(state): State<Arc<AppState>>) -> Response {
    let mount = state.mount.clone();
    match tokio::task::spawn_blocking(move || mount.position()).await {
        Ok(position) => Json::<MountPosition>(position).into_response(),
        Err(e) => {
            error!("Position task failed: {e}");
            internal_error(e.to_string())
        }
    }
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render(&state.capture) {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to render metrics: {e}");
            internal_error(e.to_string())
        }
    }
}
