//! Live video and pan/tilt control over HTTP.

use std::sync::Arc;

use anyhow::{Context, Result};
use camera::{CameraArgs, CaptureLoop, FrameStore};
use cam_server::{run_server, AppState, ServerArgs};
use clap::Parser;
use hardware::{MountArgs, MountController};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Pan/tilt camera mount server")]
struct Args {
    #[command(flatten)]
    mount: MountArgs,

    #[command(flatten)]
    camera: CameraArgs,

    #[command(flatten)]
    server: ServerArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let config = args.server.mount_config(&args.mount)?;
    let driver = args
        .mount
        .line_driver(&config)
        .context("Failed to set up GPIO driver")?;
    let mount = MountController::new(&config, driver).context("Failed to set up mount")?;
    info!(
        "Mount ready: yaw on line {}, pitch on line {}, {} Hz",
        config.yaw_line, config.pitch_line, config.frequency_hz
    );

    let factory = args
        .camera
        .source_factory()
        .context("Failed to select a video source")?;
    info!("Video source: {}", factory.describe());
    let capture = CaptureLoop::new(
        factory,
        Arc::new(FrameStore::new()),
        args.camera.capture_options(),
    );

    let state = AppState::new(
        Arc::new(mount),
        Arc::new(capture),
        args.camera.jpeg_quality,
    )
    .context("Failed to register metrics")?;

    run_server(Arc::new(state), &args.server).await
}
