//! Camera command-line surface.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tracing::info;

use crate::capture::CaptureOptions;
use crate::discovery::discover_cameras;
use crate::error::CaptureError;
use crate::mjpeg::DEFAULT_JPEG_QUALITY;
use crate::source::{Resolution, SourceFactory, SyntheticConfig, SyntheticFactory};

#[derive(Args, Debug, Clone)]
pub struct CameraArgs {
    /// Capture device, e.g. /dev/video0. The first usable camera when omitted
    #[arg(long)]
    pub device: Option<PathBuf>,

    /// Requested frame width
    #[arg(long, default_value_t = 640)]
    pub width: u32,

    /// Requested frame height
    #[arg(long, default_value_t = 480)]
    pub height: u32,

    /// Stream a generated test pattern instead of a camera
    #[arg(long)]
    pub synthetic: bool,

    /// Stamp the capture time onto frames
    #[arg(long)]
    pub add_date: bool,

    /// Stamp the frame rate onto frames
    #[arg(long)]
    pub fps_counter: bool,

    /// TrueType font for the overlays
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// JPEG quality of streamed frames (1-100)
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY)]
    pub jpeg_quality: u8,

    /// Pause after a failed frame read, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub read_backoff_ms: u64,
}

impl CameraArgs {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            add_date: self.add_date,
            fps_counter: self.fps_counter,
            read_backoff: Duration::from_millis(self.read_backoff_ms),
            font_path: self.font.clone(),
        }
    }

    /// Pick the frame source: the test pattern, the given device, or the
    /// first discovered camera.
    pub fn source_factory(&self) -> Result<Arc<dyn SourceFactory>, CaptureError> {
        if self.synthetic {
            return Ok(Arc::new(SyntheticFactory::new(SyntheticConfig {
                resolution: self.resolution(),
                ..SyntheticConfig::default()
            })));
        }

        let device = match &self.device {
            Some(device) => device.clone(),
            None => {
                let found = discover_cameras();
                info!("Discovered cameras: {found:?}");
                found.into_iter().next().ok_or(CaptureError::NoDevice)?
            }
        };
        device_factory(device, self.resolution())
    }
}

#[cfg(all(target_os = "linux", feature = "v4l2"))]
fn device_factory(
    device: PathBuf,
    resolution: Resolution,
) -> Result<Arc<dyn SourceFactory>, CaptureError> {
    Ok(Arc::new(crate::source::V4lFactory::new(device, resolution)))
}

#[cfg(not(all(target_os = "linux", feature = "v4l2")))]
fn device_factory(
    device: PathBuf,
    _resolution: Resolution,
) -> Result<Arc<dyn SourceFactory>, CaptureError> {
    Err(CaptureError::open(
        device.display(),
        "built without V4L2 support, use --synthetic",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        camera: CameraArgs,
    }

    #[test]
    fn test_defaults() {
        let cli = TestCli::parse_from(["test"]);
        assert_eq!(cli.camera.resolution(), Resolution::new(640, 480));
        assert_eq!(cli.camera.jpeg_quality, DEFAULT_JPEG_QUALITY);

        let options = cli.camera.capture_options();
        assert!(!options.add_date && !options.fps_counter);
        assert_eq!(options.read_backoff, Duration::from_secs(1));
    }

    #[test]
    fn test_synthetic_factory() {
        let cli = TestCli::parse_from(["test", "--synthetic", "--width", "64", "--height", "48"]);
        let factory = cli.camera.source_factory().unwrap();
        assert_eq!(factory.describe(), "synthetic 64x48");
        let source = factory.open().unwrap();
        assert_eq!(source.resolution(), Resolution::new(64, 48));
    }
}
