//! Generated test pattern, used when no camera is attached and in tests.

use std::thread;
use std::time::Duration;

use image::{Rgb, RgbImage};

use super::{CaptureSource, Resolution, SourceFactory};
use crate::error::CaptureError;

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub resolution: Resolution,
    /// Time each read blocks, standing in for the camera frame period
    pub frame_interval: Duration,
    /// Fail every n-th read with a transient error
    pub fail_every: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::new(640, 480),
            frame_interval: Duration::from_millis(33),
            fail_every: None,
        }
    }
}

/// Moving colour bars. The blue channel of every pixel carries the frame
/// counter modulo 256, which lets tests identify frames.
pub struct SyntheticSource {
    config: SyntheticConfig,
    reads: u64,
    frames: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            reads: 0,
            frames: 0,
        }
    }

    pub fn render(resolution: Resolution, frame: u64) -> RgbImage {
        let shift = (frame % 256) as u32 * 4;
        let marker = (frame % 256) as u8;
        RgbImage::from_fn(resolution.width, resolution.height, |x, y| {
            let bar = ((x + shift) / 32) % 8;
            let red = if bar & 1 != 0 { 255 } else { 32 };
            let green = ((y * 255) / resolution.height.max(1)) as u8;
            Rgb([red, green, marker])
        })
    }
}

impl CaptureSource for SyntheticSource {
    fn read_frame(&mut self) -> Result<RgbImage, CaptureError> {
        if !self.config.frame_interval.is_zero() {
            thread::sleep(self.config.frame_interval);
        }
        self.reads += 1;
        if let Some(n) = self.config.fail_every {
            if n > 0 && self.reads % n == 0 {
                return Err(CaptureError::Read(format!(
                    "synthetic failure on read {}",
                    self.reads
                )));
            }
        }
        let image = Self::render(self.config.resolution, self.frames);
        self.frames += 1;
        Ok(image)
    }

    fn resolution(&self) -> Resolution {
        self.config.resolution
    }
}

pub struct SyntheticFactory {
    config: SyntheticConfig,
}

impl SyntheticFactory {
    pub fn new(config: SyntheticConfig) -> Self {
        Self { config }
    }
}

impl SourceFactory for SyntheticFactory {
    fn open(&self) -> Result<Box<dyn CaptureSource>, CaptureError> {
        Ok(Box::new(SyntheticSource::new(self.config.clone())))
    }

    fn describe(&self) -> String {
        format!("synthetic {}", self.config.resolution)
    }
}
