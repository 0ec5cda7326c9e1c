//! Frame sources for the capture loop.
//!
//! A [`SourceFactory`] is shared configuration that can open a fresh
//! [`CaptureSource`] each time capture starts. Sources are opened and used on
//! the capture worker thread, so they need not be `Send`.

mod synthetic;
#[cfg(all(target_os = "linux", feature = "v4l2"))]
mod v4l2;

use std::fmt;

use image::RgbImage;
use serde::Serialize;

use crate::error::CaptureError;

pub use synthetic::{SyntheticConfig, SyntheticFactory, SyntheticSource};
#[cfg(all(target_os = "linux", feature = "v4l2"))]
pub use v4l2::{probe_resolution, V4lFactory, V4lSource};

/// Frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// An open camera delivering decoded frames.
pub trait CaptureSource {
    /// Block until the next frame is available.
    fn read_frame(&mut self) -> Result<RgbImage, CaptureError>;

    fn resolution(&self) -> Resolution;
}

/// Opens capture sources on demand.
pub trait SourceFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn CaptureSource>, CaptureError>;

    /// Human-readable name for logs, e.g. the device path.
    fn describe(&self) -> String;
}

/// Convert packed YUYV 4:2:2 to RGB using BT.601 integer coefficients.
///
/// Returns `None` if `data` is shorter than `width * height * 2` bytes or the
/// width is odd.
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Option<RgbImage> {
    let pixels = width as usize * height as usize;
    if width % 2 != 0 || data.len() < pixels * 2 {
        return None;
    }

    let mut rgb = Vec::with_capacity(pixels * 3);
    for chunk in data[..pixels * 2].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&ycbcr_to_rgb(y0, u, v));
        rgb.extend_from_slice(&ycbcr_to_rgb(y1, u, v));
    }
    RgbImage::from_raw(width, height, rgb)
}

fn ycbcr_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clip = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    [
        clip(298 * c + 409 * e),
        clip(298 * c - 100 * d - 208 * e),
        clip(298 * c + 516 * d),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_yuyv_black_and_white() {
        // Two pixels: black (Y=16) and white (Y=235), neutral chroma
        let data = [16, 128, 235, 128];
        let image = yuyv_to_rgb(&data, 2, 1).unwrap();
        assert_eq!(image.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(image.get_pixel(1, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_yuyv_rejects_short_buffer() {
        assert!(yuyv_to_rgb(&[0; 6], 2, 2).is_none());
        assert!(yuyv_to_rgb(&[0; 6], 3, 1).is_none());
    }

    #[test]
    fn test_resolution_display() {
        assert_eq!(Resolution::new(640, 480).to_string(), "640x480");
    }
}
