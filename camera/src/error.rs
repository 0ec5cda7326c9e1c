//! Capture and encoding errors.

use thiserror::Error;

/// Errors raised by capture sources and the capture loop.
///
/// `Read` failures are transient: the capture loop logs them, backs off and
/// keeps going. Everything else is structural and reaches the caller of
/// [`CaptureLoop::start`](crate::CaptureLoop::start).
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The capture device could not be opened or configured.
    #[error("Failed to open capture device {device}: {reason}")]
    Open { device: String, reason: String },

    /// A single frame could not be read or decoded.
    #[error("Frame read failed: {0}")]
    Read(String),

    /// The device does not offer a pixel format we can decode.
    #[error("Unsupported pixel format: {0}")]
    UnsupportedFormat(String),

    /// Device discovery found nothing usable.
    #[error("No usable camera device found")]
    NoDevice,

    /// Overlay font could not be loaded.
    #[error("Overlay font unavailable: {0}")]
    Font(String),
}

impl CaptureError {
    pub(crate) fn open(device: impl std::fmt::Display, reason: impl ToString) -> Self {
        Self::Open {
            device: device.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Errors from compressing a frame for the stream.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("JPEG encoding failed: {0}")]
    Jpeg(#[from] image::ImageError),

    #[error("Encoder task failed: {0}")]
    Task(String),
}
