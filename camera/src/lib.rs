//! Camera capture and MJPEG streaming.
//!
//! A [`CaptureLoop`] reads frames from a [`CaptureSource`] on a background
//! thread and publishes them to a [`FrameStore`]. Any number of
//! [`StreamEncoder`] streams watch the store and turn new frames into
//! `multipart/x-mixed-replace` parts.
//!
//! # Features
//!
//! - `v4l2` (default) - V4L2 camera devices (Linux only)

pub mod capture;
pub mod config;
pub mod discovery;
pub mod error;
pub mod frame;
pub mod mjpeg;
pub mod overlay;
pub mod source;
pub mod store;

pub use capture::{CaptureLoop, CaptureOptions};
pub use config::CameraArgs;
pub use error::{CaptureError, EncodeError};
pub use frame::Frame;
pub use mjpeg::{StreamEncoder, MULTIPART_CONTENT_TYPE};
pub use source::{CaptureSource, Resolution, SourceFactory};
pub use store::{FrameSlot, FrameStore};
