//! V4L2 capture through memory-mapped buffers.
//!
//! Cameras are asked for MJPG first and YUYV second; both are decoded to RGB
//! before the frame leaves the source.

use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbImage};
use tracing::{debug, info};
use v4l::buffer::Type;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

use super::{yuyv_to_rgb, CaptureSource, Resolution, SourceFactory};
use crate::error::CaptureError;

const MJPG: [u8; 4] = *b"MJPG";
const YUYV: [u8; 4] = *b"YUYV";
const BUFFER_COUNT: u32 = 4;

/// Current capture format of `path`, or `None` if it cannot be opened or queried.
pub fn probe_resolution(path: &Path) -> Option<Resolution> {
    let device = Device::with_path(path).ok()?;
    let format = device.format().ok()?;
    Some(Resolution::new(format.width, format.height))
}

pub struct V4lSource {
    stream: MmapStream<'static>,
    fourcc: FourCC,
    resolution: Resolution,
    path: PathBuf,
    _device: Device,
}

impl V4lSource {
    pub fn open(path: &Path, requested: Resolution) -> Result<Self, CaptureError> {
        let shown = path.display();
        let device = Device::with_path(path).map_err(|e| CaptureError::open(&shown, e))?;

        let mut format = device.format().map_err(|e| CaptureError::open(&shown, e))?;
        format.width = requested.width;
        format.height = requested.height;

        let mut negotiated = None;
        for fourcc in [MJPG, YUYV] {
            format.fourcc = FourCC::new(&fourcc);
            let applied = device
                .set_format(&format)
                .map_err(|e| CaptureError::open(&shown, e))?;
            if applied.fourcc.repr == fourcc {
                negotiated = Some(applied);
                break;
            }
            debug!("{shown}: {} not accepted", FourCC::new(&fourcc));
        }
        let format = negotiated.ok_or_else(|| {
            CaptureError::UnsupportedFormat(format!("{shown} offers neither MJPG nor YUYV"))
        })?;

        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|e| CaptureError::open(&shown, e))?;

        let resolution = Resolution::new(format.width, format.height);
        info!("Opened {shown} at {resolution} {}", format.fourcc);
        Ok(Self {
            stream,
            fourcc: format.fourcc,
            resolution,
            path: path.to_path_buf(),
            _device: device,
        })
    }
}

impl CaptureSource for V4lSource {
    fn read_frame(&mut self) -> Result<RgbImage, CaptureError> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| CaptureError::Read(format!("{}: {e}", self.path.display())))?;
        let used = (meta.bytesused as usize).min(buf.len());
        let data = &buf[..used];

        if self.fourcc.repr == MJPG {
            image::load_from_memory_with_format(data, ImageFormat::Jpeg)
                .map(|decoded| decoded.to_rgb8())
                .map_err(|e| CaptureError::Read(format!("MJPG decode: {e}")))
        } else {
            yuyv_to_rgb(data, self.resolution.width, self.resolution.height).ok_or_else(|| {
                CaptureError::Read(format!("short YUYV buffer: {used} bytes"))
            })
        }
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }
}

pub struct V4lFactory {
    path: PathBuf,
    resolution: Resolution,
}

impl V4lFactory {
    pub fn new(path: impl Into<PathBuf>, resolution: Resolution) -> Self {
        Self {
            path: path.into(),
            resolution,
        }
    }
}

impl SourceFactory for V4lFactory {
    fn open(&self) -> Result<Box<dyn CaptureSource>, CaptureError> {
        Ok(Box::new(V4lSource::open(&self.path, self.resolution)?))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
