//! Motion JPEG encoding of the frame store.
//!
//! Each part of the stream is
//!
//! ```text
//! --frame\r\n
//! Content-Type: image/jpeg\r\n
//! \r\n
//! <jpeg bytes>\r\n
//! ```
//!
//! served under `multipart/x-mixed-replace; boundary=frame`. Browsers render
//! this natively from an `<img>` tag.

use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use tracing::{debug, warn};

use crate::error::EncodeError;
use crate::store::FrameStore;

pub const BOUNDARY: &str = "frame";
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Bytes, EncodeError> {
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality).encode_image(image)?;
    Ok(Bytes::from(jpeg))
}

/// Wrap one JPEG image in its multipart framing.
pub fn frame_part(jpeg: &[u8]) -> Bytes {
    let mut part = Vec::with_capacity(PART_HEADER.len() + jpeg.len() + 2);
    part.extend_from_slice(PART_HEADER);
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

/// Turns the frame store into per-client MJPEG byte streams.
#[derive(Clone)]
pub struct StreamEncoder {
    store: Arc<FrameStore>,
    quality: u8,
}

impl StreamEncoder {
    pub fn new(store: Arc<FrameStore>, quality: u8) -> Self {
        Self {
            store,
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// One multipart chunk per newly published frame.
    ///
    /// A frame already in the store is sent first. A client slower than the
    /// camera skips to the newest frame instead of queueing old ones. The
    /// stream belongs to the capture session current when it was created and
    /// ends when that session closes, even if a new one has already opened.
    /// JPEG compression runs on the blocking pool, outside any store lock.
    pub fn stream(&self) -> impl Stream<Item = Bytes> + Send + 'static {
        let mut rx = self.store.subscribe();
        let session = rx.borrow().session;
        rx.mark_changed();
        let quality = self.quality;

        async_stream::stream! {
            while rx.changed().await.is_ok() {
                let slot = rx.borrow_and_update().clone();
                if !slot.live || slot.session != session {
                    debug!("Capture session {session} ended, closing MJPEG stream");
                    break;
                }
                let Some(frame) = slot.frame else {
                    continue;
                };

                let sequence = frame.sequence;
                let encoded =
                    tokio::task::spawn_blocking(move || encode_jpeg(&frame.image, quality)).await;
                match encoded {
                    Ok(Ok(jpeg)) => yield frame_part(&jpeg),
                    Ok(Err(e)) => warn!("Dropping frame {sequence}: {e}"),
                    Err(e) => {
                        let e = EncodeError::Task(e.to_string());
                        warn!("Dropping frame {sequence}: {e}");
                    }
                }
            }
        }
    }
}
