use chrono::{DateTime, Local};
use image::RgbImage;

/// A decoded camera image as published to the [`FrameStore`](crate::FrameStore).
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    /// Publish order, starting at 1 and never reused
    pub sequence: u64,
    pub captured_at: DateTime<Local>,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}
