//! Timestamp and frame-rate text burned into captured frames.

use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use chrono::{DateTime, Local};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;

use crate::error::CaptureError;

/// Fonts tried, in order, when no font path is configured.
pub const DEFAULT_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
];

const TEXT_SCALE: f32 = 28.0;
const OUTLINE: [(i32, i32); 8] = [
    (-2, 0),
    (2, 0),
    (0, -2),
    (0, 2),
    (-1, -1),
    (1, 1),
    (-1, 1),
    (1, -1),
];

/// Baseline positions of the two text lines.
const DATE_ORIGIN: (i32, i32) = (50, 50);
const FPS_ORIGIN: (i32, i32) = (50, 100);

pub fn timestamp_text(at: DateTime<Local>) -> String {
    at.format("%d.%m.%Y %H:%M:%S").to_string()
}

pub fn fps_text(fps: f64) -> String {
    format!("fps: {fps:.2}")
}

pub struct TextOverlay {
    font: FontVec,
    source: PathBuf,
}

impl TextOverlay {
    /// Load the font at `path`, or the first readable entry of
    /// [`DEFAULT_FONT_PATHS`] when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, CaptureError> {
        match path {
            Some(path) => Self::from_file(path),
            None => DEFAULT_FONT_PATHS
                .iter()
                .find_map(|candidate| Self::from_file(Path::new(candidate)).ok())
                .ok_or_else(|| {
                    CaptureError::Font(format!(
                        "none of {} default fonts found",
                        DEFAULT_FONT_PATHS.len()
                    ))
                }),
        }
    }

    fn from_file(path: &Path) -> Result<Self, CaptureError> {
        let data = std::fs::read(path)
            .map_err(|e| CaptureError::Font(format!("{}: {e}", path.display())))?;
        let font = FontVec::try_from_vec(data)
            .map_err(|e| CaptureError::Font(format!("{}: {e}", path.display())))?;
        Ok(Self {
            font,
            source: path.to_path_buf(),
        })
    }

    pub fn font_path(&self) -> &Path {
        &self.source
    }

    /// Draw whichever of the two text lines are given.
    pub fn stamp(
        &self,
        image: &mut RgbImage,
        timestamp: Option<DateTime<Local>>,
        fps: Option<f64>,
    ) {
        if let Some(at) = timestamp {
            self.draw_outlined(image, DATE_ORIGIN, &timestamp_text(at));
        }
        if let Some(fps) = fps {
            self.draw_outlined(image, FPS_ORIGIN, &fps_text(fps));
        }
    }

    /// White text over a black outline so it stays readable on any background.
    fn draw_outlined(&self, image: &mut RgbImage, baseline: (i32, i32), text: &str) {
        let scale = PxScale::from(TEXT_SCALE);
        let (x, y) = (baseline.0, baseline.1 - TEXT_SCALE as i32);
        for (dx, dy) in OUTLINE {
            draw_text_mut(image, Rgb([0, 0, 0]), x + dx, y + dy, scale, &self.font, text);
        }
        draw_text_mut(image, Rgb([255, 255, 255]), x, y, scale, &self.font, text);
    }
}
