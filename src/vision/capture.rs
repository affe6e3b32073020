//! Frame acquisition
//!
//! Defines the capture seam the detection loop pulls frames through.
//! The actual pixel grab (platform screenshot API, window capture,
//! remote stream) lives behind [`FrameSource`] and is supplied by the
//! host.

use image::RgbImage;

use super::VisionError;

/// A rectangular screen region in screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// Create a new region
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center point of the region
    pub fn center(&self) -> (i32, i32) {
        (
            self.x + self.width as i32 / 2,
            self.y + self.height as i32 / 2,
        )
    }

    /// Whether the region has zero area
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Source of captured frames
///
/// `None` as the region means "the entire primary display". A capture
/// may fail transiently; callers retry on their next cycle rather than
/// treating failure as fatal.
pub trait FrameSource: Send {
    /// Capture one frame of the given region
    fn capture(&mut self, region: Option<Region>) -> Result<RgbImage, VisionError>;
}

/// Frame source backed by a fixed in-memory image
///
/// Serves the same frame (optionally cropped to the requested region)
/// on every capture. Used by the CLI test binary and by tests; real
/// deployments plug in a platform capture implementation instead.
pub struct StaticFrameSource {
    frame: RgbImage,
    captures: u64,
}

impl StaticFrameSource {
    /// Create a source that always serves `frame`
    pub fn new(frame: RgbImage) -> Self {
        Self { frame, captures: 0 }
    }

    /// Number of captures served so far
    pub fn captures(&self) -> u64 {
        self.captures
    }

    /// Replace the served frame
    pub fn set_frame(&mut self, frame: RgbImage) {
        self.frame = frame;
    }
}

impl FrameSource for StaticFrameSource {
    fn capture(&mut self, region: Option<Region>) -> Result<RgbImage, VisionError> {
        self.captures += 1;

        let Some(region) = region else {
            return Ok(self.frame.clone());
        };

        if region.is_empty() {
            return Err(VisionError::CaptureUnavailable(
                "requested region has zero area".to_string(),
            ));
        }

        // Clamp the crop to the frame bounds
        let x = region.x.max(0) as u32;
        let y = region.y.max(0) as u32;
        if x >= self.frame.width() || y >= self.frame.height() {
            return Err(VisionError::CaptureUnavailable(format!(
                "region origin ({}, {}) outside frame",
                region.x, region.y
            )));
        }
        let w = region.width.min(self.frame.width() - x);
        let h = region.height.min(self.frame.height() - y);

        Ok(image::imageops::crop_imm(&self.frame, x, y, w, h).to_image())
    }
}
