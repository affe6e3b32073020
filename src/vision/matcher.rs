//! Multi-scale template matching
//!
//! Correlates every library template against a frame at a ladder of
//! scale factors, then collapses overlapping candidates into a single
//! detection per screen region. Output is deterministic for a fixed
//! frame, library, and configuration.

use std::cmp::Ordering;

use image::imageops::{self, FilterType};
use image::GrayImage;
use imageproc::template_matching::{match_template, MatchTemplateMethod};

use super::template::TemplateLibrary;
use crate::config::settings::DetectionSettings;

/// Axis-aligned box in frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Create a new bounding box
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center point of the box
    pub fn center(&self) -> (i32, i32) {
        (
            self.x + self.width as i32 / 2,
            self.y + self.height as i32 / 2,
        )
    }

    /// Intersection-over-union overlap ratio with another box
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x_overlap = (self.x + self.width as i32).min(other.x + other.width as i32)
            - self.x.max(other.x);
        let y_overlap = (self.y + self.height as i32).min(other.y + other.height as i32)
            - self.y.max(other.y);

        if x_overlap <= 0 || y_overlap <= 0 {
            return 0.0;
        }

        let intersection = x_overlap as f32 * y_overlap as f32;
        let area_a = self.width as f32 * self.height as f32;
        let area_b = other.width as f32 * other.height as f32;
        let union = area_a + area_b - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// One located instance of a template in a frame
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Detection {
    /// Name of the matched template
    pub template: String,
    /// Correlation score in [0, 1]
    pub confidence: f32,
    /// Location and extent in full-frame coordinates
    pub bbox: BoundingBox,
    /// Template scale factor that produced the match
    pub scale: f32,
    /// Caller-supplied capture time (seconds since the epoch)
    pub timestamp: f64,
}

/// Multi-scale normalized cross-correlation matcher
///
/// Stateless per call: `detect` reads only its arguments and the
/// engine's configuration.
#[derive(Debug, Clone)]
pub struct MatchEngine {
    threshold: f32,
    scale_ladder: Vec<f32>,
    overlap_threshold: f32,
    pixel_budget: u32,
}

impl MatchEngine {
    /// Create an engine from detection settings
    pub fn from_settings(settings: &DetectionSettings) -> Self {
        Self {
            threshold: settings.match_threshold,
            scale_ladder: settings.scale_ladder.clone(),
            overlap_threshold: settings.overlap_threshold,
            pixel_budget: settings.pixel_budget,
        }
    }

    /// Override the match threshold
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Override the scale ladder
    pub fn with_scale_ladder(mut self, ladder: Vec<f32>) -> Self {
        self.scale_ladder = ladder;
        self
    }

    /// Find every template of `library` in `frame`
    ///
    /// Candidates scoring at or above the threshold are collected
    /// across all templates and scales, then deduplicated together so
    /// two templates matching the same screen region cannot both
    /// survive. `timestamp` is stamped onto each detection; the engine
    /// itself never reads the clock.
    pub fn detect(
        &self,
        frame: &GrayImage,
        library: &TemplateLibrary,
        timestamp: f64,
    ) -> Vec<Detection> {
        if frame.width() == 0 || frame.height() == 0 || library.is_empty() {
            return Vec::new();
        }

        // Downscale oversized frames before correlating; matched
        // coordinates are projected back to full-frame space below.
        let factor = self.downscale_factor(frame);
        let scaled_frame;
        let work: &GrayImage = if factor < 1.0 {
            let w = ((frame.width() as f32 * factor).round() as u32).max(1);
            let h = ((frame.height() as f32 * factor).round() as u32).max(1);
            scaled_frame = imageops::resize(frame, w, h, FilterType::Triangle);
            &scaled_frame
        } else {
            frame
        };

        let mut raw = Vec::new();
        for template in library.iter() {
            for &scale in &self.scale_ladder {
                self.match_at_scale(work, factor, template, scale, timestamp, &mut raw);
            }
        }

        self.suppress_overlaps(raw)
    }

    /// Correlate one template at one scale, appending raw candidates
    fn match_at_scale(
        &self,
        work: &GrayImage,
        factor: f32,
        template: &super::template::Template,
        scale: f32,
        timestamp: f64,
        raw: &mut Vec<Detection>,
    ) {
        // Template footprint in the (possibly downscaled) work frame
        let tw = (template.width() as f32 * scale * factor).round() as u32;
        let th = (template.height() as f32 * scale * factor).round() as u32;
        if tw == 0 || th == 0 || tw > work.width() || th > work.height() {
            return;
        }

        let scaled = imageops::resize(template.gray(), tw, th, FilterType::Triangle);
        let response = match_template(work, &scaled, MatchTemplateMethod::CrossCorrelationNormalized);

        // Footprint in full-frame coordinates
        let full_w = (template.width() as f32 * scale).round() as u32;
        let full_h = (template.height() as f32 * scale).round() as u32;

        for (x, y, score) in response.enumerate_pixels() {
            let score = score[0];
            // An all-zero window divides out to NaN; never a candidate
            if !score.is_finite() || score < self.threshold {
                continue;
            }
            raw.push(Detection {
                template: template.name().to_string(),
                confidence: score.clamp(0.0, 1.0),
                bbox: BoundingBox::new(
                    (x as f32 / factor).round() as i32,
                    (y as f32 / factor).round() as i32,
                    full_w,
                    full_h,
                ),
                scale,
                timestamp,
            });
        }
    }

    /// Non-max suppression across all templates and scales
    ///
    /// Candidates are sorted by descending confidence with a total
    /// tie-break so the survivor set is identical run to run.
    fn suppress_overlaps(&self, mut raw: Vec<Detection>) -> Vec<Detection> {
        raw.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.template.cmp(&b.template))
                .then_with(|| a.bbox.x.cmp(&b.bbox.x))
                .then_with(|| a.bbox.y.cmp(&b.bbox.y))
                .then_with(|| a.scale.partial_cmp(&b.scale).unwrap_or(Ordering::Equal))
        });

        let mut kept: Vec<Detection> = Vec::new();
        for candidate in raw {
            let overlapping = kept
                .iter()
                .any(|k| candidate.bbox.iou(&k.bbox) >= self.overlap_threshold);
            if !overlapping {
                kept.push(candidate);
            }
        }
        kept
    }

    /// Downscale factor bringing the frame under the pixel budget
    fn downscale_factor(&self, frame: &GrayImage) -> f32 {
        let pixels = frame.width() as f32 * frame.height() as f32;
        if pixels <= self.pixel_budget as f32 {
            1.0
        } else {
            (self.pixel_budget as f32 / pixels).sqrt()
        }
    }
}

impl Default for MatchEngine {
    fn default() -> Self {
        Self::from_settings(&DetectionSettings::default())
    }
}
