//! Vision and detection module
//!
//! Handles frame acquisition, template storage, multi-scale template
//! matching, and the background detection loop.

pub mod capture;
pub mod detector;
pub mod matcher;
pub mod template;

pub use capture::{FrameSource, Region, StaticFrameSource};
pub use detector::{DetectionCallback, DetectionLoop, DetectionStats, StartOutcome, StopOutcome};
pub use matcher::{BoundingBox, Detection, MatchEngine};
pub use template::{Template, TemplateLibrary};

/// Vision system errors
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("screen capture unavailable: {0}")]
    CaptureUnavailable(String),
    #[error("failed to load template {path}: {reason}")]
    TemplateLoad { path: String, reason: String },
    #[error("template directory not readable: {0}")]
    TemplateDir(String),
    #[error("no templates loaded")]
    NoTemplates,
    #[error("invalid frame data")]
    InvalidFrameData,
}
