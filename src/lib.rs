//! loothound - screen-region template detection and pickup automation
//!
//! Continuously scans a screen region for known visual targets and
//! drives a two-mode automation loop: a repeating combat behavior
//! (periodic moves and attacks around an anchor point) interrupted by
//! a collection behavior that drains detected targets nearest-first.
//! The two behaviors never run concurrently.
//!
//! The crate is organized around two subsystems:
//!
//! - [`vision`]: template storage, multi-scale matching, and the
//!   background detection loop (the producer).
//! - [`controller`]: the state machine consuming detections into a
//!   prioritized queue and delivering actions (the consumer).
//!
//! Frame capture and input injection are host concerns behind the
//! [`vision::FrameSource`] and [`driver::ActionDriver`] traits.

pub mod config;
pub mod controller;
pub mod driver;
pub mod vision;

use std::sync::Arc;

pub use config::Settings;
pub use controller::{
    AutomationController, ControllerError, ControllerState, ControllerStatus, ShutdownOutcome,
};
pub use driver::{Action, ActionDriver, ActionResult};
pub use vision::{Detection, DetectionLoop, FrameSource, TemplateLibrary, VisionError};

/// One supervised automation session
///
/// Owns the detection loop / controller pair for a single monitored
/// screen region. Construct one per session and hold it wherever the
/// session is supervised.
pub struct BotSession {
    controller: Arc<AutomationController>,
}

impl BotSession {
    /// Wire a session from its collaborators
    ///
    /// `source` captures frames of the monitored region, `driver`
    /// delivers physical actions, and `library` holds the visual
    /// targets to hunt for.
    pub fn new(
        source: Box<dyn FrameSource>,
        driver: Arc<dyn ActionDriver>,
        library: TemplateLibrary,
        settings: Settings,
    ) -> Self {
        let detection = Arc::new(DetectionLoop::new(
            source,
            Arc::new(library),
            &settings.detection,
        ));
        let controller = Arc::new(AutomationController::new(detection, driver, settings));
        Self { controller }
    }

    /// Start detection and the combat/pickup cycle
    pub fn start(&self) -> Result<(), ControllerError> {
        self.controller.start()
    }

    /// Stop the session, draining in-flight work
    pub fn stop(&self) -> ShutdownOutcome {
        self.controller.stop()
    }

    /// Snapshot of the session for supervision
    pub fn status(&self) -> ControllerStatus {
        self.controller.status()
    }

    /// The underlying controller, for hosts that feed detections or
    /// poll more than the status surface
    pub fn controller(&self) -> &AutomationController {
        &self.controller
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::NullDriver;
    use crate::vision::{StaticFrameSource, Template};
    use image::{DynamicImage, GrayImage, Luma};

    #[test]
    fn test_session_lifecycle() {
        let frame =
            DynamicImage::ImageLuma8(GrayImage::from_pixel(32, 32, Luma([128]))).to_rgb8();
        let checker = GrayImage::from_fn(8, 8, |x, y| {
            if (x / 2 + y / 2) % 2 == 0 {
                Luma([255])
            } else {
                Luma([0])
            }
        });
        let mut library = TemplateLibrary::new();
        library.insert(Template::from_image(
            "loot",
            &DynamicImage::ImageLuma8(checker),
        ));

        let mut settings = Settings::default();
        settings.detection.match_threshold = 0.9;

        let session = BotSession::new(
            Box::new(StaticFrameSource::new(frame)),
            Arc::new(NullDriver),
            library,
            settings,
        );

        assert_eq!(session.status().state, ControllerState::Idle);
        session.start().unwrap();
        assert_eq!(session.status().state, ControllerState::Combat);
        assert!(session.status().detection_running);

        assert_eq!(session.stop(), ShutdownOutcome::Clean);
        assert_eq!(session.status().state, ControllerState::Stopped);
    }

    #[test]
    fn test_session_with_empty_library_refuses_start() {
        let frame =
            DynamicImage::ImageLuma8(GrayImage::from_pixel(32, 32, Luma([128]))).to_rgb8();
        let session = BotSession::new(
            Box::new(StaticFrameSource::new(frame)),
            Arc::new(NullDriver),
            TemplateLibrary::new(),
            Settings::default(),
        );

        assert!(session.start().is_err());
        assert_eq!(session.status().state, ControllerState::Idle);
    }
}
