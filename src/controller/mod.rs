//! Automation controller module
//!
//! Consumes detections from the vision layer and drives the
//! combat/pickup cycle through an [`crate::driver::ActionDriver`].

pub mod automation;
pub mod queue;
pub mod state;
pub mod wander;

pub use automation::{AutomationController, ShutdownOutcome};
pub use queue::{PendingTarget, TargetQueue};
pub use state::{ControllerState, ControllerStatus};
pub use wander::WanderRing;

use crate::vision::VisionError;

/// Controller errors
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("controller already running")]
    AlreadyRunning,
    #[error("failed to spawn controller thread: {0}")]
    Spawn(String),
    #[error(transparent)]
    Vision(#[from] VisionError),
}
