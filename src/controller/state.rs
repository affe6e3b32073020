//! Controller state machine vocabulary

use serde::{Deserialize, Serialize};

/// Lifecycle state of one automation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerState {
    /// Constructed, not yet started
    Idle,
    /// Cycling combat moves and attacks
    Combat,
    /// Draining the pending-target queue
    PickingUp,
    /// Stop requested; in-flight work finishing
    Stopping,
    /// All threads exited
    Stopped,
}

impl ControllerState {
    /// Whether the session is doing work (combat or pickup)
    pub fn is_active(&self) -> bool {
        matches!(self, ControllerState::Combat | ControllerState::PickingUp)
    }

    /// Whether the session has ended or is ending
    pub fn is_shutting_down(&self) -> bool {
        matches!(self, ControllerState::Stopping | ControllerState::Stopped)
    }
}

/// Snapshot of a session for supervising hosts
///
/// This, together with `start`/`stop`, is the whole surface a host
/// process (CLI, service wrapper) may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControllerStatus {
    /// Current state machine position
    pub state: ControllerState,
    /// Pending targets awaiting pickup
    pub queue_depth: usize,
    /// Whether the detection producer thread is alive
    pub detection_running: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_predicates() {
        assert!(ControllerState::Combat.is_active());
        assert!(ControllerState::PickingUp.is_active());
        assert!(!ControllerState::Idle.is_active());
        assert!(!ControllerState::Stopped.is_active());
    }

    #[test]
    fn test_shutdown_predicates() {
        assert!(ControllerState::Stopping.is_shutting_down());
        assert!(ControllerState::Stopped.is_shutting_down());
        assert!(!ControllerState::Combat.is_shutting_down());
    }
}
