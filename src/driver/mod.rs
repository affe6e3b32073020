//! Action injection module
//!
//! Defines the closed action vocabulary and the seam through which the
//! controller delivers physical inputs. How a move, attack, or pickup
//! actually reaches the runtime (synthetic events, a device bridge, a
//! capture-replay harness) is the implementation's business.

use std::fmt;

/// The complete set of physical actions the controller can request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Walk/navigate toward a point
    Move,
    /// Fire an attack at a point
    Attack,
    /// Collect a target at a point
    PickUp,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Move => write!(f, "move"),
            Action::Attack => write!(f, "attack"),
            Action::PickUp => write!(f, "pickup"),
        }
    }
}

/// Outcome of one injected action
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResult {
    /// Whether the action was delivered
    pub success: bool,
    /// Wall-clock time the delivery took (ms)
    pub elapsed_ms: f32,
    /// Failure description when `success` is false
    pub error: Option<String>,
}

impl ActionResult {
    /// A successful delivery
    pub fn ok(elapsed_ms: f32) -> Self {
        Self {
            success: true,
            elapsed_ms,
            error: None,
        }
    }

    /// A failed delivery
    pub fn failed(error: impl Into<String>, elapsed_ms: f32) -> Self {
        Self {
            success: false,
            elapsed_ms,
            error: Some(error.into()),
        }
    }
}

/// Physical input delivery
///
/// Coordinates are in the same frame coordinate space detections use.
/// Failures are reported through [`ActionResult`], never panics; the
/// controller logs them and moves on.
pub trait ActionDriver: Send + Sync {
    /// Move toward a point, taking roughly `duration_ms`
    fn move_to(&self, x: i32, y: i32, duration_ms: u64) -> ActionResult;

    /// Attack at a point
    fn attack(&self, x: i32, y: i32) -> ActionResult;

    /// Pick up a target at a point, taking roughly `duration_ms`
    fn pick_up(&self, x: i32, y: i32, duration_ms: u64) -> ActionResult;

    /// Release every held key and button
    ///
    /// Called when combat is interrupted so a held input cannot leak
    /// into the pickup pass.
    fn release_inputs(&self) -> ActionResult;
}

/// Driver that logs every action and reports success
///
/// Useful for dry runs and the CLI test binary.
#[derive(Debug, Default)]
pub struct NullDriver;

impl ActionDriver for NullDriver {
    fn move_to(&self, x: i32, y: i32, duration_ms: u64) -> ActionResult {
        log::info!("[dry-run] {} to ({x}, {y}) over {duration_ms}ms", Action::Move);
        ActionResult::ok(0.0)
    }

    fn attack(&self, x: i32, y: i32) -> ActionResult {
        log::info!("[dry-run] {} at ({x}, {y})", Action::Attack);
        ActionResult::ok(0.0)
    }

    fn pick_up(&self, x: i32, y: i32, duration_ms: u64) -> ActionResult {
        log::info!("[dry-run] {} at ({x}, {y}) over {duration_ms}ms", Action::PickUp);
        ActionResult::ok(0.0)
    }

    fn release_inputs(&self) -> ActionResult {
        log::info!("[dry-run] release held inputs");
        ActionResult::ok(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_display() {
        assert_eq!(Action::Move.to_string(), "move");
        assert_eq!(Action::Attack.to_string(), "attack");
        assert_eq!(Action::PickUp.to_string(), "pickup");
    }

    #[test]
    fn test_result_constructors() {
        let ok = ActionResult::ok(12.5);
        assert!(ok.success);
        assert!(ok.error.is_none());

        let failed = ActionResult::failed("window lost focus", 3.0);
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("window lost focus"));
    }

    #[test]
    fn test_null_driver_always_succeeds() {
        let driver = NullDriver;
        assert!(driver.move_to(10, 20, 500).success);
        assert!(driver.attack(10, 20).success);
        assert!(driver.pick_up(10, 20, 3000).success);
        assert!(driver.release_inputs().success);
    }
}
