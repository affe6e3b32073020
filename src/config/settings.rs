//! Runtime settings for detection and automation
//!
//! Defines all tunable parameters for the scan loop, the combat cycle,
//! and the pickup pass. Thresholds and radii here are empirical; treat
//! them as starting points, not constants.

use serde::{Deserialize, Serialize};

use crate::vision::capture::Region;

/// Main settings structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Template detection parameters
    pub detection: DetectionSettings,
    /// Combat movement/attack parameters
    pub combat: CombatSettings,
    /// Target pickup parameters
    pub pickup: PickupSettings,
    /// Thread timing parameters
    pub timings: TimingSettings,
}

impl Settings {
    /// Deserialize settings from a JSON document
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize settings to a JSON document
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Settings tuned for responsiveness over CPU use
    pub fn high_frequency_preset() -> Self {
        Self {
            detection: DetectionSettings {
                fps: 30.0,
                scale_ladder: vec![0.9, 1.0, 1.1],
                ..Default::default()
            },
            combat: CombatSettings {
                move_interval_ms: 1500,
                attack_interval_ms: 1000,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Settings tuned for low CPU use on large screens
    pub fn low_cpu_preset() -> Self {
        Self {
            detection: DetectionSettings {
                fps: 5.0,
                pixel_budget: 800_000,
                scale_ladder: vec![0.8, 1.0, 1.2],
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Template matching and scan loop parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSettings {
    /// Screen region to scan; `None` scans the whole primary display
    pub region: Option<Region>,
    /// Scan frequency of the detection loop
    pub fps: f32,
    /// Minimum correlation score for a raw candidate (0.0-1.0)
    pub match_threshold: f32,
    /// Template scale factors tried against every frame
    pub scale_ladder: Vec<f32>,
    /// Maximum box overlap (IoU) tolerated between two kept detections
    pub overlap_threshold: f32,
    /// Frames above this pixel count are downscaled before matching
    pub pixel_budget: u32,
    /// Capacity of the polled result buffer; oldest entries are dropped
    pub result_buffer_cap: usize,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            region: None,
            fps: 20.0,
            match_threshold: 0.7,
            scale_ladder: vec![0.7, 0.8, 0.9, 1.0, 1.1, 1.2, 1.3],
            overlap_threshold: 0.5,
            pixel_budget: 1_500_000,
            result_buffer_cap: 256,
        }
    }
}

/// Combat movement and attack parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatSettings {
    /// Screen width in pixels
    pub screen_width: u32,
    /// Screen height in pixels
    pub screen_height: u32,
    /// Anchor point override; `None` uses the screen center
    pub anchor: Option<(i32, i32)>,
    /// Radius of the wander ring around the anchor
    pub wander_radius: f32,
    /// Fraction of the radius below which points are never sampled
    pub inner_radius_fraction: f32,
    /// Minimum distance kept from the screen edges
    pub edge_margin: i32,
    /// Interval between move actions (ms)
    pub move_interval_ms: u64,
    /// Interval between attack actions (ms)
    pub attack_interval_ms: u64,
    /// Wander moves before one return-to-anchor move
    pub max_wander_moves: u32,
    /// Duration hint passed to move actions (ms)
    pub move_duration_ms: u64,
}

impl Default for CombatSettings {
    fn default() -> Self {
        Self {
            screen_width: 1920,
            screen_height: 1080,
            anchor: None,
            wander_radius: 150.0,
            inner_radius_fraction: 0.4,
            edge_margin: 50,
            move_interval_ms: 2000,
            attack_interval_ms: 1500,
            max_wander_moves: 30,
            move_duration_ms: 500,
        }
    }
}

impl CombatSettings {
    /// The anchor point combat movement and target sorting revolve around
    pub fn anchor_point(&self) -> (i32, i32) {
        self.anchor.unwrap_or((
            self.screen_width as i32 / 2,
            self.screen_height as i32 / 2,
        ))
    }
}

/// Target pickup parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickupSettings {
    /// Two detections within this distance are the same physical target
    pub dedup_radius: f32,
    /// Pending targets older than this are skipped, not attempted (ms)
    pub staleness_ms: u64,
    /// Pause after each pickup attempt so its effect registers (ms)
    pub settle_delay_ms: u64,
    /// Minimum gap between two pickup passes (ms)
    pub cooldown_ms: u64,
    /// Duration hint passed to pickup actions (ms)
    pub pickup_duration_ms: u64,
    /// How a pickup pass consumes the queue
    pub policy: PickupPolicy,
}

impl Default for PickupSettings {
    fn default() -> Self {
        Self {
            dedup_radius: 30.0,
            staleness_ms: 10_000,
            settle_delay_ms: 500,
            cooldown_ms: 2000,
            pickup_duration_ms: 3000,
            policy: PickupPolicy::DrainAll,
        }
    }
}

/// Queue consumption strategy for a pickup pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PickupPolicy {
    /// Attempt every pending target, nearest first
    DrainAll,
    /// Attempt only the nearest target and discard the rest of the pass
    NearestOnly,
}

/// Thread pacing and shutdown parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    /// Sleep slice of the controller loop; bounds stop latency (ms)
    pub loop_slice_ms: u64,
    /// How long to wait for a thread to confirm exit (ms)
    pub join_timeout_ms: u64,
    /// Interval between detection-loop health checks (ms)
    pub watchdog_interval_ms: u64,
    /// Initial delay before retrying a failed detection restart (ms)
    pub restart_backoff_ms: u64,
    /// Upper bound on the restart backoff (ms)
    pub max_restart_backoff_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            loop_slice_ms: 100,
            join_timeout_ms: 3000,
            watchdog_interval_ms: 10_000,
            restart_backoff_ms: 1000,
            max_restart_backoff_ms: 30_000,
        }
    }
}
