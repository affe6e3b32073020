//! Configuration module
//!
//! Holds all runtime tunables for detection, combat, and pickup.

pub mod settings;

pub use settings::{PickupPolicy, Settings};
