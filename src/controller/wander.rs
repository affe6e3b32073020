//! Combat movement geometry
//!
//! Samples pseudo-random points in a bounded ring around the anchor.
//! The inner exclusion keeps moves from degenerating into near-zero
//! steps; the edge margin keeps points away from screen borders.

use rand::Rng;

/// Ring around the anchor point that combat movement stays inside
#[derive(Debug, Clone)]
pub struct WanderRing {
    anchor: (i32, i32),
    radius: f32,
    inner_fraction: f32,
    bounds: (u32, u32),
    margin: i32,
}

impl WanderRing {
    /// Create a ring from combat settings
    pub fn from_settings(combat: &crate::config::settings::CombatSettings) -> Self {
        Self {
            anchor: combat.anchor_point(),
            radius: combat.wander_radius,
            inner_fraction: combat.inner_radius_fraction.clamp(0.0, 1.0),
            bounds: (combat.screen_width, combat.screen_height),
            margin: combat.edge_margin,
        }
    }

    /// The fixed anchor point
    pub fn anchor(&self) -> (i32, i32) {
        self.anchor
    }

    /// Sample a point in the ring, clamped inside the screen margin
    pub fn sample<R: Rng>(&self, rng: &mut R) -> (i32, i32) {
        let angle = rng.random_range(0.0..std::f32::consts::TAU);
        let dist = rng.random_range(self.inner_fraction..=1.0) * self.radius;

        let x = self.anchor.0 as f32 + dist * angle.cos();
        let y = self.anchor.1 as f32 + dist * angle.sin();

        self.clamp((x.round() as i32, y.round() as i32))
    }

    /// Keep a point at least `margin` pixels inside the screen
    fn clamp(&self, point: (i32, i32)) -> (i32, i32) {
        let max_x = (self.bounds.0 as i32 - self.margin).max(self.margin);
        let max_y = (self.bounds.1 as i32 - self.margin).max(self.margin);
        (
            point.0.clamp(self.margin, max_x),
            point.1.clamp(self.margin, max_y),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::CombatSettings;
    use crate::controller::queue::distance;

    #[test]
    fn test_samples_stay_in_ring() {
        let ring = WanderRing::from_settings(&CombatSettings::default());
        let mut rng = rand::rng();

        for _ in 0..200 {
            let point = ring.sample(&mut rng);
            let d = distance(point, ring.anchor());
            // Rounding adds at most ~1px of slack on either bound
            assert!(d >= 0.4 * 150.0 - 2.0, "degenerate move: {d}");
            assert!(d <= 150.0 + 2.0, "point left the ring: {d}");
        }
    }

    #[test]
    fn test_samples_respect_screen_margin() {
        let combat = CombatSettings {
            screen_width: 200,
            screen_height: 200,
            anchor: Some((10, 10)),
            wander_radius: 150.0,
            ..Default::default()
        };
        let ring = WanderRing::from_settings(&combat);
        let mut rng = rand::rng();

        for _ in 0..200 {
            let (x, y) = ring.sample(&mut rng);
            assert!((50..=150).contains(&x), "x = {x}");
            assert!((50..=150).contains(&y), "y = {y}");
        }
    }

    #[test]
    fn test_anchor_is_settings_center() {
        let ring = WanderRing::from_settings(&CombatSettings::default());
        assert_eq!(ring.anchor(), (960, 540));
    }
}
