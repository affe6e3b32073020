//! Pending-target queue
//!
//! Detections accepted for pickup become [`PendingTarget`]s ordered by
//! distance to the anchor, nearest first. Two detections whose centers
//! fall within the dedup radius are treated as one physical target.

use std::time::{Duration, Instant};

use crate::vision::Detection;

/// Euclidean distance between two points
pub fn distance(a: (i32, i32), b: (i32, i32)) -> f32 {
    let dx = (a.0 - b.0) as f32;
    let dy = (a.1 - b.1) as f32;
    (dx * dx + dy * dy).sqrt()
}

/// A detection accepted into the pickup queue
#[derive(Debug, Clone)]
pub struct PendingTarget {
    /// The originating detection
    pub detection: Detection,
    /// Center of the detection's bounding box
    pub center: (i32, i32),
    /// Distance from the center to the anchor point
    pub distance: f32,
    /// When the target entered the queue
    pub first_seen: Instant,
}

impl PendingTarget {
    /// Derive a pending target from a detection
    pub fn new(detection: Detection, anchor: (i32, i32)) -> Self {
        let center = detection.bbox.center();
        Self {
            distance: distance(center, anchor),
            center,
            detection,
            first_seen: Instant::now(),
        }
    }

    /// Whether the target has been queued longer than `threshold`
    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.first_seen.elapsed() > threshold
    }
}

/// Distance-ordered queue of pending targets
///
/// Invariant: no two entries are within the dedup radius of each
/// other, and entries are sorted by ascending distance at all times.
#[derive(Debug)]
pub struct TargetQueue {
    targets: Vec<PendingTarget>,
    dedup_radius: f32,
}

impl TargetQueue {
    /// Create an empty queue with the given dedup radius
    pub fn new(dedup_radius: f32) -> Self {
        Self {
            targets: Vec::new(),
            dedup_radius,
        }
    }

    /// Offer a target; returns whether it was accepted
    ///
    /// A target within the dedup radius of an existing entry is a
    /// duplicate observation and is discarded. Accepted targets are
    /// inserted keeping the queue sorted nearest-first.
    pub fn offer(&mut self, target: PendingTarget) -> bool {
        let duplicate = self
            .targets
            .iter()
            .any(|t| distance(t.center, target.center) <= self.dedup_radius);
        if duplicate {
            return false;
        }

        let position = self
            .targets
            .partition_point(|t| t.distance <= target.distance);
        self.targets.insert(position, target);
        true
    }

    /// Take the nearest pending target
    pub fn pop_nearest(&mut self) -> Option<PendingTarget> {
        if self.targets.is_empty() {
            None
        } else {
            Some(self.targets.remove(0))
        }
    }

    /// Discard every pending target, returning how many were dropped
    pub fn clear(&mut self) -> usize {
        let dropped = self.targets.len();
        self.targets.clear();
        dropped
    }

    /// Number of pending targets
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::BoundingBox;

    fn detection_at(x: i32, y: i32) -> Detection {
        Detection {
            template: "loot".to_string(),
            confidence: 0.9,
            bbox: BoundingBox::new(x, y, 40, 40),
            scale: 1.0,
            timestamp: 0.0,
        }
    }

    /// Target whose center lands `dist` pixels right of the anchor
    fn target_at_distance(anchor: (i32, i32), dist: i32) -> PendingTarget {
        PendingTarget::new(detection_at(anchor.0 + dist - 20, anchor.1 - 20), anchor)
    }

    #[test]
    fn test_nearest_first_ordering() {
        let anchor = (960, 540);
        let mut queue = TargetQueue::new(30.0);

        // Arrival order 300, 50, 150; drain order must be by distance
        for dist in [300, 50, 150] {
            assert!(queue.offer(target_at_distance(anchor, dist)));
        }

        let drained: Vec<f32> = std::iter::from_fn(|| queue.pop_nearest())
            .map(|t| t.distance)
            .collect();
        assert_eq!(drained, vec![50.0, 150.0, 300.0]);
    }

    #[test]
    fn test_dedup_radius_collapses_near_detections() {
        let anchor = (960, 540);
        let mut queue = TargetQueue::new(30.0);

        assert!(queue.offer(PendingTarget::new(detection_at(100, 100), anchor)));
        // Centers (120,120) and (128,122) are ~8.2px apart, within 30
        assert!(!queue.offer(PendingTarget::new(detection_at(108, 102), anchor)));

        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_far_detections_both_accepted() {
        let anchor = (960, 540);
        let mut queue = TargetQueue::new(30.0);

        assert!(queue.offer(PendingTarget::new(detection_at(100, 100), anchor)));
        assert!(queue.offer(PendingTarget::new(detection_at(400, 400), anchor)));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_no_two_entries_within_radius_after_mixed_offers() {
        let anchor = (0, 0);
        let mut queue = TargetQueue::new(30.0);

        for i in 0..50 {
            let x = (i * 13) % 300;
            let y = (i * 29) % 300;
            queue.offer(PendingTarget::new(detection_at(x, y), anchor));
        }

        let mut centers = Vec::new();
        while let Some(t) = queue.pop_nearest() {
            centers.push(t.center);
        }
        for (i, a) in centers.iter().enumerate() {
            for b in centers.iter().skip(i + 1) {
                assert!(
                    distance(*a, *b) > 30.0,
                    "entries {a:?} and {b:?} violate the dedup radius"
                );
            }
        }
    }

    #[test]
    fn test_staleness() {
        let anchor = (0, 0);
        let mut target = PendingTarget::new(detection_at(10, 10), anchor);
        assert!(!target.is_stale(Duration::from_secs(10)));

        target.first_seen = Instant::now() - Duration::from_secs(11);
        assert!(target.is_stale(Duration::from_secs(10)));
    }

    #[test]
    fn test_clear_reports_dropped() {
        let anchor = (0, 0);
        let mut queue = TargetQueue::new(10.0);
        queue.offer(PendingTarget::new(detection_at(100, 100), anchor));
        queue.offer(PendingTarget::new(detection_at(300, 300), anchor));

        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }
}
