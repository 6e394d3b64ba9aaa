use glam::Vec2;

/// Per-frame damping toward the raw pointer target. Frame-rate dependent by
/// design, matching the feel of the animation it drives.
pub const SMOOTH_FACTOR: f32 = 0.2;
/// Slower damping applied to the motion-speed estimate.
pub const SPEED_FACTOR: f32 = 0.1;

/// Smooths raw pointer positions into a damped vector plus a scalar speed
/// estimate. Events write `target`; `advance` runs once per frame tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointerTracker {
    target: Vec2,
    smoothed: Vec2,
    previous_smoothed: Vec2,
    speed_estimate: f32,
}

impl PointerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a raw pointer position in device pixels. Both axes map to
    /// `[-1, 1]` with the vertical axis inverted (screen-down is vector-up).
    /// Positions outside the viewport are accepted as-is.
    pub fn pointer_moved(&mut self, x: f32, y: f32, viewport_width: f32, viewport_height: f32) {
        if viewport_width <= 0.0 || viewport_height <= 0.0 {
            return;
        }
        let normalized_x = x / viewport_width;
        let normalized_y = 1.0 - y / viewport_height;
        self.target = Vec2::new((normalized_x - 0.5) * 2.0, (normalized_y - 0.5) * 2.0);
    }

    /// Advance one frame: damp `smoothed` toward `target`, then damp the
    /// frame-to-frame travel distance into the speed estimate.
    pub fn advance(&mut self) {
        self.smoothed += (self.target - self.smoothed) * SMOOTH_FACTOR;

        let travelled = self.smoothed.distance(self.previous_smoothed);
        self.speed_estimate += (travelled - self.speed_estimate) * SPEED_FACTOR;
        self.previous_smoothed = self.smoothed;
    }

    pub fn smoothed(&self) -> Vec2 {
        self.smoothed
    }

    pub fn speed_estimate(&self) -> f32 {
        self.speed_estimate
    }
}

#[cfg(test)]
mod tests {
    use super::PointerTracker;
    use glam::Vec2;

    #[test]
    fn pointer_mapping_normalizes_and_inverts_y() {
        let mut tracker = PointerTracker::new();
        tracker.pointer_moved(0.0, 0.0, 800.0, 600.0);
        // Top-left of the viewport is (-1, +1) in vector space.
        for _ in 0..400 {
            tracker.advance();
        }
        let smoothed = tracker.smoothed();
        assert!((smoothed.x - -1.0).abs() < 1e-3);
        assert!((smoothed.y - 1.0).abs() < 1e-3);
    }

    #[test]
    fn out_of_viewport_positions_are_accepted() {
        let mut tracker = PointerTracker::new();
        tracker.pointer_moved(1200.0, -50.0, 800.0, 600.0);
        for _ in 0..400 {
            tracker.advance();
        }
        assert!(tracker.smoothed().x > 1.0);
        assert!(tracker.smoothed().y > 1.0);
    }

    #[test]
    fn smoothed_converges_and_speed_decays_on_held_target() {
        let mut tracker = PointerTracker::new();
        tracker.pointer_moved(600.0, 150.0, 800.0, 600.0);

        for _ in 0..600 {
            tracker.advance();
        }
        let target = Vec2::new(0.5, 0.5);
        assert!(tracker.smoothed().distance(target) < 1e-4);
        assert!(tracker.speed_estimate() < 1e-4);
    }

    #[test]
    fn speed_rises_while_the_pointer_travels() {
        let mut tracker = PointerTracker::new();
        tracker.pointer_moved(800.0, 0.0, 800.0, 600.0);
        tracker.advance();
        tracker.advance();
        assert!(tracker.speed_estimate() > 0.0);
    }
}
