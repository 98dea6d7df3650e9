//! Continuous-navigation detection for the snapshot fast path.

use boundless_core::camera::Camera;
use boundless_core::config::ViewportConfig;
use std::time::{Duration, Instant};

/// Tracks camera motion and decides whether a frame is mid-navigation.
#[derive(Debug, Clone)]
pub struct NavigationTracker {
    last_camera: Option<Camera>,
    last_motion: Option<Instant>,
    idle: Duration,
}

impl Default for NavigationTracker {
    fn default() -> Self {
        Self::new(Duration::from_millis(150))
    }
}

impl NavigationTracker {
    pub fn new(idle: Duration) -> Self {
        Self {
            last_camera: None,
            last_motion: None,
            idle,
        }
    }

    pub fn from_config(config: &ViewportConfig) -> Self {
        Self::new(Duration::from_millis(config.navigation_idle_ms))
    }

    /// Record the camera for this frame. Returns true if it moved.
    pub fn observe(&mut self, camera: &Camera, now: Instant) -> bool {
        let moved = self.last_camera.is_some_and(|last| {
            last.scale != camera.scale || last.tx != camera.tx || last.ty != camera.ty
        });
        if moved {
            self.last_motion = Some(now);
        }
        self.last_camera = Some(*camera);
        moved
    }

    /// Whether the camera moved within the idle window.
    pub fn is_navigating(&self, now: Instant) -> bool {
        self.last_motion
            .is_some_and(|t| now.saturating_duration_since(t) < self.idle)
    }

    /// Forget any motion, e.g. after renormalization resets the camera.
    pub fn settle(&mut self) {
        self.last_motion = None;
        self.last_camera = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_then_idle() {
        let mut tracker = NavigationTracker::default();
        let start = Instant::now();
        let mut camera = Camera::new();
        assert!(!tracker.observe(&camera, start));
        assert!(!tracker.is_navigating(start));

        camera.tx += 5.0;
        assert!(tracker.observe(&camera, start));
        assert!(tracker.is_navigating(start + Duration::from_millis(100)));
        assert!(!tracker.observe(&camera, start + Duration::from_millis(100)));
        assert!(!tracker.is_navigating(start + Duration::from_millis(151)));
    }

    #[test]
    fn test_settle_clears_motion() {
        let mut tracker = NavigationTracker::new(Duration::from_secs(1));
        let now = Instant::now();
        let mut camera = Camera::new();
        tracker.observe(&camera, now);
        camera.scale = 2.0;
        tracker.observe(&camera, now);
        tracker.settle();
        assert!(!tracker.is_navigating(now));
    }
}
