//! World GC: recenter and rescale document coordinates to bound magnitudes.

use crate::camera::Camera;
use crate::config::ViewportConfig;
use crate::store::StrokeStore;
use kurbo::{Affine, Point, Size, Vec2};

/// What a GC pass did to the document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GcOutcome {
    /// Translation applied to geometry (zero if no recenter).
    pub shift: Vec2,
    /// Integer divisor applied to geometry (1 if no rescale).
    pub divisor: f64,
}

impl GcOutcome {
    /// Combined transform applied to every stroke: shift, then divide.
    pub fn affine(&self) -> Affine {
        Affine::scale(1.0 / self.divisor) * Affine::translate(self.shift)
    }
}

/// Recenter shift for the world point under the screen center, if it drifted too far.
pub fn recenter_shift(camera: &Camera, viewport: Size, config: &ViewportConfig) -> Option<Vec2> {
    let center = camera.screen_to_world(Point::new(viewport.width / 2.0, viewport.height / 2.0));
    if !(center.x.is_finite() && center.y.is_finite()) {
        return None;
    }
    let limit = config.gc_recenter_limit;
    if center.x.abs() <= limit && center.y.abs() <= limit {
        return None;
    }
    let q = config.gc_recenter_quantum;
    let shift = Vec2::new(-(center.x / q).round() * q, -(center.y / q).round() * q);
    (shift != Vec2::ZERO).then_some(shift)
}

/// Integer rescale divisor for a document `radius`, if it grew too large.
///
/// Capped so the compensated camera scale stays inside the renormalization
/// range; otherwise the next renormalization would undo the rescale.
pub fn rescale_divisor(radius: f64, camera_scale: f64, config: &ViewportConfig) -> Option<f64> {
    if !(radius.is_finite() && radius > config.gc_radius_limit) {
        return None;
    }
    let wanted = (radius / config.gc_radius_target).floor().max(2.0);
    let cap = (config.renorm_max_scale / camera_scale).floor();
    let divisor = wanted.min(cap);
    if divisor < 2.0 {
        log::debug!("world GC rescale skipped: camera scale {camera_scale} leaves no headroom");
        return None;
    }
    Some(divisor)
}

/// Radius left after dividing by `divisor`, if it is still above the GC limit.
pub(crate) fn oversized_after(radius: f64, divisor: f64, config: &ViewportConfig) -> Option<f64> {
    let remaining = radius / divisor;
    (remaining.is_finite() && remaining > config.gc_radius_limit).then_some(remaining)
}

/// Recenter and/or rescale the document, compensating the camera so the
/// rendered picture is unchanged.
///
/// Stroke caches are invalidated by the transform; the caller must rebuild
/// the index and transform any stored snapshots with [`GcOutcome::affine`].
pub fn world_gc_if_needed(
    camera: &mut Camera,
    store: &mut StrokeStore,
    viewport: Size,
    config: &ViewportConfig,
) -> Option<GcOutcome> {
    let shift = recenter_shift(camera, viewport, config).unwrap_or(Vec2::ZERO);
    let shifted_radius = if shift == Vec2::ZERO {
        store.radius()
    } else {
        store
            .iter()
            .map(|s| {
                let b = s.bbox() + shift;
                b.x0.abs().max(b.x1.abs()).max(b.y0.abs()).max(b.y1.abs())
            })
            .fold(0.0, f64::max)
    };
    let divisor = rescale_divisor(shifted_radius, camera.scale, config).unwrap_or(1.0);
    if let Some(remaining) = oversized_after(shifted_radius, divisor, config) {
        log::warn!(
            "world GC leaves document radius {remaining:e} above {:e} (camera scale {})",
            config.gc_radius_limit,
            camera.scale
        );
    }
    if shift == Vec2::ZERO && divisor == 1.0 {
        return None;
    }

    let outcome = GcOutcome { shift, divisor };
    let affine = outcome.affine();
    for stroke in store.iter_mut() {
        stroke.transform(affine);
    }
    // screen = w * s + t = (w' * g - d) * s + t
    camera.tx -= shift.x * camera.scale;
    camera.ty -= shift.y * camera.scale;
    camera.scale *= divisor;
    camera.sanitize();
    log::info!(
        "world GC: shift=({}, {}), divisor={}, {} strokes",
        shift.x,
        shift.y,
        divisor,
        store.len()
    );
    Some(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::{Stroke, StrokeStyle};

    fn stroke_at(x: f64, y: f64) -> Stroke {
        Stroke::path_from_flat(vec![x, y, 1.0, x + 100.0, y + 50.0, 1.0], StrokeStyle::default())
    }

    #[test]
    fn test_no_gc_near_origin() {
        let config = ViewportConfig::default();
        let mut store = StrokeStore::new();
        store.add(stroke_at(0.0, 0.0));
        let mut camera = Camera::new();
        assert!(world_gc_if_needed(&mut camera, &mut store, Size::new(800.0, 600.0), &config).is_none());
    }

    #[test]
    fn test_recenter_preserves_screen_mapping() {
        let config = ViewportConfig::default();
        let viewport = Size::new(800.0, 600.0);
        let mut store = StrokeStore::new();
        store.add(stroke_at(3e8 + 12.0, -5e8));
        let world = Point::new(3e8 + 60.0, -5e8 + 20.0);
        let mut camera = Camera::new();
        camera.tx = 400.0 - world.x;
        camera.ty = 300.0 - world.y;
        let probe = store.iter().next().unwrap().as_path().unwrap().point(1);
        let screen_before = camera.world_to_screen(probe);

        let outcome = world_gc_if_needed(&mut camera, &mut store, viewport, &config).unwrap();
        assert_eq!(outcome.divisor, 1.0);
        assert_eq!(outcome.shift.x % 2048.0, 0.0);
        let probe = store.iter().next().unwrap().as_path().unwrap().point(1);
        assert!(probe.x.abs() < 2048.0 && probe.y.abs() < 2048.0);
        assert!((camera.world_to_screen(probe) - screen_before).hypot() < 1e-6);
    }

    #[test]
    fn test_rescale_divides_geometry_and_scales_camera() {
        let config = ViewportConfig::default();
        let viewport = Size::new(800.0, 600.0);
        let mut store = StrokeStore::new();
        store.add(stroke_at(0.0, 0.0));
        store.add(stroke_at(4e12, 0.0));
        let mut camera = Camera {
            scale: 1e-3,
            ..Camera::default()
        };
        let probe = Point::new(4e12 + 100.0, 50.0);
        let screen_before = camera.world_to_screen(probe);

        let outcome = world_gc_if_needed(&mut camera, &mut store, viewport, &config).unwrap();
        assert_eq!(outcome.shift, Vec2::ZERO);
        assert!(outcome.divisor >= 2.0);
        assert!(camera.scale <= config.renorm_max_scale);
        assert!(store.radius() <= config.gc_radius_limit);
        let moved = store.iter().nth(1).unwrap().as_path().unwrap().point(1);
        let relative = (camera.world_to_screen(moved) - screen_before).hypot() / screen_before.x.abs();
        assert!(relative < 1e-9);
    }

    #[test]
    fn test_rescale_capped_by_camera_headroom() {
        let config = ViewportConfig::default();
        assert_eq!(rescale_divisor(1e13, 0.5, &config), Some(1600.0));
        assert_eq!(rescale_divisor(1e13, 1e-4, &config), Some(1e6));
        assert_eq!(rescale_divisor(1e13, 500.0, &config), None);
        assert_eq!(rescale_divisor(1e13, 100.0, &config), Some(8.0));
        assert_eq!(rescale_divisor(1e11, 1.0, &config), None);
    }

    #[test]
    fn test_zoomed_in_rescale_skip_is_reported() {
        let config = ViewportConfig::default();
        let viewport = Size::new(800.0, 600.0);
        let mut store = StrokeStore::new();
        store.add(stroke_at(0.0, 0.0));
        store.add(stroke_at(4e12, 0.0));
        let mut camera = Camera {
            scale: 500.0,
            ..Camera::default()
        };
        assert!(world_gc_if_needed(&mut camera, &mut store, viewport, &config).is_none());
        assert_eq!(camera.scale, 500.0);
        assert!(oversized_after(store.radius(), 1.0, &config).is_some());
        assert!(oversized_after(store.radius(), 1e3, &config).is_none());
    }
}
