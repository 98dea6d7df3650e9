//! Camera module for pan/zoom transforms.

use crate::config::ViewportConfig;
use kurbo::{Affine, Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Camera maps world coordinates to screen coordinates.
///
/// `screen = world * scale + (tx, ty)`. The scale is always finite and
/// positive; any operation that would break that resets the camera to the
/// identity instead of letting NaN leak into later frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Uniform world-to-screen scale.
    pub scale: f64,
    /// Horizontal translation in screen pixels.
    pub tx: f64,
    /// Vertical translation in screen pixels.
    pub ty: f64,
    /// Minimum allowed scale.
    #[serde(default = "default_min_scale")]
    pub min_scale: f64,
    /// Maximum allowed scale.
    #[serde(default = "default_max_scale")]
    pub max_scale: f64,
}

fn default_min_scale() -> f64 {
    1e-6
}

fn default_max_scale() -> f64 {
    1e6
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            scale: 1.0,
            tx: 0.0,
            ty: 0.0,
            min_scale: default_min_scale(),
            max_scale: default_max_scale(),
        }
    }
}

impl Camera {
    /// Create a new identity camera.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an identity camera using the clamp range from `config`.
    pub fn with_config(config: &ViewportConfig) -> Self {
        Self {
            min_scale: config.min_scale,
            max_scale: config.max_scale,
            ..Self::default()
        }
    }

    /// Current translation as a vector.
    pub fn offset(&self) -> Vec2 {
        Vec2::new(self.tx, self.ty)
    }

    /// Get the affine transform for rendering (world to screen).
    pub fn transform(&self) -> Affine {
        Affine::new([self.scale, 0.0, 0.0, self.scale, self.tx, self.ty])
    }

    /// Get the inverse transform for input handling (screen to world).
    pub fn inverse_transform(&self) -> Affine {
        let inv = 1.0 / self.scale;
        Affine::new([inv, 0.0, 0.0, inv, -self.tx * inv, -self.ty * inv])
    }

    /// Convert a world point to screen coordinates.
    pub fn world_to_screen(&self, world_point: Point) -> Point {
        Point::new(
            world_point.x * self.scale + self.tx,
            world_point.y * self.scale + self.ty,
        )
    }

    /// Convert a screen point to world coordinates.
    pub fn screen_to_world(&self, screen_point: Point) -> Point {
        Point::new(
            (screen_point.x - self.tx) / self.scale,
            (screen_point.y - self.ty) / self.scale,
        )
    }

    /// World-space rectangle covered by a viewport of the given size.
    pub fn visible_world_rect(&self, viewport: Size) -> Rect {
        let a = self.screen_to_world(Point::ZERO);
        let b = self.screen_to_world(Point::new(viewport.width, viewport.height));
        Rect::from_points(a, b)
    }

    /// Whether every field is usable.
    pub fn is_finite(&self) -> bool {
        self.scale.is_finite() && self.scale > 0.0 && self.tx.is_finite() && self.ty.is_finite()
    }

    /// Reset to safe defaults if any field went non-finite. Returns true on reset.
    pub fn sanitize(&mut self) -> bool {
        if self.is_finite() {
            return false;
        }
        log::warn!(
            "camera went non-finite (scale={}, tx={}, ty={}); resetting",
            self.scale,
            self.tx,
            self.ty
        );
        self.reset();
        true
    }

    /// Pan the camera by a delta in screen coordinates.
    pub fn pan(&mut self, delta: Vec2) {
        self.tx += delta.x;
        self.ty += delta.y;
        self.sanitize();
    }

    /// Zoom by `factor`, keeping the world point under `screen_point` fixed.
    pub fn zoom_around(&mut self, screen_point: Point, factor: f64) {
        self.zoom_around_clamped(screen_point, factor, self.min_scale, self.max_scale);
    }

    /// Zoom around a screen point with an explicit clamp range.
    pub fn zoom_around_clamped(&mut self, screen_point: Point, factor: f64, min: f64, max: f64) {
        let new_scale = (self.scale * factor).clamp(min, max);
        if !new_scale.is_finite() || new_scale <= 0.0 {
            self.reset();
            return;
        }

        // Convert screen point to world before zoom
        let world_point = self.screen_to_world(screen_point);

        self.scale = new_scale;
        self.tx = screen_point.x - world_point.x * new_scale;
        self.ty = screen_point.y - world_point.y * new_scale;
        self.sanitize();
    }

    /// Whether scale or translation left the canonical range.
    pub fn needs_renormalization(&self, config: &ViewportConfig) -> bool {
        self.scale < config.renorm_min_scale
            || self.scale > config.renorm_max_scale
            || self.tx.abs() > config.renorm_max_translation
            || self.ty.abs() > config.renorm_max_translation
    }

    /// Reset camera to the identity.
    pub fn reset(&mut self) {
        self.scale = 1.0;
        self.tx = 0.0;
        self.ty = 0.0;
    }

    /// Fit the camera to show the given bounding box.
    pub fn fit_to_bounds(&mut self, bounds: Rect, viewport: Size, padding: f64) {
        if bounds.is_zero_area() || !bounds.is_finite() {
            self.reset();
            return;
        }

        let padded_viewport = Size::new(
            (viewport.width - padding * 2.0).max(1.0),
            (viewport.height - padding * 2.0).max(1.0),
        );

        let scale_x = padded_viewport.width / bounds.width();
        let scale_y = padded_viewport.height / bounds.height();
        self.scale = scale_x.min(scale_y).clamp(self.min_scale, self.max_scale);

        // Center the bounds in the viewport
        let bounds_center = bounds.center();
        self.tx = viewport.width / 2.0 - bounds_center.x * self.scale;
        self.ty = viewport.height / 2.0 - bounds_center.y * self.scale;
        self.sanitize();
    }
}
