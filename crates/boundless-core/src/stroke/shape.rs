//! Vector shapes defined by two corner points.

use kurbo::{Affine, Point, Rect, Vec2};
use serde::{Deserialize, Serialize};

/// Kind of vector shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Line,
    Rect,
    Ellipse,
    Text,
    Image,
}

/// Layout data carried by text and image shapes. Layout itself happens elsewhere.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShapePayload {
    #[default]
    None,
    Text { content: String, font_size: f64 },
    Image { source: String },
}

/// Shape geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeGeometry {
    pub kind: ShapeKind,
    pub start: Point,
    pub end: Point,
    /// Rotation in radians around the center (ignored for lines).
    #[serde(default)]
    pub rotation: f64,
    /// Mirrored about the frame's vertical center line, before rotation.
    #[serde(default)]
    pub mirrored: bool,
    #[serde(default)]
    pub payload: ShapePayload,
}

impl ShapeGeometry {
    /// Create a new unrotated shape.
    pub fn new(kind: ShapeKind, start: Point, end: Point) -> Self {
        Self {
            kind,
            start,
            end,
            rotation: 0.0,
            mirrored: false,
            payload: ShapePayload::None,
        }
    }

    /// Center of the corner rectangle.
    pub fn center(&self) -> Point {
        self.start.midpoint(self.end)
    }

    /// Half extents of the unrotated frame.
    pub fn half_extents(&self) -> Vec2 {
        Vec2::new(
            (self.end.x - self.start.x).abs() / 2.0,
            (self.end.y - self.start.y).abs() / 2.0,
        )
    }

    /// Unrotated frame rectangle.
    pub fn frame(&self) -> Rect {
        Rect::from_points(self.start, self.end)
    }

    /// Whether the rotation should be honoured for this kind.
    pub fn is_rotated(&self) -> bool {
        self.kind != ShapeKind::Line && self.rotation != 0.0
    }

    /// Whether the local frame differs from world axes.
    fn has_local_frame(&self) -> bool {
        self.kind != ShapeKind::Line && (self.rotation != 0.0 || self.mirrored)
    }

    fn mirror(&self) -> Affine {
        if self.mirrored {
            let c = self.center().to_vec2();
            Affine::translate(c) * Affine::scale_non_uniform(-1.0, 1.0) * Affine::translate(-c)
        } else {
            Affine::IDENTITY
        }
    }

    /// Map a world point into the unrotated frame (identity when unrotated).
    pub fn to_local(&self, point: Point) -> Point {
        if !self.has_local_frame() {
            return point;
        }
        self.mirror() * (Affine::rotate_about(-self.rotation, self.center()) * point)
    }

    /// Transform from the unrotated frame to the world.
    pub fn local_to_world(&self) -> Affine {
        if self.has_local_frame() {
            Affine::rotate_about(self.rotation, self.center()) * self.mirror()
        } else {
            Affine::IDENTITY
        }
    }

    /// Unpadded axis-aligned bounds.
    pub fn bounds(&self) -> Rect {
        if self.kind == ShapeKind::Line || !self.is_rotated() {
            return self.frame();
        }
        let c = self.center();
        let h = self.half_extents();
        let (sin, cos) = self.rotation.sin_cos();
        let (ex, ey) = if self.kind == ShapeKind::Ellipse {
            (
                ((h.x * cos).powi(2) + (h.y * sin).powi(2)).sqrt(),
                ((h.x * sin).powi(2) + (h.y * cos).powi(2)).sqrt(),
            )
        } else {
            (
                (h.x * cos).abs() + (h.y * sin).abs(),
                (h.x * sin).abs() + (h.y * cos).abs(),
            )
        };
        Rect::new(c.x - ex, c.y - ey, c.x + ex, c.y + ey)
    }

    /// Apply an affine transform.
    ///
    /// Axis-aligned scale/translate maps the corners directly; anything with a
    /// rotation component is decomposed into center, extents and angle.
    pub(crate) fn transform(&mut self, affine: Affine) {
        let [a, b, c, d, _, _] = affine.as_coeffs();
        let axis_aligned = b == 0.0 && c == 0.0 && a > 0.0 && d > 0.0;
        if self.kind == ShapeKind::Line || axis_aligned {
            self.start = affine * self.start;
            self.end = affine * self.end;
        } else {
            let center = affine * self.center();
            // A reflection is carried as a mirror flag; the rest is a rotation.
            let (a, b) = if a * d - b * c < 0.0 {
                self.mirrored = !self.mirrored;
                self.rotation = -self.rotation;
                (-a, -b)
            } else {
                (a, b)
            };
            let sx = a.hypot(b);
            let sy = c.hypot(d);
            let h = self.half_extents();
            let h = Vec2::new(h.x * sx, h.y * sy);
            self.rotation += b.atan2(a);
            self.start = center - h;
            self.end = center + h;
        }
        if let ShapePayload::Text { font_size, .. } = &mut self.payload {
            let scale = (a * d - b * c).abs().sqrt();
            if scale.is_finite() {
                *font_size *= scale;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_unrotated_bounds() {
        let shape = ShapeGeometry::new(ShapeKind::Rect, Point::new(10.0, 20.0), Point::new(0.0, 0.0));
        assert_eq!(shape.bounds(), Rect::new(0.0, 0.0, 10.0, 20.0));
    }

    #[test]
    fn test_rotated_rect_bounds() {
        let mut shape = ShapeGeometry::new(ShapeKind::Rect, Point::new(-20.0, -10.0), Point::new(20.0, 10.0));
        shape.rotation = FRAC_PI_2;
        let b = shape.bounds();
        assert!((b.x1 - 10.0).abs() < 1e-9);
        assert!((b.y1 - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_axis_aligned_transform_keeps_corner_order() {
        let mut shape = ShapeGeometry::new(ShapeKind::Ellipse, Point::new(10.0, 10.0), Point::new(0.0, 0.0));
        shape.transform(Affine::new([2.0, 0.0, 0.0, 2.0, 5.0, 5.0]));
        assert_eq!(shape.start, Point::new(25.0, 25.0));
        assert_eq!(shape.end, Point::new(5.0, 5.0));
    }

    #[test]
    fn test_reflection_sets_mirror_flag() {
        let mut shape = ShapeGeometry::new(ShapeKind::Text, Point::new(0.0, 0.0), Point::new(10.0, 4.0));
        shape.rotation = 0.3;
        let before = shape.local_to_world();
        let flip = Affine::translate((20.0, 0.0)) * Affine::scale_non_uniform(-1.0, 1.0);
        shape.transform(flip);

        assert!(shape.mirrored);
        assert!((shape.rotation + 0.3).abs() < 1e-12);
        let after = shape.local_to_world();
        for p in [Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(3.0, 4.0)] {
            // Frame points are relative to the shape, so compare through the frame center.
            let local = p - Point::new(5.0, 2.0);
            let expected = flip * (before * (Point::new(5.0, 2.0) + local));
            let actual = after * (shape.center() + local);
            assert!((expected - actual).hypot() < 1e-9, "{p:?}: {expected:?} vs {actual:?}");
        }
        let world = flip * (before * Point::new(1.0, 1.0));
        let local = shape.to_local(world);
        assert!((local - (shape.center() + Vec2::new(-4.0, -1.0))).hypot() < 1e-9);

        shape.transform(flip);
        assert!(!shape.mirrored);
        assert!((shape.rotation - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_rotation_accumulates() {
        let mut shape = ShapeGeometry::new(ShapeKind::Image, Point::new(0.0, 0.0), Point::new(10.0, 4.0));
        shape.transform(Affine::rotate_about(0.5, shape.center()));
        assert!((shape.rotation - 0.5).abs() < 1e-12);
        assert!((shape.center() - Point::new(5.0, 2.0)).hypot() < 1e-9);
        let h = shape.half_extents();
        assert!((h.x - 5.0).abs() < 1e-9 && (h.y - 2.0).abs() < 1e-9);
    }
}
