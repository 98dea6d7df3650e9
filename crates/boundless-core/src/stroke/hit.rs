//! Exact hit-testing against stroke geometry.

use super::path::{rects_overlap, ChunkParams, PathGeometry};
use super::shape::{ShapeGeometry, ShapeKind};
use super::{point_to_segment_dist, Stroke, StrokeKind};
use kurbo::{Point, Rect};

/// Hit-test parameters in the stroke's own coordinate space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitParams {
    /// Pick radius in world units.
    pub radius: f64,
    /// Chunking used to skip far parts of long paths.
    pub chunks: ChunkParams,
}

impl Stroke {
    /// World-space distance from `point` to this stroke if it is a hit.
    ///
    /// Filled interiors report a distance of zero.
    pub fn hit_distance(&self, point: Point, params: HitParams) -> Option<f64> {
        if !(point.x.is_finite() && point.y.is_finite()) {
            return None;
        }
        let width = self.style.width;
        let filled = self.style.fill.is_some();
        match &self.kind {
            StrokeKind::Path(path) => path_hit(path, point, params.radius.max(width * 0.6), params.chunks),
            StrokeKind::Shape(shape) => shape_hit(shape, point, params.radius, width, filled),
        }
    }
}

fn path_hit(path: &PathGeometry, point: Point, threshold: f64, chunks: ChunkParams) -> Option<f64> {
    match path.len() {
        0 => return None,
        1 => {
            let d = (point - path.point(0)).hypot();
            return (d <= threshold).then_some(d);
        }
        _ => {}
    }

    let probe = Rect::from_points(point, point).inflate(threshold, threshold);
    let scan = |start: usize, end: usize| {
        let mut best = f64::INFINITY;
        let mut prev = path.point(start);
        for i in start + 1..=end {
            let next = path.point(i);
            best = best.min(point_to_segment_dist(point, prev, next));
            prev = next;
        }
        best
    };

    let best = match path.chunks(chunks) {
        Some(list) => list
            .iter()
            .filter(|c| rects_overlap(c.bbox, probe))
            .map(|c| scan(c.start, c.end))
            .fold(f64::INFINITY, f64::min),
        None => scan(0, path.len() - 1),
    };
    (best <= threshold).then_some(best)
}

fn shape_hit(shape: &ShapeGeometry, point: Point, radius: f64, width: f64, filled: bool) -> Option<f64> {
    let half_w = width / 2.0;
    if shape.kind == ShapeKind::Line {
        let d = point_to_segment_dist(point, shape.start, shape.end);
        return (d <= radius.max(width * 0.6)).then_some(d);
    }

    let local = shape.to_local(point);
    let frame = shape.frame();
    match shape.kind {
        ShapeKind::Rect => {
            if filled {
                let d = outside_distance(frame, local);
                (d <= radius + half_w).then_some(d)
            } else {
                let d = edge_distance(frame, local);
                (d <= radius + half_w).then_some(d)
            }
        }
        ShapeKind::Ellipse => ellipse_hit(shape, local, radius, half_w, filled),
        ShapeKind::Text | ShapeKind::Image => {
            let d = outside_distance(frame, local);
            (d <= radius).then_some(d)
        }
        ShapeKind::Line => None,
    }
}

fn ellipse_hit(shape: &ShapeGeometry, local: Point, radius: f64, half_w: f64, filled: bool) -> Option<f64> {
    let c = shape.center();
    let h = shape.half_extents();
    let min_r = h.x.min(h.y);
    if min_r < f64::EPSILON {
        // Degenerate ellipse collapses to its long axis
        let (a, b) = if h.x >= h.y {
            (Point::new(c.x - h.x, c.y), Point::new(c.x + h.x, c.y))
        } else {
            (Point::new(c.x, c.y - h.y), Point::new(c.x, c.y + h.y))
        };
        let d = point_to_segment_dist(local, a, b);
        return (d <= radius + half_w).then_some(d);
    }

    let dx = (local.x - c.x) / h.x;
    let dy = (local.y - c.y) / h.y;
    let norm = (dx * dx + dy * dy).sqrt();
    if filled {
        let grown_x = (local.x - c.x) / (h.x + radius + half_w);
        let grown_y = (local.y - c.y) / (h.y + radius + half_w);
        let inside = grown_x * grown_x + grown_y * grown_y <= 1.0;
        let d = ((norm - 1.0) * min_r).max(0.0);
        inside.then_some(d)
    } else {
        let band = (radius + half_w) / min_r;
        let off = (norm - 1.0).abs();
        (off <= band).then_some(off * min_r)
    }
}

/// Distance from a point outside `rect` to it; zero inside.
fn outside_distance(rect: Rect, p: Point) -> f64 {
    let dx = (rect.x0 - p.x).max(0.0).max(p.x - rect.x1);
    let dy = (rect.y0 - p.y).max(0.0).max(p.y - rect.y1);
    dx.hypot(dy)
}

/// Distance from a point to the rectangle outline.
fn edge_distance(rect: Rect, p: Point) -> f64 {
    if rect.contains(p) {
        (p.x - rect.x0)
            .min(rect.x1 - p.x)
            .min(p.y - rect.y0)
            .min(rect.y1 - p.y)
    } else {
        outside_distance(rect, p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::{SerializableColor, StrokeStyle};
    use std::f64::consts::FRAC_PI_2;

    fn params(radius: f64) -> HitParams {
        HitParams {
            radius,
            chunks: ChunkParams::default(),
        }
    }

    fn style(width: f64, fill: bool) -> StrokeStyle {
        StrokeStyle {
            width,
            fill: fill.then(SerializableColor::white),
            ..StrokeStyle::default()
        }
    }

    #[test]
    fn test_path_hit_uses_width_threshold() {
        let stroke = Stroke::path_from_flat(vec![0.0, 0.0, 1.0, 100.0, 0.0, 1.0], style(20.0, false));
        // 0.6 * width = 12 beats the 1.0 radius
        assert!(stroke.hit_distance(Point::new(50.0, 11.0), params(1.0)).is_some());
        assert!(stroke.hit_distance(Point::new(50.0, 13.0), params(1.0)).is_none());
    }

    #[test]
    fn test_long_path_hit_through_chunks() {
        let flat: Vec<f64> = (0..2000).flat_map(|i| [i as f64, (i % 2) as f64, 1.0]).collect();
        let stroke = Stroke::path_from_flat(flat, style(1.0, false));
        let d = stroke.hit_distance(Point::new(1500.5, 3.0), params(4.0)).unwrap();
        assert!(d > 1.9 && d < 3.0);
        assert!(stroke.hit_distance(Point::new(1500.5, 30.0), params(4.0)).is_none());
    }

    #[test]
    fn test_single_point_path() {
        let stroke = Stroke::path_from_flat(vec![5.0, 5.0, 1.0], style(1.0, false));
        assert!(stroke.hit_distance(Point::new(6.0, 5.0), params(2.0)).is_some());
        assert!(stroke.hit_distance(Point::new(9.0, 5.0), params(2.0)).is_none());
    }

    #[test]
    fn test_rect_stroked_band_and_filled() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(100.0, 100.0);
        let stroked = Stroke::shape(ShapeKind::Rect, a, b, style(2.0, false));
        assert!(stroked.hit_distance(Point::new(50.0, 50.0), params(3.0)).is_none());
        assert!(stroked.hit_distance(Point::new(98.0, 50.0), params(3.0)).is_some());
        assert!(stroked.hit_distance(Point::new(103.5, 50.0), params(3.0)).is_some());

        let filled = Stroke::shape(ShapeKind::Rect, a, b, style(2.0, true));
        assert_eq!(filled.hit_distance(Point::new(50.0, 50.0), params(3.0)), Some(0.0));
    }

    #[test]
    fn test_ellipse_band() {
        let shape = Stroke::shape(
            ShapeKind::Ellipse,
            Point::new(-10.0, -10.0),
            Point::new(10.0, 10.0),
            style(0.0, false),
        );
        assert!(shape.hit_distance(Point::new(10.0, 0.0), params(0.5)).is_some());
        assert!(shape.hit_distance(Point::new(0.0, 0.0), params(0.5)).is_none());
        assert!(shape.hit_distance(Point::new(15.0, 0.0), params(0.5)).is_none());

        let filled = Stroke::shape(
            ShapeKind::Ellipse,
            Point::new(-10.0, -10.0),
            Point::new(10.0, 10.0),
            style(0.0, true),
        );
        assert!(filled.hit_distance(Point::new(0.0, 0.0), params(0.5)).is_some());
    }

    #[test]
    fn test_rotated_text_inverse_rotates() {
        let mut stroke = Stroke::shape(
            ShapeKind::Text,
            Point::new(-50.0, -5.0),
            Point::new(50.0, 5.0),
            style(1.0, false),
        );
        if let StrokeKind::Shape(shape) = &mut stroke.kind {
            shape.rotation = FRAC_PI_2;
        }
        stroke.recompute_bbox();
        // After a quarter turn the long axis is vertical
        assert!(stroke.hit_distance(Point::new(0.0, 40.0), params(1.0)).is_some());
        assert!(stroke.hit_distance(Point::new(40.0, 0.0), params(1.0)).is_none());
    }

    #[test]
    fn test_line_segment() {
        let line = Stroke::shape(ShapeKind::Line, Point::new(0.0, 0.0), Point::new(10.0, 10.0), style(1.0, false));
        assert!(line.hit_distance(Point::new(5.0, 5.5), params(1.0)).is_some());
        assert!(line.hit_distance(Point::new(5.0, 8.0), params(1.0)).is_none());
    }
}
