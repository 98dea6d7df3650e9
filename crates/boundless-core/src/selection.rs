//! Selection and manipulation handle system.

use crate::store::StrokeStore;
use crate::stroke::{ShapeKind, Stroke, StrokeId, StrokeKind};
use kurbo::{Affine, Point, Rect, Vec2};
use serde::{Deserialize, Serialize};

/// Handle size in screen pixels.
pub const HANDLE_SIZE: f64 = 16.0;
/// Handle hit tolerance in screen pixels.
pub const HANDLE_HIT_TOLERANCE: f64 = 24.0;
/// Distance from the top edge to the rotation handle, in screen pixels.
pub const ROTATE_HANDLE_OFFSET: f64 = 25.0;

/// Type of selection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandleKind {
    /// Endpoint handle for lines (index 0 = start, 1 = end).
    Endpoint(usize),
    /// Corner handle.
    Corner(Corner),
    /// Edge midpoint handle.
    Edge(Edge),
    /// Rotation handle (positioned outside the frame).
    Rotate,
}

/// Corner positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Edge positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Edge {
    Top,
    Right,
    Bottom,
    Left,
}

/// A selection handle with its position and type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Handle {
    /// Position in world coordinates.
    pub position: Point,
    /// Handle type.
    pub kind: HandleKind,
}

impl Handle {
    /// Create a new handle.
    pub fn new(position: Point, kind: HandleKind) -> Self {
        Self { position, kind }
    }

    /// Check if a point (in world coordinates) hits this handle.
    /// `tolerance` should be adjusted for camera zoom.
    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        (point - self.position).hypot2() <= tolerance * tolerance
    }
}

/// Selected stroke IDs, in selection order.
///
/// Holds IDs only; strokes are resolved against the store on use and IDs
/// whose stroke is gone are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    ids: Vec<StrokeId>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> &[StrokeId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: StrokeId) -> bool {
        self.ids.contains(&id)
    }

    /// Replace the selection with a single stroke.
    pub fn select(&mut self, id: StrokeId) {
        self.ids.clear();
        self.ids.push(id);
    }

    /// Replace the selection.
    pub fn select_all(&mut self, ids: impl IntoIterator<Item = StrokeId>) {
        self.ids.clear();
        for id in ids {
            self.add(id);
        }
    }

    /// Add a stroke to the selection.
    pub fn add(&mut self, id: StrokeId) {
        if !self.ids.contains(&id) {
            self.ids.push(id);
        }
    }

    /// Add or remove a stroke.
    pub fn toggle(&mut self, id: StrokeId) {
        if !self.remove(id) {
            self.ids.push(id);
        }
    }

    pub fn remove(&mut self, id: StrokeId) -> bool {
        let before = self.ids.len();
        self.ids.retain(|other| *other != id);
        self.ids.len() != before
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Forget IDs whose strokes no longer exist.
    pub fn prune(&mut self, store: &StrokeStore) {
        self.ids.retain(|id| store.contains(*id));
    }

    /// Resolve to live strokes.
    pub fn resolve<'a>(&'a self, store: &'a StrokeStore) -> impl Iterator<Item = &'a Stroke> + 'a {
        self.ids.iter().filter_map(|id| store.get(*id))
    }

    /// Union of the selected strokes' bounding boxes.
    pub fn bounds(&self, store: &StrokeStore) -> Option<Rect> {
        self.resolve(store).map(|s| s.bbox()).reduce(|a, b| a.union(b))
    }
}

/// Handles for one stroke. `handle_offset` is the rotation handle distance in world units.
pub fn stroke_handles(stroke: &Stroke, handle_offset: f64) -> Vec<Handle> {
    match &stroke.kind {
        StrokeKind::Path(_) => corner_handles(stroke.bbox()),
        StrokeKind::Shape(shape) => match shape.kind {
            ShapeKind::Line => vec![
                Handle::new(shape.start, HandleKind::Endpoint(0)),
                Handle::new(shape.end, HandleKind::Endpoint(1)),
            ],
            ShapeKind::Rect | ShapeKind::Ellipse | ShapeKind::Image => {
                frame_handles(shape.frame(), shape.rotation, handle_offset)
            }
            // Text only rotates; resizing happens through font size
            ShapeKind::Text => {
                let frame = shape.frame();
                vec![Handle::new(
                    rotate_about(frame.center(), shape.rotation, 0.0, -frame.height() / 2.0 - handle_offset),
                    HandleKind::Rotate,
                )]
            }
        },
    }
}

/// Handles for a selection: the stroke's own handles when one is selected,
/// corners and edges of the combined bounds otherwise.
pub fn selection_handles(selection: &Selection, store: &StrokeStore, handle_offset: f64) -> Vec<Handle> {
    let mut strokes = selection.resolve(store);
    let Some(first) = strokes.next() else {
        return Vec::new();
    };
    if strokes.next().is_none() {
        return stroke_handles(first, handle_offset);
    }
    selection.bounds(store).map(bounds_handles).unwrap_or_default()
}

/// Corner and edge handles of a bounding box.
pub fn bounds_handles(bounds: Rect) -> Vec<Handle> {
    let mut handles = corner_handles(bounds);
    handles.extend(edge_handles(bounds));
    handles
}

/// Find which handle (if any) is hit at the given point.
pub fn hit_test_handles(handles: &[Handle], point: Point, tolerance: f64) -> Option<HandleKind> {
    handles.iter().find(|h| h.hit_test(point, tolerance)).map(|h| h.kind)
}

fn rotate_about(center: Point, rotation: f64, dx: f64, dy: f64) -> Point {
    let (sin_r, cos_r) = rotation.sin_cos();
    Point::new(center.x + dx * cos_r - dy * sin_r, center.y + dx * sin_r + dy * cos_r)
}

/// Generate corner handles for a bounding rectangle.
fn corner_handles(bounds: Rect) -> Vec<Handle> {
    vec![
        Handle::new(Point::new(bounds.x0, bounds.y0), HandleKind::Corner(Corner::TopLeft)),
        Handle::new(Point::new(bounds.x1, bounds.y0), HandleKind::Corner(Corner::TopRight)),
        Handle::new(Point::new(bounds.x0, bounds.y1), HandleKind::Corner(Corner::BottomLeft)),
        Handle::new(Point::new(bounds.x1, bounds.y1), HandleKind::Corner(Corner::BottomRight)),
    ]
}

fn edge_handles(bounds: Rect) -> Vec<Handle> {
    let c = bounds.center();
    vec![
        Handle::new(Point::new(c.x, bounds.y0), HandleKind::Edge(Edge::Top)),
        Handle::new(Point::new(bounds.x1, c.y), HandleKind::Edge(Edge::Right)),
        Handle::new(Point::new(c.x, bounds.y1), HandleKind::Edge(Edge::Bottom)),
        Handle::new(Point::new(bounds.x0, c.y), HandleKind::Edge(Edge::Left)),
    ]
}

/// Corners, edges and a rotation handle for a (possibly rotated) frame.
fn frame_handles(frame: Rect, rotation: f64, handle_offset: f64) -> Vec<Handle> {
    let c = frame.center();
    let hw = frame.width() / 2.0;
    let hh = frame.height() / 2.0;
    let at = |dx: f64, dy: f64| rotate_about(c, rotation, dx, dy);
    vec![
        Handle::new(at(-hw, -hh), HandleKind::Corner(Corner::TopLeft)),
        Handle::new(at(hw, -hh), HandleKind::Corner(Corner::TopRight)),
        Handle::new(at(-hw, hh), HandleKind::Corner(Corner::BottomLeft)),
        Handle::new(at(hw, hh), HandleKind::Corner(Corner::BottomRight)),
        Handle::new(at(0.0, -hh), HandleKind::Edge(Edge::Top)),
        Handle::new(at(hw, 0.0), HandleKind::Edge(Edge::Right)),
        Handle::new(at(0.0, hh), HandleKind::Edge(Edge::Bottom)),
        Handle::new(at(-hw, 0.0), HandleKind::Edge(Edge::Left)),
        Handle::new(at(0.0, -hh - handle_offset), HandleKind::Rotate),
    ]
}

/// Affine that drags `handle` of `bounds` by `delta`, scaling about the opposite side.
///
/// `keep_aspect_ratio` uses the larger of the two scale factors on both axes
/// for corner handles. Degenerate axes are left unscaled.
pub fn resize_transform(bounds: Rect, handle: HandleKind, delta: Vec2, keep_aspect_ratio: bool) -> Affine {
    let (anchor, sx, sy) = match handle {
        HandleKind::Corner(corner) => {
            let (anchor, dx, dy) = match corner {
                Corner::TopLeft => (Point::new(bounds.x1, bounds.y1), -delta.x, -delta.y),
                Corner::TopRight => (Point::new(bounds.x0, bounds.y1), delta.x, -delta.y),
                Corner::BottomLeft => (Point::new(bounds.x1, bounds.y0), -delta.x, delta.y),
                Corner::BottomRight => (Point::new(bounds.x0, bounds.y0), delta.x, delta.y),
            };
            let mut sx = axis_scale(bounds.width(), dx);
            let mut sy = axis_scale(bounds.height(), dy);
            if keep_aspect_ratio {
                let s = if sx.abs() >= sy.abs() { sx } else { sy };
                sx = s;
                sy = s;
            }
            (anchor, sx, sy)
        }
        HandleKind::Edge(edge) => {
            let c = bounds.center();
            match edge {
                Edge::Top => (Point::new(c.x, bounds.y1), 1.0, axis_scale(bounds.height(), -delta.y)),
                Edge::Bottom => (Point::new(c.x, bounds.y0), 1.0, axis_scale(bounds.height(), delta.y)),
                Edge::Left => (Point::new(bounds.x1, c.y), axis_scale(bounds.width(), -delta.x), 1.0),
                Edge::Right => (Point::new(bounds.x0, c.y), axis_scale(bounds.width(), delta.x), 1.0),
            }
        }
        HandleKind::Endpoint(_) | HandleKind::Rotate => return Affine::IDENTITY,
    };
    Affine::translate(anchor.to_vec2())
        * Affine::scale_non_uniform(sx, sy)
        * Affine::translate(-anchor.to_vec2())
}

fn axis_scale(extent: f64, grow: f64) -> f64 {
    if extent <= f64::EPSILON {
        return 1.0;
    }
    let s = (extent + grow) / extent;
    if s.is_finite() { s } else { 1.0 }
}

/// Rotation about `center` that carries `from` to the direction of `to`.
///
/// With `snap_to_15deg` the angle is rounded to 15° increments.
pub fn rotation_transform(center: Point, from: Point, to: Point, snap_to_15deg: bool) -> (Affine, f64) {
    let a = (from - center).atan2();
    let b = (to - center).atan2();
    let mut angle = b - a;
    if snap_to_15deg {
        let snap_angle = std::f64::consts::PI / 12.0;
        angle = (angle / snap_angle).round() * snap_angle;
    }
    (Affine::rotate_about(angle, center), angle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::StrokeStyle;

    fn rect_stroke() -> Stroke {
        Stroke::shape(
            ShapeKind::Rect,
            Point::new(0.0, 0.0),
            Point::new(100.0, 50.0),
            StrokeStyle {
                width: 0.0,
                ..StrokeStyle::default()
            },
        )
    }

    #[test]
    fn test_line_handles() {
        let line = Stroke::shape(ShapeKind::Line, Point::new(0.0, 0.0), Point::new(10.0, 0.0), StrokeStyle::default());
        let handles = stroke_handles(&line, 25.0);
        assert_eq!(handles.len(), 2);
        assert_eq!(handles[1].kind, HandleKind::Endpoint(1));
    }

    #[test]
    fn test_rectangle_handles() {
        let handles = stroke_handles(&rect_stroke(), 25.0);
        assert_eq!(handles.len(), 9);
        let rotate = handles.iter().find(|h| h.kind == HandleKind::Rotate).unwrap();
        assert_eq!(rotate.position, Point::new(50.0, -25.0));
    }

    #[test]
    fn test_handle_hit_test() {
        let handles = stroke_handles(&rect_stroke(), 25.0);
        assert_eq!(
            hit_test_handles(&handles, Point::new(101.0, 49.0), 4.0),
            Some(HandleKind::Corner(Corner::BottomRight))
        );
        assert_eq!(hit_test_handles(&handles, Point::new(30.0, 30.0), 4.0), None);
    }

    #[test]
    fn test_selection_prunes_and_bounds() {
        let mut store = StrokeStore::new();
        let a = rect_stroke();
        let b = Stroke::path_from_flat(
            vec![200.0, 200.0, 1.0],
            StrokeStyle {
                width: 0.0,
                ..StrokeStyle::default()
            },
        );
        let (a_id, b_id) = (a.id(), b.id());
        store.add(a);
        store.add(b);

        let mut selection = Selection::new();
        selection.select_all([a_id, b_id, a_id]);
        assert_eq!(selection.len(), 2);
        assert_eq!(selection.bounds(&store), Some(Rect::new(0.0, 0.0, 200.0, 200.0)));
        assert_eq!(selection_handles(&selection, &store, 25.0).len(), 8);

        store.remove(b_id);
        selection.prune(&store);
        assert_eq!(selection.ids(), &[a_id]);
        selection.toggle(a_id);
        assert!(selection.is_empty());
    }

    #[test]
    fn test_corner_resize_keeps_anchor() {
        let bounds = Rect::new(0.0, 0.0, 100.0, 50.0);
        let t = resize_transform(bounds, HandleKind::Corner(Corner::BottomRight), Vec2::new(100.0, 0.0), false);
        assert_eq!(t * Point::new(0.0, 0.0), Point::new(0.0, 0.0));
        assert_eq!(t * Point::new(100.0, 50.0), Point::new(200.0, 50.0));
    }

    #[test]
    fn test_aspect_ratio_resize() {
        let bounds = Rect::new(0.0, 0.0, 100.0, 50.0);
        let t = resize_transform(bounds, HandleKind::Corner(Corner::TopLeft), Vec2::new(-100.0, 0.0), true);
        let p = t * Point::new(0.0, 0.0);
        assert_eq!(p, Point::new(-100.0, -50.0));
    }

    #[test]
    fn test_rotation_snaps() {
        let center = Point::new(0.0, 0.0);
        let (_, angle) = rotation_transform(center, Point::new(1.0, 0.0), Point::new(1.0, 0.3), true);
        assert!((angle - std::f64::consts::PI / 12.0).abs() < 1e-12);
    }
}
