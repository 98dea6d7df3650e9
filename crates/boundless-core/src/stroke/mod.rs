//! Drawable entities: freehand paths and vector shapes.

mod hit;
mod lod;
mod path;
mod shape;

pub use hit::HitParams;
pub use lod::{lod_key, simplify_flat, LodParams};
pub use path::{Chunk, ChunkParams, PathGeometry, POINT_STRIDE};
pub use shape::{ShapeGeometry, ShapeKind, ShapePayload};

use crate::layers::AnimationLayer;
use kurbo::{Affine, Point, Rect};
use peniko::Color;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for strokes.
pub type StrokeId = Uuid;

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub fn white() -> Self {
        Self::new(255, 255, 255, 255)
    }
}

impl From<Color> for SerializableColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<SerializableColor> for Color {
    fn from(color: SerializableColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// Brush used to paint a stroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrushKind {
    /// Round caps and joins, pressure-modulated width.
    #[default]
    Pen,
    /// Square caps, constant width.
    Marker,
    /// Multiplied onto what is underneath.
    Highlighter,
    /// Thin, slightly translucent.
    Pencil,
}

/// Whether a stroke adds ink or removes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrokeMode {
    #[default]
    Draw,
    Erase,
}

/// Style properties shared by every stroke.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokeStyle {
    /// Stroke color.
    pub color: SerializableColor,
    /// Opacity multiplier in `[0, 1]`.
    pub alpha: f64,
    /// World-space stroke width.
    pub width: f64,
    /// Brush kind.
    #[serde(default)]
    pub brush: BrushKind,
    /// Draw or erase.
    #[serde(default)]
    pub mode: StrokeMode,
    /// Fill color (None = no fill).
    #[serde(default)]
    pub fill: Option<SerializableColor>,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            color: SerializableColor::black(),
            alpha: 1.0,
            width: 2.0,
            brush: BrushKind::default(),
            mode: StrokeMode::default(),
            fill: None,
        }
    }
}

impl StrokeStyle {
    /// Get the stroke color with alpha applied.
    pub fn stroke_with_alpha(&self) -> Color {
        let color: Color = self.color.into();
        color.multiply_alpha(self.alpha.clamp(0.0, 1.0) as f32)
    }

    /// Get the fill color with alpha applied.
    pub fn fill_with_alpha(&self) -> Option<Color> {
        self.fill.map(|c| {
            let color: Color = c.into();
            color.multiply_alpha(self.alpha.clamp(0.0, 1.0) as f32)
        })
    }
}

/// Partial style update; `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StylePatch {
    pub color: Option<SerializableColor>,
    pub alpha: Option<f64>,
    pub width: Option<f64>,
    pub brush: Option<BrushKind>,
    pub fill: Option<Option<SerializableColor>>,
}

impl StylePatch {
    /// Apply the patch to a style.
    pub fn apply(&self, style: &mut StrokeStyle) {
        if let Some(color) = self.color {
            style.color = color;
        }
        if let Some(alpha) = self.alpha {
            style.alpha = alpha.clamp(0.0, 1.0);
        }
        if let Some(width) = self.width.filter(|w| w.is_finite() && *w >= 0.0) {
            style.width = width;
        }
        if let Some(brush) = self.brush {
            style.brush = brush;
        }
        if let Some(fill) = self.fill {
            style.fill = fill;
        }
    }
}

/// Geometry variant of a stroke.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrokeKind {
    Path(PathGeometry),
    Shape(ShapeGeometry),
}

/// A drawable entity owned by the stroke store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stroke {
    pub(crate) id: StrokeId,
    /// Style properties.
    pub style: StrokeStyle,
    /// Creation order, used for recency tie-breaks.
    pub timestamp: u64,
    /// Geometry.
    pub kind: StrokeKind,
    /// Per-stroke animation/style layers.
    #[serde(default)]
    pub layers: Vec<AnimationLayer>,
    /// Axis-aligned bounds, padded by half the stroke width.
    #[serde(skip)]
    pub(crate) bbox: Rect,
    /// Geometry still lives in the coordinate space of an in-flight bake.
    #[serde(skip)]
    pub(crate) bake_pending: bool,
}

impl Stroke {
    /// Create an empty path stroke.
    pub fn path(style: StrokeStyle) -> Self {
        Self::from_kind(StrokeKind::Path(PathGeometry::new()), style)
    }

    /// Create a path stroke from a flat `(x, y, pressure)` buffer.
    pub fn path_from_flat(points: Vec<f64>, style: StrokeStyle) -> Self {
        Self::from_kind(StrokeKind::Path(PathGeometry::from_flat(points)), style)
    }

    /// Create a shape stroke spanning two corner points.
    pub fn shape(kind: ShapeKind, start: Point, end: Point, style: StrokeStyle) -> Self {
        Self::from_kind(StrokeKind::Shape(ShapeGeometry::new(kind, start, end)), style)
    }

    /// Create a stroke around existing geometry.
    pub fn from_kind(kind: StrokeKind, style: StrokeStyle) -> Self {
        let mut stroke = Self {
            id: Uuid::new_v4(),
            style,
            timestamp: 0,
            kind,
            layers: Vec::new(),
            bbox: Rect::ZERO,
            bake_pending: false,
        };
        stroke.recompute_bbox();
        stroke
    }

    /// Get the unique identifier.
    pub fn id(&self) -> StrokeId {
        self.id
    }

    /// Padded bounding box in document coordinates.
    pub fn bbox(&self) -> Rect {
        self.bbox
    }

    /// Whether this stroke still awaits a pending bake.
    pub fn is_bake_pending(&self) -> bool {
        self.bake_pending
    }

    /// Get the path geometry, if this is a path.
    pub fn as_path(&self) -> Option<&PathGeometry> {
        match &self.kind {
            StrokeKind::Path(p) => Some(p),
            StrokeKind::Shape(_) => None,
        }
    }

    /// Get mutable path geometry, if this is a path.
    pub fn as_path_mut(&mut self) -> Option<&mut PathGeometry> {
        match &mut self.kind {
            StrokeKind::Path(p) => Some(p),
            StrokeKind::Shape(_) => None,
        }
    }

    /// Get the shape geometry, if this is a shape.
    pub fn as_shape(&self) -> Option<&ShapeGeometry> {
        match &self.kind {
            StrokeKind::Shape(s) => Some(s),
            StrokeKind::Path(_) => None,
        }
    }

    /// Append a sample to a path, growing the bbox and chunk index incrementally.
    /// Returns false for shapes or non-finite samples.
    pub fn push_point(&mut self, x: f64, y: f64, pressure: f64, chunks: ChunkParams) -> bool {
        let half = self.style.width / 2.0;
        let StrokeKind::Path(path) = &mut self.kind else {
            return false;
        };
        if !(x.is_finite() && y.is_finite()) {
            return false;
        }
        let first = path.is_empty();
        path.push(x, y, pressure, chunks);
        let dot = Rect::new(x - half, y - half, x + half, y + half);
        self.bbox = if first { dot } else { self.bbox.union(dot) };
        true
    }

    /// Recompute the bbox from geometry.
    pub fn recompute_bbox(&mut self) {
        let half = self.style.width.max(0.0) / 2.0;
        let raw = match &self.kind {
            StrokeKind::Path(p) => p.bounds(),
            StrokeKind::Shape(s) => s.bounds(),
        };
        self.bbox = raw.inflate(half, half);
    }

    /// Drop derived caches (chunks, LOD); they are rebuilt lazily.
    pub fn invalidate_caches(&mut self) {
        if let StrokeKind::Path(p) = &mut self.kind {
            p.invalidate_caches();
        }
    }

    /// Apply an affine transform to geometry, width and layer pivots.
    pub fn transform(&mut self, affine: Affine) {
        let [a, b, c, d, _, _] = affine.as_coeffs();
        let width_scale = (a * d - b * c).abs().sqrt();
        match &mut self.kind {
            StrokeKind::Path(p) => p.transform(affine),
            StrokeKind::Shape(s) => s.transform(affine),
        }
        if width_scale.is_finite() {
            self.style.width *= width_scale;
        }
        for layer in &mut self.layers {
            layer.transform_pivot(affine);
        }
        self.recompute_bbox();
    }

    /// Number of points (paths) or 2 (shapes).
    pub fn point_count(&self) -> usize {
        match &self.kind {
            StrokeKind::Path(p) => p.len(),
            StrokeKind::Shape(_) => 2,
        }
    }
}

/// Distance from a point to a line segment (a→b).
pub fn point_to_segment_dist(point: Point, a: Point, b: Point) -> f64 {
    let seg = kurbo::Vec2::new(b.x - a.x, b.y - a.y);
    let pv = kurbo::Vec2::new(point.x - a.x, point.y - a.y);
    let len_sq = seg.hypot2();
    if len_sq < f64::EPSILON {
        return pv.hypot();
    }
    let t = (pv.dot(seg) / len_sq).clamp(0.0, 1.0);
    let proj = Point::new(a.x + t * seg.x, a.y + t * seg.y);
    ((point.x - proj.x).powi(2) + (point.y - proj.y).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_bbox_grows_with_points() {
        let mut stroke = Stroke::path(StrokeStyle {
            width: 4.0,
            ..StrokeStyle::default()
        });
        let chunks = ChunkParams::default();
        assert!(stroke.push_point(0.0, 0.0, 1.0, chunks));
        assert!(stroke.push_point(10.0, 5.0, 1.0, chunks));
        let bbox = stroke.bbox();
        assert!((bbox.x0 + 2.0).abs() < f64::EPSILON);
        assert!((bbox.y1 - 7.0).abs() < f64::EPSILON);
        assert!(!stroke.push_point(f64::NAN, 0.0, 1.0, chunks));
    }

    #[test]
    fn test_shape_rejects_points() {
        let mut stroke = Stroke::shape(
            ShapeKind::Rect,
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            StrokeStyle::default(),
        );
        assert!(!stroke.push_point(1.0, 1.0, 1.0, ChunkParams::default()));
        assert_eq!(stroke.point_count(), 2);
    }

    #[test]
    fn test_transform_scales_width_and_bbox() {
        let mut stroke = Stroke::path_from_flat(
            vec![0.0, 0.0, 1.0, 10.0, 0.0, 1.0],
            StrokeStyle {
                width: 2.0,
                ..StrokeStyle::default()
            },
        );
        stroke.transform(Affine::new([3.0, 0.0, 0.0, 3.0, 100.0, 0.0]));
        assert!((stroke.style.width - 6.0).abs() < 1e-12);
        let bbox = stroke.bbox();
        assert!((bbox.x0 - 97.0).abs() < 1e-12);
        assert!((bbox.x1 - 133.0).abs() < 1e-12);
    }

    #[test]
    fn test_style_patch() {
        let mut style = StrokeStyle::default();
        StylePatch {
            alpha: Some(4.0),
            width: Some(f64::NAN),
            fill: Some(Some(SerializableColor::white())),
            ..StylePatch::default()
        }
        .apply(&mut style);
        assert!((style.alpha - 1.0).abs() < f64::EPSILON);
        assert!((style.width - 2.0).abs() < f64::EPSILON);
        assert_eq!(style.fill, Some(SerializableColor::white()));
    }

    #[test]
    fn test_point_to_segment_dist() {
        let d = point_to_segment_dist(Point::new(5.0, 3.0), Point::new(0.0, 0.0), Point::new(10.0, 0.0));
        assert!((d - 3.0).abs() < 1e-12);
        let d = point_to_segment_dist(Point::new(-4.0, 3.0), Point::new(0.0, 0.0), Point::new(10.0, 0.0));
        assert!((d - 5.0).abs() < 1e-12);
    }
}
