//! Vello-based renderer implementation.
//!
//! Geometry is mapped to screen space in f64 before it reaches Vello, whose
//! GPU path works in f32. World coordinates can be far from the origin; by the
//! time a point is handed over it is a pixel position.

use crate::renderer::{FrameStats, RenderContext, Renderer};
use crate::visible::{self, VisiblePlan};
use boundless_core::camera::Camera;
use boundless_core::canvas::{Canvas, GridStyle};
use boundless_core::selection::{Handle, HandleKind, HANDLE_SIZE};
use boundless_core::stroke::{
    BrushKind, LodParams, PathGeometry, ShapeGeometry, ShapeKind, Stroke, StrokeKind, StrokeMode, POINT_STRIDE,
};
use kurbo::{Affine, BezPath, Cap, Circle, Ellipse, Join, Line, Point, Rect, Shape as KurboShape, Size, Stroke as KurboStroke};
use peniko::{BlendMode, Color, Compose, Fill, Mix};
use vello::Scene;

/// World spacing of the finest grid at zoom 1.
const BASE_GRID: f64 = 20.0;
/// Grid lines never come closer than this on screen.
const MIN_GRID_PX: f64 = 16.0;
/// Ratio between successive grid levels.
const GRID_STEP: f64 = 5.0;
/// Upper bound on grid marks (dots or crosses) per frame.
const MAX_GRID_MARKS: usize = 20_000;

/// Flattening tolerance in pixels.
const TOLERANCE: f64 = 0.1;

/// Last full paint, replayed under a camera delta while navigating.
struct Snapshot {
    scene: Scene,
    camera: Camera,
    revision: u64,
    viewport: Size,
    stats: FrameStats,
}

/// Vello-based renderer.
pub struct VelloRenderer {
    /// The scene being built.
    scene: Scene,
    /// Selection highlight color.
    selection_color: Color,
    snapshot: Option<Snapshot>,
}

impl Default for VelloRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl VelloRenderer {
    /// Create a new Vello renderer.
    pub fn new() -> Self {
        Self {
            scene: Scene::new(),
            selection_color: Color::from_rgba8(59, 130, 246, 255),
            snapshot: None,
        }
    }

    /// Get the built scene for rendering.
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Take ownership of the scene (for rendering).
    pub fn take_scene(&mut self) -> Scene {
        std::mem::take(&mut self.scene)
    }

    /// Whether a snapshot is available for the fast navigation path.
    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Replay the cached paint if it still describes the canvas.
    fn replay_snapshot(&mut self, ctx: &RenderContext, root: Affine) -> Option<FrameStats> {
        if !ctx.navigating {
            return None;
        }
        let canvas = ctx.canvas;
        let snapshot = self.snapshot.as_ref()?;
        let fresh = snapshot.revision == canvas.revision()
            && snapshot.viewport == ctx.logical_size()
            && !canvas.is_baking()
            && !canvas.is_rebuild_pending()
            && canvas.gesture().is_none();
        if !fresh {
            log::debug!("navigation snapshot is stale; repainting geometry");
            self.snapshot = None;
            return None;
        }
        let delta = canvas.camera.transform() * snapshot.camera.inverse_transform();
        self.scene.append(&snapshot.scene, Some(root * delta));
        Some(FrameStats {
            used_snapshot: true,
            ..snapshot.stats
        })
    }

    /// Paint the visible strokes and keep the result as the next snapshot.
    fn paint_strokes(&mut self, ctx: &RenderContext, root: Affine, viewport: Size) -> FrameStats {
        let canvas = ctx.canvas;
        let plan = visible::plan_visible(canvas, viewport);
        let clip = Rect::from_origin_size(Point::ZERO, viewport);

        // Strokes get their own layer so erasers only cut ink, not the background.
        let mut layer = Scene::new();
        layer.push_layer(BlendMode::default(), 1.0, Affine::IDENTITY, &clip);
        {
            let mut painter = StrokePainter {
                scene: &mut layer,
                ctx,
                plan: &plan,
                lod: LodParams::from(canvas.config()),
                exact: ctx.exact || canvas.gesture().is_some(),
                clip,
            };
            for id in &plan.ids {
                if let Some(stroke) = canvas.stroke(*id) {
                    painter.paint(stroke);
                }
            }
        }
        layer.pop_layer();
        self.scene.append(&layer, Some(root));

        let stats = FrameStats {
            visible_count: plan.ids.len(),
            tile_count: plan.tile_count,
            full_scan: plan.full_scan,
            used_snapshot: false,
            fallback_repaint: plan.fallback,
        };
        self.snapshot = Some(Snapshot {
            scene: layer,
            camera: canvas.camera,
            revision: canvas.revision(),
            viewport,
            stats,
        });
        stats
    }
}

/// Paints strokes into the stroke layer.
struct StrokePainter<'a, 'c> {
    scene: &'a mut Scene,
    ctx: &'a RenderContext<'c>,
    plan: &'a VisiblePlan,
    lod: LodParams,
    exact: bool,
    clip: Rect,
}

/// Per-brush stroking parameters.
#[derive(Clone, Copy)]
struct BrushPaint {
    cap: Cap,
    join: Join,
    width: f64,
    alpha: f64,
    pressure: bool,
}

impl BrushPaint {
    fn of(brush: BrushKind) -> Self {
        match brush {
            BrushKind::Pen => Self {
                cap: Cap::Round,
                join: Join::Round,
                width: 1.0,
                alpha: 1.0,
                pressure: true,
            },
            BrushKind::Marker => Self {
                cap: Cap::Square,
                join: Join::Miter,
                width: 1.0,
                alpha: 1.0,
                pressure: false,
            },
            BrushKind::Highlighter => Self {
                cap: Cap::Butt,
                join: Join::Round,
                width: 1.0,
                alpha: 1.0,
                pressure: false,
            },
            BrushKind::Pencil => Self {
                cap: Cap::Round,
                join: Join::Round,
                width: 0.75,
                alpha: 0.85,
                pressure: true,
            },
        }
    }
}

fn pressure_factor(mean: f64) -> f64 {
    if mean.is_finite() && mean > 0.0 {
        mean.clamp(0.2, 1.5)
    } else {
        1.0
    }
}

/// Uniform scale of an affine (geometric mean of its axes).
fn unit_scale(affine: Affine) -> f64 {
    affine.determinant().abs().sqrt()
}

impl StrokePainter<'_, '_> {
    fn paint(&mut self, stroke: &Stroke) {
        let canvas = self.ctx.canvas;
        let effect = self.ctx.evaluator.evaluate(stroke, self.ctx.time);
        let to_screen = canvas.display_transform(stroke) * effect.transform;
        let scale = unit_scale(to_screen);
        if !(scale.is_finite() && scale > 0.0) {
            return;
        }

        let style = &stroke.style;
        let brush = BrushPaint::of(style.brush);
        let alpha = (style.alpha * effect.alpha * brush.alpha).clamp(0.0, 1.0);
        if alpha <= 0.0 {
            return;
        }
        let base: Color = effect.color.unwrap_or(style.color).into();
        let fill: Option<Color> = style.fill.map(Into::into);

        let blend = match (style.mode, style.brush) {
            (StrokeMode::Erase, _) => Some(BlendMode::new(Mix::Normal, Compose::DestOut)),
            (StrokeMode::Draw, BrushKind::Highlighter) => Some(BlendMode::new(Mix::Multiply, Compose::SrcOver)),
            _ => None,
        };
        // Layered strokes carry their opacity on the layer.
        let (color, fill) = match blend {
            Some(mode) => {
                self.scene.push_layer(mode, alpha as f32, Affine::IDENTITY, &self.clip);
                (base, fill)
            }
            None => (
                base.multiply_alpha(alpha as f32),
                fill.map(|c| c.multiply_alpha(alpha as f32)),
            ),
        };

        match &stroke.kind {
            StrokeKind::Path(path) => self.paint_path(stroke, path, to_screen, scale, brush, color),
            StrokeKind::Shape(shape) => self.paint_shape(shape, style.width * scale, to_screen, color, fill),
        }

        if blend.is_some() {
            self.scene.pop_layer();
        }
    }

    fn paint_path(
        &mut self,
        stroke: &Stroke,
        path: &PathGeometry,
        to_screen: Affine,
        scale: f64,
        brush: BrushPaint,
        color: Color,
    ) {
        let width = stroke.style.width * brush.width * scale;
        if let Some(points) = stroke.lod_points(scale, &self.lod, self.exact) {
            self.paint_polyline(&points, to_screen, width, brush, color);
            return;
        }

        let flat = path.flat();
        if self.plan.fallback {
            self.paint_polyline(flat, to_screen, width, brush, color);
            return;
        }
        // Visible ranges are computed in the stroke's own coordinates.
        let own_view = (self.ctx.canvas.camera.inverse_transform() * to_screen)
            .inverse()
            .transform_rect_bbox(self.plan.view);
        let ranges = path.visible_ranges(own_view, stroke.style.width, self.ctx.canvas.chunk_params());
        for range in ranges {
            let slice = &flat[range.start * POINT_STRIDE..range.end * POINT_STRIDE];
            self.paint_polyline(slice, to_screen, width, brush, color);
        }
    }

    fn paint_polyline(&mut self, flat: &[f64], to_screen: Affine, width: f64, brush: BrushPaint, color: Color) {
        let mut samples = flat.chunks_exact(POINT_STRIDE);
        let Some(first) = samples.next() else {
            return;
        };
        let start = to_screen * Point::new(first[0], first[1]);
        let mut path = BezPath::new();
        path.move_to(start);
        let mut pressure = first[2];
        let mut count = 1usize;
        for s in samples {
            path.line_to(to_screen * Point::new(s[0], s[1]));
            pressure += s[2];
            count += 1;
        }

        let width = if brush.pressure {
            width * pressure_factor(pressure / count as f64)
        } else {
            width
        };
        if count == 1 {
            let dot = Circle::new(start, (width / 2.0).max(0.5));
            self.scene.fill(Fill::NonZero, Affine::IDENTITY, color, None, &dot);
            return;
        }
        let stroke = KurboStroke::new(width).with_caps(brush.cap).with_join(brush.join);
        self.scene.stroke(&stroke, Affine::IDENTITY, color, None, &path);
    }

    fn paint_shape(&mut self, shape: &ShapeGeometry, width: f64, to_screen: Affine, color: Color, fill: Option<Color>) {
        let to_screen = to_screen * shape.local_to_world();
        let outline = KurboStroke::new(width).with_caps(Cap::Round).with_join(Join::Round);
        let frame = shape.frame();
        match shape.kind {
            ShapeKind::Line => {
                let line = Line::new(to_screen * shape.start, to_screen * shape.end);
                self.scene.stroke(&outline, Affine::IDENTITY, color, None, &line);
            }
            ShapeKind::Rect | ShapeKind::Ellipse => {
                let path = if shape.kind == ShapeKind::Rect {
                    to_screen * frame.to_path(TOLERANCE)
                } else {
                    (to_screen * Ellipse::from_rect(frame)).to_path(TOLERANCE)
                };
                if let Some(fill) = fill {
                    self.scene.fill(Fill::NonZero, Affine::IDENTITY, fill, None, &path);
                }
                self.scene.stroke(&outline, Affine::IDENTITY, color, None, &path);
            }
            // Text and image layout happen outside the viewport core; draw their frames.
            ShapeKind::Text | ShapeKind::Image => {
                let path = to_screen * frame.to_path(TOLERANCE);
                if shape.kind == ShapeKind::Image {
                    let placeholder = Color::from_rgba8(200, 200, 200, 128);
                    self.scene.fill(Fill::NonZero, Affine::IDENTITY, fill.unwrap_or(placeholder), None, &path);
                }
                let dashed = KurboStroke::new(1.0).with_dashes(0.0, [4.0, 4.0]);
                self.scene.stroke(&dashed, Affine::IDENTITY, color, None, &path);
            }
        }
    }
}

/// World grid spacing for a camera scale, stepped so lines stay legible.
fn grid_spacing(scale: f64) -> Option<f64> {
    if !(scale.is_finite() && scale > 0.0) {
        return None;
    }
    let mut spacing = BASE_GRID;
    while spacing * scale < MIN_GRID_PX {
        spacing *= GRID_STEP;
    }
    while spacing * scale >= MIN_GRID_PX * GRID_STEP {
        spacing /= GRID_STEP;
    }
    (spacing.is_finite() && spacing > 0.0).then_some(spacing)
}

/// Screen positions of grid lines along one axis.
fn grid_axis(offset: f64, step: f64, extent: f64) -> Vec<f64> {
    let first = offset.rem_euclid(step);
    if !(first <= extent) {
        return Vec::new();
    }
    let count = ((extent - first) / step).floor() as usize + 1;
    (0..count).map(|i| first + i as f64 * step).collect()
}

impl VelloRenderer {
    fn render_background(&mut self, canvas: &Canvas, bounds: Rect, root: Affine) {
        let style = canvas.background().grid;
        if style == GridStyle::None {
            return;
        }
        let camera = &canvas.camera;
        let Some(spacing) = grid_spacing(camera.scale) else {
            return;
        };
        let mut step = spacing * camera.scale;
        let mut xs = grid_axis(camera.tx, step, bounds.width());
        let mut ys = grid_axis(camera.ty, step, bounds.height());
        if style != GridStyle::Lines {
            while xs.len() * ys.len() > MAX_GRID_MARKS {
                step *= GRID_STEP;
                xs = grid_axis(camera.tx, step, bounds.width());
                ys = grid_axis(camera.ty, step, bounds.height());
            }
        }
        match style {
            GridStyle::None => {}
            GridStyle::Lines => self.render_grid_lines(bounds, root, &xs, &ys),
            GridStyle::CrossPlus => self.render_grid_crosses(root, &xs, &ys),
            GridStyle::Dots => self.render_grid_dots(root, &xs, &ys),
        }
    }

    /// Render full grid lines.
    fn render_grid_lines(&mut self, bounds: Rect, root: Affine, xs: &[f64], ys: &[f64]) {
        let grid_color = Color::from_rgba8(200, 200, 200, 100);
        let stroke = KurboStroke::new(0.5);
        let mut path = BezPath::new();
        for &x in xs {
            path.move_to(Point::new(x, bounds.y0));
            path.line_to(Point::new(x, bounds.y1));
        }
        for &y in ys {
            path.move_to(Point::new(bounds.x0, y));
            path.line_to(Point::new(bounds.x1, y));
        }
        self.scene.stroke(&stroke, root, grid_color, None, &path);
    }

    /// Render grid as small crosses (+) at intersections.
    fn render_grid_crosses(&mut self, root: Affine, xs: &[f64], ys: &[f64]) {
        let grid_color = Color::from_rgba8(180, 180, 180, 60);
        let stroke = KurboStroke::new(1.0);
        let arm = 3.0;
        let mut path = BezPath::new();
        for &x in xs {
            for &y in ys {
                path.move_to(Point::new(x - arm, y));
                path.line_to(Point::new(x + arm, y));
                path.move_to(Point::new(x, y - arm));
                path.line_to(Point::new(x, y + arm));
            }
        }
        self.scene.stroke(&stroke, root, grid_color, None, &path);
    }

    /// Render grid as dots at intersections.
    fn render_grid_dots(&mut self, root: Affine, xs: &[f64], ys: &[f64]) {
        let grid_color = Color::from_rgba8(160, 160, 160, 70);
        let half = 1.5;
        let mut path = BezPath::new();
        for &x in xs {
            for &y in ys {
                // Squares are cheaper than circles at this size
                let rect = Rect::new(x - half, y - half, x + half, y + half);
                path.move_to(Point::new(rect.x0, rect.y0));
                path.line_to(Point::new(rect.x1, rect.y0));
                path.line_to(Point::new(rect.x1, rect.y1));
                path.line_to(Point::new(rect.x0, rect.y1));
                path.close_path();
            }
        }
        self.scene.fill(Fill::NonZero, root, grid_color, None, &path);
    }
}

impl VelloRenderer {
    /// Selection box, handles and marquee, in screen space.
    fn render_overlays(&mut self, ctx: &RenderContext, root: Affine) {
        let canvas = ctx.canvas;
        let camera = canvas.camera.transform();

        if let Some(bounds) = canvas.selection_bounds() {
            let single_line = canvas.selection.len() == 1
                && canvas
                    .selection
                    .resolve(canvas.store())
                    .all(|s| s.as_shape().is_some_and(|shape| shape.kind == ShapeKind::Line));
            if !single_line {
                let screen = camera.transform_rect_bbox(bounds);
                let stroke = KurboStroke::new(1.0).with_dashes(0.0, [4.0, 4.0]);
                self.scene.stroke(&stroke, root, self.selection_color, None, &screen);
            }
        }

        for handle in canvas.selection_handles() {
            let position = camera * handle.position;
            self.render_handle(&Handle::new(position, handle.kind), root, HANDLE_SIZE);
        }

        if let Some(rect) = ctx.selection_rect {
            self.render_selection_rect(camera.transform_rect_bbox(rect), root);
        }
    }

    /// Render a single handle at a screen position.
    fn render_handle(&mut self, handle: &Handle, root: Affine, size: f64) {
        let pos = handle.position;
        match handle.kind {
            HandleKind::Endpoint(_) | HandleKind::Rotate => {
                let path = Circle::new(pos, size / 2.0).to_path(TOLERANCE);
                self.scene.fill(Fill::NonZero, root, Color::WHITE, None, &path);
                self.scene
                    .stroke(&KurboStroke::new(2.0), root, self.selection_color, None, &path);
            }
            HandleKind::Corner(_) | HandleKind::Edge(_) => {
                let half = size / 2.0;
                let path = Rect::new(pos.x - half, pos.y - half, pos.x + half, pos.y + half).to_path(TOLERANCE);
                self.scene.fill(Fill::NonZero, root, Color::WHITE, None, &path);
                self.scene
                    .stroke(&KurboStroke::new(1.5), root, self.selection_color, None, &path);
            }
        }
    }

    /// Render a selection rectangle (marquee) given in screen space.
    fn render_selection_rect(&mut self, rect: Rect, root: Affine) {
        let fill_color = Color::from_rgba8(59, 130, 246, 25);
        self.scene.fill(Fill::NonZero, root, fill_color, None, &rect);
        let stroke = KurboStroke::new(1.0).with_dashes(0.0, [4.0, 4.0]);
        self.scene.stroke(&stroke, root, self.selection_color, None, &rect);
    }
}

impl Renderer for VelloRenderer {
    fn build_scene(&mut self, ctx: &RenderContext) -> FrameStats {
        self.scene.reset();
        self.selection_color = ctx.selection_color;

        let root = Affine::scale(ctx.device_scale());
        let viewport = ctx.logical_size();
        let bounds = Rect::from_origin_size(Point::ZERO, viewport);

        self.render_background(ctx.canvas, bounds, root);
        let stats = match self.replay_snapshot(ctx, root) {
            Some(stats) => stats,
            None => self.paint_strokes(ctx, root, viewport),
        };
        self.render_overlays(ctx, root);
        stats
    }

    fn invalidate(&mut self) {
        self.snapshot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boundless_core::stroke::StrokeStyle;
    use kurbo::Vec2;

    fn viewport() -> Size {
        Size::new(800.0, 600.0)
    }

    fn dot_canvas(points: &[(f64, f64)]) -> Canvas {
        let mut canvas = Canvas::new();
        for &(x, y) in points {
            canvas.add_stroke(Stroke::path_from_flat(
                vec![x, y, 1.0, x + 10.0, y + 10.0, 1.0],
                StrokeStyle::default(),
            ));
        }
        canvas
    }

    #[test]
    fn test_renderer_creation() {
        let renderer = VelloRenderer::new();
        assert!(renderer.scene().encoding().is_empty());
        assert!(!renderer.has_snapshot());
    }

    #[test]
    fn test_build_empty_scene() {
        let mut renderer = VelloRenderer::new();
        let canvas = Canvas::new();
        let ctx = RenderContext::new(&canvas, viewport());

        let stats = renderer.build_scene(&ctx);
        assert_eq!(stats.visible_count, 0);
        assert!(!stats.fallback_repaint);
        // Grid lines at minimum
        assert!(!renderer.scene().encoding().is_empty());
    }

    #[test]
    fn test_offscreen_strokes_not_painted() {
        let mut renderer = VelloRenderer::new();
        let canvas = dot_canvas(&[(100.0, 100.0), (300.0, 200.0), (90_000.0, 90_000.0)]);
        let stats = renderer.build_scene(&RenderContext::new(&canvas, viewport()));
        assert_eq!(stats.visible_count, 2);
        assert!(!stats.full_scan);
        assert!(stats.tile_count > 0);
    }

    #[test]
    fn test_hidpi_uses_logical_viewport() {
        let mut renderer = VelloRenderer::new();
        let canvas = dot_canvas(&[(100.0, 100.0), (1200.0, 100.0)]);
        let ctx = RenderContext::new(&canvas, Size::new(1600.0, 1200.0)).with_scale_factor(2.0);
        // Logical width is 800, so the second stroke sits outside the padded view.
        assert_eq!(renderer.build_scene(&ctx).visible_count, 1);
    }

    #[test]
    fn test_snapshot_replayed_while_navigating() {
        let mut renderer = VelloRenderer::new();
        let mut canvas = dot_canvas(&[(100.0, 100.0), (200.0, 200.0)]);
        let first = renderer.build_scene(&RenderContext::new(&canvas, viewport()));
        assert!(!first.used_snapshot);
        assert!(renderer.has_snapshot());

        canvas.camera.pan(Vec2::new(30.0, -12.0));
        let ctx = RenderContext::new(&canvas, viewport()).with_navigating(true);
        let replay = renderer.build_scene(&ctx);
        assert!(replay.used_snapshot);
        assert_eq!(replay.visible_count, first.visible_count);
    }

    #[test]
    fn test_snapshot_dropped_after_edit() {
        let mut renderer = VelloRenderer::new();
        let mut canvas = dot_canvas(&[(100.0, 100.0)]);
        renderer.build_scene(&RenderContext::new(&canvas, viewport()));

        canvas.add_stroke(Stroke::path_from_flat(vec![50.0, 50.0, 1.0, 60.0, 60.0, 1.0], StrokeStyle::default()));
        let stats = renderer.build_scene(&RenderContext::new(&canvas, viewport()).with_navigating(true));
        assert!(!stats.used_snapshot);
        assert_eq!(stats.visible_count, 2);
    }

    #[test]
    fn test_snapshot_skipped_during_bake() {
        let mut renderer = VelloRenderer::new();
        let mut canvas = dot_canvas(&[(100.0, 100.0), (150.0, 150.0)]);
        renderer.build_scene(&RenderContext::new(&canvas, viewport()));

        canvas.camera.scale = 1000.0;
        canvas.camera.tx = -100_000.0;
        canvas.camera.ty = -100_000.0;
        assert!(canvas.renormalize_if_needed());
        let stats = renderer.build_scene(&RenderContext::new(&canvas, viewport()).with_navigating(true));
        assert!(!stats.used_snapshot);
        assert!(stats.full_scan);
        assert_eq!(stats.visible_count, 1);
    }

    #[test]
    fn test_invalidate_drops_snapshot() {
        let mut renderer = VelloRenderer::new();
        let canvas = dot_canvas(&[(100.0, 100.0)]);
        renderer.build_scene(&RenderContext::new(&canvas, viewport()));
        renderer.invalidate();
        assert!(!renderer.has_snapshot());
        let stats = renderer.build_scene(&RenderContext::new(&canvas, viewport()).with_navigating(true));
        assert!(!stats.used_snapshot);
    }

    #[test]
    fn test_eraser_and_highlighter_strokes_build() {
        let mut renderer = VelloRenderer::new();
        let mut canvas = dot_canvas(&[(100.0, 100.0)]);
        let eraser = StrokeStyle {
            mode: StrokeMode::Erase,
            width: 12.0,
            ..StrokeStyle::default()
        };
        let highlighter = StrokeStyle {
            brush: BrushKind::Highlighter,
            alpha: 0.5,
            ..StrokeStyle::default()
        };
        canvas.add_stroke(Stroke::path_from_flat(vec![90.0, 90.0, 1.0, 120.0, 120.0, 1.0], eraser));
        canvas.add_stroke(Stroke::path_from_flat(vec![0.0, 50.0, 1.0, 300.0, 50.0, 1.0], highlighter));
        let stats = renderer.build_scene(&RenderContext::new(&canvas, viewport()));
        assert_eq!(stats.visible_count, 3);
    }

    #[test]
    fn test_shapes_and_overlays_build() {
        let mut renderer = VelloRenderer::new();
        let mut canvas = Canvas::new();
        let style = StrokeStyle::default();
        let rect = canvas.add_shape(ShapeKind::Rect, Point::new(10.0, 10.0), Point::new(100.0, 80.0), style);
        canvas.add_shape(ShapeKind::Ellipse, Point::new(200.0, 10.0), Point::new(260.0, 90.0), style);
        canvas.add_shape(ShapeKind::Line, Point::new(0.0, 300.0), Point::new(400.0, 320.0), style);
        canvas.add_shape(ShapeKind::Text, Point::new(300.0, 300.0), Point::new(380.0, 330.0), style);
        canvas.selection.select(rect);

        let ctx = RenderContext::new(&canvas, viewport()).with_selection_rect(Some(Rect::new(0.0, 0.0, 50.0, 50.0)));
        let stats = renderer.build_scene(&ctx);
        assert_eq!(stats.visible_count, 4);
        assert!(!canvas.selection_handles().is_empty());
    }

    #[test]
    fn test_long_path_zoomed_out() {
        let mut renderer = VelloRenderer::new();
        let mut canvas = Canvas::new();
        let flat: Vec<f64> = (0..2000)
            .flat_map(|i| {
                let t = i as f64 * 0.01;
                [t * 100.0, (t * 3.0).sin() * 50.0 + 200.0, 1.0]
            })
            .collect();
        canvas.add_stroke(Stroke::path_from_flat(flat, StrokeStyle::default()));
        canvas.camera.scale = 0.5;

        let stats = renderer.build_scene(&RenderContext::new(&canvas, viewport()));
        assert_eq!(stats.visible_count, 1);
        let exact = renderer.build_scene(&RenderContext::new(&canvas, viewport()).with_exact(true));
        assert_eq!(exact.visible_count, 1);
    }

    #[test]
    fn test_grid_spacing_stays_legible() {
        for scale in [1e-6, 0.01, 0.3, 1.0, 7.5, 800.0, 1e6] {
            let spacing = grid_spacing(scale).unwrap();
            let px = spacing * scale;
            assert!(px >= MIN_GRID_PX && px < MIN_GRID_PX * GRID_STEP, "scale {scale}: {px}px");
        }
        assert!(grid_spacing(0.0).is_none());
        assert!(grid_spacing(f64::NAN).is_none());
    }

    #[test]
    fn test_grid_axis_wraps_offset() {
        let xs = grid_axis(-35.0, 20.0, 100.0);
        assert_eq!(xs.first().copied(), Some(5.0));
        assert!(xs.iter().all(|x| *x <= 100.0));
        assert_eq!(xs.len(), 5);
    }
}
