//! Visible-set planning: which strokes a frame paints, and through which path.

use boundless_core::canvas::{Canvas, GestureKind};
use boundless_core::index::TileSpan;
use boundless_core::layers::AnimationLayer;
use boundless_core::stroke::{Stroke, StrokeId};
use kurbo::{Affine, Point, Rect, Size};

/// Strokes to paint this frame, in z-order.
#[derive(Debug, Clone, Default)]
pub struct VisiblePlan {
    /// Padded visible world rect.
    pub view: Rect,
    pub ids: Vec<StrokeId>,
    /// Index tiles covered by the query (0 for a full scan).
    pub tile_count: usize,
    pub full_scan: bool,
    /// The indexed pass found nothing although content overlaps the view.
    pub fallback: bool,
}

/// Whether the frame must bypass the index entirely.
///
/// Bulk structural changes leave bboxes or tiles stale until they settle.
pub fn must_full_scan(canvas: &Canvas) -> bool {
    canvas.is_index_stale()
        || canvas.is_index_deferred()
        || canvas.gesture() == Some(GestureKind::Transform)
}

/// Padded world rect visible through a `viewport` (logical pixels).
pub fn padded_view(canvas: &Canvas, viewport: Size) -> Rect {
    let view = canvas.camera.visible_world_rect(viewport);
    let pad = canvas.config().view_padding;
    view.inflate(view.width() * pad, view.height() * pad)
}

fn overlaps(a: Rect, b: Rect) -> bool {
    a.x0 <= b.x1 && b.x0 <= a.x1 && a.y0 <= b.y1 && b.y0 <= a.y1
}

/// World rect a stroke can cover once its layers have moved it.
///
/// A spin sweeps the disc about its pivot out to the farthest corner.
fn layer_reach(canvas: &Canvas, stroke: &Stroke) -> Rect {
    let mut reach = canvas.display_bbox(stroke);
    let to_world = match canvas.bake_transform() {
        Some(bake) if stroke.is_bake_pending() => bake.affine(),
        _ => Affine::IDENTITY,
    };
    for layer in &stroke.layers {
        let AnimationLayer::Spin { pivot, .. } = layer else {
            continue;
        };
        let center = pivot.map_or_else(|| reach.center(), |p| to_world * p);
        let radius = [
            Point::new(reach.x0, reach.y0),
            Point::new(reach.x1, reach.y0),
            Point::new(reach.x0, reach.y1),
            Point::new(reach.x1, reach.y1),
        ]
        .iter()
        .map(|corner| (*corner - center).hypot())
        .fold(0.0, f64::max);
        reach = reach.union(Rect::from_center_size(center, Size::new(2.0 * radius, 2.0 * radius)));
    }
    reach
}

/// Compute the visible set for a viewport.
pub fn plan_visible(canvas: &Canvas, viewport: Size) -> VisiblePlan {
    let view = padded_view(canvas, viewport);
    let forced = must_full_scan(canvas);
    let candidates = if forced { None } else { Some(canvas.query(view)) };
    let full_scan = candidates.as_ref().is_none_or(|c| c.is_full_scan());
    let tile_count = if full_scan {
        0
    } else {
        let limits = canvas.index().limits();
        TileSpan::of(view, canvas.index().cell(), limits.world_ceiling)
            .map_or(0, |span| span.area().max(0) as usize)
    };

    let ids: Vec<StrokeId> = canvas
        .store()
        .iter()
        .filter(|s| {
            // The index holds static bboxes; animated strokes are checked by reach.
            !s.layers.is_empty() || candidates.as_ref().is_none_or(|c| c.is_full_scan() || c.contains(&s.id()))
        })
        .filter(|s| {
            let bbox = if s.layers.is_empty() {
                canvas.display_bbox(s)
            } else {
                layer_reach(canvas, s)
            };
            overlaps(bbox, view)
        })
        .map(|s| s.id())
        .collect();

    if ids.is_empty() && !canvas.is_empty() && content_in_view(canvas, view) {
        log::warn!("visible set empty over non-empty content; repainting everything");
        return VisiblePlan {
            view,
            ids: canvas.store().iter().map(|s| s.id()).collect(),
            tile_count,
            full_scan: true,
            fallback: true,
        };
    }

    VisiblePlan {
        view,
        ids,
        tile_count,
        full_scan,
        fallback: false,
    }
}

/// Whether the document bounds reach into the view at all.
fn content_in_view(canvas: &Canvas, view: Rect) -> bool {
    canvas.bounds().is_some_and(|b| overlaps(b, view))
}

#[cfg(test)]
mod tests {
    use super::*;
    use boundless_core::stroke::StrokeStyle;

    fn canvas_with_dots(points: &[(f64, f64)]) -> Canvas {
        let mut canvas = Canvas::new();
        canvas.set_viewport_size(800.0, 600.0);
        for &(x, y) in points {
            canvas.add_stroke(Stroke::path_from_flat(
                vec![x, y, 1.0, x + 4.0, y + 4.0, 1.0],
                StrokeStyle::default(),
            ));
        }
        canvas
    }

    #[test]
    fn test_offscreen_strokes_culled() {
        let canvas = canvas_with_dots(&[(100.0, 100.0), (5000.0, 5000.0)]);
        let plan = plan_visible(&canvas, Size::new(800.0, 600.0));
        assert_eq!(plan.ids.len(), 1);
        assert!(!plan.full_scan);
        assert!(plan.tile_count > 0);
        assert!(!plan.fallback);
    }

    #[test]
    fn test_z_order_preserved() {
        let canvas = canvas_with_dots(&[(300.0, 300.0), (100.0, 100.0), (200.0, 200.0)]);
        let plan = plan_visible(&canvas, Size::new(800.0, 600.0));
        let order: Vec<_> = canvas.store().iter().map(|s| s.id()).collect();
        assert_eq!(plan.ids, order);
    }

    #[test]
    fn test_bake_forces_full_scan() {
        let mut canvas = canvas_with_dots(&[(100.0, 100.0), (200.0, 200.0)]);
        canvas.camera.scale = 1000.0;
        canvas.camera.tx = -100_000.0;
        canvas.camera.ty = -100_000.0;
        assert!(canvas.renormalize_if_needed());
        let plan = plan_visible(&canvas, Size::new(800.0, 600.0));
        assert!(plan.full_scan);
        assert_eq!(plan.tile_count, 0);
        assert_eq!(plan.ids.len(), 1);
    }

    #[test]
    fn test_empty_view_does_not_trigger_safety_net() {
        let mut canvas = canvas_with_dots(&[(100.0, 100.0)]);
        canvas.camera.tx = -1e6;
        let plan = plan_visible(&canvas, Size::new(800.0, 600.0));
        assert!(plan.ids.is_empty());
        assert!(!plan.fallback);
    }

    #[test]
    fn test_spinning_stroke_kept_near_view() {
        let mut canvas = canvas_with_dots(&[(100.0, 100.0)]);
        let line = || Stroke::path_from_flat(vec![1000.0, 300.0, 1.0, 1400.0, 300.0, 1.0], StrokeStyle::default());
        let still = canvas.add_stroke(line());
        let mut spinning = line();
        spinning.layers.push(AnimationLayer::Spin {
            pivot: Some(Point::new(700.0, 300.0)),
            degrees_per_second: 30.0,
        });
        let spinning = canvas.add_stroke(spinning);

        let plan = plan_visible(&canvas, Size::new(800.0, 600.0));
        assert!(!plan.full_scan);
        assert!(plan.ids.contains(&spinning));
        assert!(!plan.ids.contains(&still));
    }

    #[test]
    fn test_stroke_being_drawn_is_visible() {
        let mut canvas = canvas_with_dots(&[(100.0, 100.0)]);
        let live = canvas.begin_path(StrokeStyle::default());
        canvas.append_point(Point::new(400.0, 300.0), 0.5);
        canvas.append_point(Point::new(420.0, 310.0), 0.5);
        assert!(must_full_scan(&canvas));
        let plan = plan_visible(&canvas, Size::new(800.0, 600.0));
        assert!(plan.full_scan);
        assert_eq!(plan.ids.len(), 2);
        assert!(plan.ids.contains(&live));
    }
}
