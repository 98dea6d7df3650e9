//! Topmost-at-point picking.

use crate::bake::BakeTransform;
use crate::camera::Camera;
use crate::config::ViewportConfig;
use crate::index::GridIndex;
use crate::store::StrokeStore;
use crate::stroke::{ChunkParams, HitParams, Stroke, StrokeId};
use kurbo::{Point, Rect};

/// Picking tunables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickParams {
    /// Pick radius in screen pixels.
    pub radius_px: f64,
    /// Recent strokes probed when the index has no candidates.
    pub fallback_base: usize,
    pub chunks: ChunkParams,
}

impl From<&ViewportConfig> for PickParams {
    fn from(config: &ViewportConfig) -> Self {
        Self {
            radius_px: config.pick_radius_px,
            fallback_base: config.pick_fallback_base,
            chunks: ChunkParams::from(config),
        }
    }
}

/// A picked stroke and its screen-space distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pick {
    pub id: StrokeId,
    pub distance_px: f64,
}

/// How many recent strokes to probe when the index returns nothing.
///
/// Grows with `log2(scale)` when zoomed in, where the user is likely after
/// recent detail.
pub fn fallback_count(base: usize, camera_scale: f64) -> usize {
    let zoom = camera_scale.log2();
    let factor = if zoom.is_finite() { 1.0 + zoom.max(0.0) } else { 1.0 };
    (base as f64 * factor).ceil() as usize
}

/// Screen-pixel distance from `world` to `stroke`, if it is a hit.
///
/// Strokes still awaiting `bake` are tested in their own pre-bake space.
pub fn stroke_distance_px(
    stroke: &Stroke,
    world: Point,
    radius_world: f64,
    camera_scale: f64,
    bake: Option<BakeTransform>,
    chunks: ChunkParams,
) -> Option<f64> {
    match bake {
        Some(bake) if stroke.is_bake_pending() => {
            let local = bake.to_pre_bake(world);
            let params = HitParams {
                radius: radius_world / bake.scale,
                chunks,
            };
            stroke
                .hit_distance(local, params)
                .map(|d| d * camera_scale * bake.scale)
        }
        _ => stroke
            .hit_distance(world, HitParams { radius: radius_world, chunks })
            .map(|d| d * camera_scale),
    }
}

/// Find the stroke under `screen`.
///
/// `full_scan` skips the index (while a bake or rebuild leaves it stale).
/// Among exact hits the smallest pixel distance wins; ties go to the most
/// recent stroke.
pub fn pick_at(
    store: &StrokeStore,
    index: &GridIndex,
    camera: &Camera,
    bake: Option<BakeTransform>,
    full_scan: bool,
    screen: Point,
    params: PickParams,
) -> Option<Pick> {
    if !camera.is_finite() || !(screen.x.is_finite() && screen.y.is_finite()) {
        return None;
    }
    let world = camera.screen_to_world(screen);
    let radius_world = params.radius_px / camera.scale;

    let mut candidates: Vec<&Stroke> = if full_scan {
        store.iter().collect()
    } else {
        let near = Rect::from_points(world, world).inflate(radius_world, radius_world);
        let hits = index.query(near);
        if hits.is_full_scan() {
            store.iter().collect()
        } else {
            hits.iter().filter_map(|id| store.get(*id)).collect()
        }
    };
    if candidates.is_empty() {
        let n = fallback_count(params.fallback_base, camera.scale);
        log::trace!("pick: index empty at {world:?}, probing {n} recent strokes");
        candidates = store
            .most_recent(n)
            .into_iter()
            .filter_map(|id| store.get(id))
            .collect();
    }
    candidates.sort_unstable_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let mut best: Option<Pick> = None;
    for stroke in candidates {
        let Some(d) = stroke_distance_px(stroke, world, radius_world, camera.scale, bake, params.chunks) else {
            continue;
        };
        if best.is_none_or(|b| d < b.distance_px) {
            best = Some(Pick {
                id: stroke.id(),
                distance_px: d,
            });
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::StrokeStyle;

    fn line(store: &mut StrokeStore, index: &mut GridIndex, y: f64) -> StrokeId {
        let stroke = Stroke::path_from_flat(vec![0.0, y, 1.0, 100.0, y, 1.0], StrokeStyle::default());
        let id = stroke.id();
        index.insert(id, stroke.bbox());
        store.add(stroke);
        id
    }

    #[test]
    fn test_fallback_count_grows_with_zoom() {
        assert_eq!(fallback_count(32, 0.5), 32);
        assert_eq!(fallback_count(32, 1.0), 32);
        assert_eq!(fallback_count(32, 8.0), 128);
    }

    #[test]
    fn test_nearest_wins_and_ties_go_to_recent() {
        let mut store = StrokeStore::new();
        let mut index = GridIndex::default();
        let far = line(&mut store, &mut index, 4.0);
        let near = line(&mut store, &mut index, 1.0);
        let camera = Camera::new();
        let params = PickParams::from(&ViewportConfig::default());

        let pick = pick_at(&store, &index, &camera, None, false, Point::new(50.0, 0.0), params).unwrap();
        assert_eq!(pick.id, near);
        assert_ne!(pick.id, far);

        let twin = line(&mut store, &mut index, 1.0);
        let pick = pick_at(&store, &index, &camera, None, true, Point::new(50.0, 0.0), params).unwrap();
        assert_eq!(pick.id, twin);
    }

    #[test]
    fn test_pick_respects_zoom() {
        let mut store = StrokeStore::new();
        let mut index = GridIndex::default();
        let id = line(&mut store, &mut index, 0.0);
        let mut camera = Camera::new();
        camera.zoom_around(Point::new(0.0, 0.0), 1000.0);
        let params = PickParams::from(&ViewportConfig::default());
        let screen = camera.world_to_screen(Point::new(0.5, 0.002));
        let pick = pick_at(&store, &index, &camera, None, false, screen, params).unwrap();
        assert_eq!(pick.id, id);
        // 0.6 * width = 1.2 world units = 1200 px at this zoom
        assert!(pick.distance_px < 1200.0);
    }

    #[test]
    fn test_bake_pending_stroke_hit_in_pre_bake_space() {
        let mut store = StrokeStore::new();
        let mut index = GridIndex::default();
        let id = line(&mut store, &mut index, 0.0);
        let bake = BakeTransform {
            scale: 10.0,
            tx: 5.0,
            ty: 0.0,
        };
        store.get_mut(id).unwrap().bake_pending = true;
        let camera = Camera::new();
        let params = PickParams::from(&ViewportConfig::default());
        // Pre-bake (50, 0) renders at (505, 0)
        let pick = pick_at(&store, &index, &camera, Some(bake), true, Point::new(505.0, 3.0), params).unwrap();
        assert_eq!(pick.id, id);
        assert!((pick.distance_px - 3.0).abs() < 1e-9);
        // Past the rendered end of the line
        assert!(pick_at(&store, &index, &camera, Some(bake), true, Point::new(1200.0, 0.0), params).is_none());
    }
}
