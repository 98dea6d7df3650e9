//! Renormalization: fold an extreme camera transform into stroke geometry.
//!
//! The camera is reset to the identity at once; the geometry rewrite is a
//! resumable task stepped under a per-frame time budget. Until a stroke is
//! rewritten the renderer and hit-tester apply [`BakeTransform`] on the fly.

use crate::camera::Camera;
use crate::config::ViewportConfig;
use crate::store::StrokeStore;
use crate::stroke::StrokeId;
use kurbo::{Affine, Point};
use std::time::{Duration, Instant};

/// Camera transform captured when a bake starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BakeTransform {
    pub scale: f64,
    pub tx: f64,
    pub ty: f64,
}

impl BakeTransform {
    /// Capture the camera's current world-to-screen mapping.
    pub fn from_camera(camera: &Camera) -> Self {
        Self {
            scale: camera.scale,
            tx: camera.tx,
            ty: camera.ty,
        }
    }

    /// Maps pre-bake coordinates to post-bake coordinates.
    pub fn affine(&self) -> Affine {
        Affine::new([self.scale, 0.0, 0.0, self.scale, self.tx, self.ty])
    }

    /// Maps post-bake coordinates back into pre-bake coordinates.
    pub fn inverse_affine(&self) -> Affine {
        let inv = 1.0 / self.scale;
        Affine::new([inv, 0.0, 0.0, inv, -self.tx * inv, -self.ty * inv])
    }

    /// Map a post-bake point into pre-bake coordinates.
    pub fn to_pre_bake(&self, point: Point) -> Point {
        Point::new((point.x - self.tx) / self.scale, (point.y - self.ty) / self.scale)
    }
}

/// Decides when a step must yield.
pub trait Budget {
    fn exhausted(&mut self) -> bool;
}

/// Wall-clock budget for one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameBudget {
    deadline: Instant,
}

impl FrameBudget {
    pub fn new(budget: Duration) -> Self {
        Self {
            deadline: Instant::now() + budget,
        }
    }

    /// Budget from `config.bake_budget()` milliseconds.
    pub fn from_config(config: &ViewportConfig) -> Self {
        Self::new(Duration::from_secs_f64(config.bake_budget() / 1000.0))
    }
}

impl Budget for FrameBudget {
    fn exhausted(&mut self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Budget counted in strokes; handy for deterministic stepping.
#[derive(Debug, Clone, Copy)]
pub struct StrokeBudget(pub usize);

impl Budget for StrokeBudget {
    fn exhausted(&mut self) -> bool {
        if self.0 == 0 {
            return true;
        }
        self.0 -= 1;
        false
    }
}

/// Never yields.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbounded;

impl Budget for Unbounded {
    fn exhausted(&mut self) -> bool {
        false
    }
}

/// Result of one [`BakeTask::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BakeProgress {
    /// Strokes rewritten by this step.
    pub baked: usize,
    /// No work is left.
    pub done: bool,
}

/// An in-flight bake with an explicit progress cursor.
#[derive(Debug, Clone)]
pub struct BakeTask {
    transform: BakeTransform,
    queue: Vec<StrokeId>,
    cursor: usize,
}

impl BakeTask {
    /// Mark every stroke pending and queue it, in z-order.
    pub fn start(transform: BakeTransform, store: &mut StrokeStore) -> Self {
        let queue = store
            .iter_mut()
            .map(|stroke| {
                stroke.bake_pending = true;
                stroke.id()
            })
            .collect();
        Self {
            transform,
            queue,
            cursor: 0,
        }
    }

    pub fn transform(&self) -> BakeTransform {
        self.transform
    }

    /// Strokes not yet visited.
    pub fn remaining(&self) -> usize {
        self.queue.len() - self.cursor
    }

    pub fn is_done(&self) -> bool {
        self.cursor >= self.queue.len()
    }

    /// Rewrite strokes until the budget runs out. Always makes progress.
    ///
    /// Strokes are rewritten atomically; the budget is checked between them.
    pub fn step(&mut self, store: &mut StrokeStore, budget: &mut dyn Budget) -> BakeProgress {
        let affine = self.transform.affine();
        let mut baked = 0;
        while self.cursor < self.queue.len() {
            if baked > 0 && budget.exhausted() {
                break;
            }
            let id = self.queue[self.cursor];
            self.cursor += 1;
            if let Some(stroke) = store.get_mut(id) {
                if stroke.bake_pending {
                    stroke.transform(affine);
                    stroke.bake_pending = false;
                    baked += 1;
                }
            }
        }
        BakeProgress {
            baked,
            done: self.is_done(),
        }
    }
}

/// Rewrite one pending stroke right away (before it is edited).
/// Returns true if the stroke was pending.
pub fn bake_stroke_now(store: &mut StrokeStore, transform: BakeTransform, id: StrokeId) -> bool {
    match store.get_mut(id) {
        Some(stroke) if stroke.bake_pending => {
            stroke.transform(transform.affine());
            stroke.bake_pending = false;
            true
        }
        _ => false,
    }
}

/// Reset an out-of-range camera and start a compensating bake.
///
/// A no-op while another bake is in flight. Returns the started bake's
/// transform; an empty store needs no task, so `active` stays `None`.
pub fn renormalize_if_needed(
    camera: &mut Camera,
    store: &mut StrokeStore,
    config: &ViewportConfig,
    active: &mut Option<BakeTask>,
) -> Option<BakeTransform> {
    if active.is_some() || !camera.needs_renormalization(config) {
        return None;
    }
    let transform = BakeTransform::from_camera(camera);
    log::info!(
        "renormalizing camera (scale={}, tx={}, ty={}) over {} strokes",
        transform.scale,
        transform.tx,
        transform.ty,
        store.len()
    );
    camera.reset();
    if !store.is_empty() {
        *active = Some(BakeTask::start(transform, store));
    }
    Some(transform)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::{Stroke, StrokeStyle};

    fn store_with(n: usize) -> StrokeStore {
        let mut store = StrokeStore::new();
        for i in 0..n {
            let x = i as f64 * 10.0;
            store.add(Stroke::path_from_flat(vec![x, 0.0, 1.0, x + 5.0, 5.0, 1.0], StrokeStyle::default()));
        }
        store
    }

    #[test]
    fn test_bake_transform_inverse() {
        let t = BakeTransform {
            scale: 1000.0,
            tx: 2e8,
            ty: -3.0,
        };
        let p = Point::new(12.5, -7.0);
        let back = t.inverse_affine() * (t.affine() * p);
        assert!((back - p).hypot() < 1e-9);
        assert!((t.to_pre_bake(t.affine() * p) - p).hypot() < 1e-6);
    }

    #[test]
    fn test_renormalize_keeps_screen_positions() {
        let config = ViewportConfig::default();
        let mut store = store_with(10);
        let mut camera = Camera {
            scale: 1000.0,
            tx: 50.0,
            ty: -20.0,
            ..Camera::default()
        };
        let before: Vec<Point> = store
            .iter()
            .map(|s| camera.world_to_screen(s.as_path().unwrap().point(1)))
            .collect();

        let mut active = None;
        assert!(renormalize_if_needed(&mut camera, &mut store, &config, &mut active).is_some());
        assert_eq!((camera.scale, camera.tx, camera.ty), (1.0, 0.0, 0.0));

        let task = active.as_mut().unwrap();
        let mut steps = 0;
        while !task.step(&mut store, &mut StrokeBudget(3)).done {
            steps += 1;
        }
        assert!(steps >= 2);
        assert!(store.iter().all(|s| !s.is_bake_pending()));
        for (stroke, expected) in store.iter().zip(before) {
            let now = camera.world_to_screen(stroke.as_path().unwrap().point(1));
            assert!((now - expected).hypot() < 1e-6);
        }
    }

    #[test]
    fn test_second_trigger_is_noop() {
        let config = ViewportConfig::default();
        let mut store = store_with(2);
        let mut camera = Camera {
            scale: 1e-5,
            ..Camera::default()
        };
        let mut active = None;
        renormalize_if_needed(&mut camera, &mut store, &config, &mut active);
        camera.scale = 1e5;
        assert!(renormalize_if_needed(&mut camera, &mut store, &config, &mut active).is_none());
        assert_eq!(camera.scale, 1e5);
    }

    #[test]
    fn test_step_skips_removed_and_new_strokes() {
        let mut store = store_with(3);
        let task_transform = BakeTransform {
            scale: 2.0,
            tx: 0.0,
            ty: 0.0,
        };
        let mut task = BakeTask::start(task_transform, &mut store);
        let first = store.iter().next().unwrap().id();
        store.remove(first);
        let fresh = Stroke::path_from_flat(vec![1.0, 1.0, 1.0], StrokeStyle::default());
        let fresh_id = fresh.id();
        store.add(fresh);

        let progress = task.step(&mut store, &mut Unbounded);
        assert_eq!(progress, BakeProgress { baked: 2, done: true });
        assert_eq!(store.get(fresh_id).unwrap().as_path().unwrap().point(0), Point::new(1.0, 1.0));
    }

    #[test]
    fn test_bake_stroke_now() {
        let mut store = store_with(1);
        let transform = BakeTransform {
            scale: 4.0,
            tx: 1.0,
            ty: 0.0,
        };
        let _task = BakeTask::start(transform, &mut store);
        let id = store.iter().next().unwrap().id();
        assert!(bake_stroke_now(&mut store, transform, id));
        assert!(!bake_stroke_now(&mut store, transform, id));
        assert_eq!(store.get(id).unwrap().as_path().unwrap().point(0), Point::new(1.0, 0.0));
    }
}
