//! Canvas context: the document, its index, history and camera, and the
//! operations that keep them consistent with each other.

use crate::bake::{self, BakeTask, BakeTransform, Budget, FrameBudget, Unbounded};
use crate::camera::Camera;
use crate::config::ViewportConfig;
use crate::document::{DocumentRecord, DOCUMENT_VERSION};
use crate::gc;
use crate::history::{History, HistoryEntry, HistoryTarget};
use crate::index::{self, Candidates, GridIndex, IndexLimits, IndexRebuilder, RebuildPoll};
use crate::picking::{self, Pick, PickParams};
use crate::selection::{self, Handle, HandleKind, Selection, HANDLE_HIT_TOLERANCE, ROTATE_HANDLE_OFFSET};
use crate::store::StrokeStore;
use crate::stroke::{
    ChunkParams, SerializableColor, ShapeKind, Stroke, StrokeId, StrokeStyle, StylePatch,
};
use kurbo::{Affine, Point, Rect, Size};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Grid display style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridStyle {
    /// No grid (plain background).
    None,
    /// Full grid lines.
    #[default]
    Lines,
    /// Only corner crosses (+).
    CrossPlus,
    /// Only corner dots (.).
    Dots,
}

/// Canvas background.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Background {
    pub color: SerializableColor,
    #[serde(default)]
    pub grid: GridStyle,
}

impl Default for Background {
    fn default() -> Self {
        Self {
            color: SerializableColor::new(250, 250, 250, 255),
            grid: GridStyle::default(),
        }
    }
}

/// Kind of multi-point gesture in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    Draw,
    Transform,
}

#[derive(Debug, Clone, Default)]
enum Gesture {
    #[default]
    Idle,
    Drawing(StrokeId),
    Transforming {
        before: Vec<Stroke>,
    },
}

/// What a [`Canvas::tick`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Strokes rewritten by the bake this frame.
    pub baked: usize,
    /// A renormalization started this frame.
    pub renormalized: bool,
    /// The in-flight bake finished this frame.
    pub bake_finished: bool,
    /// World GC moved the document this frame.
    pub collected: bool,
    /// A rebuilt index was installed this frame.
    pub rebuild_applied: bool,
}

/// The drawing surface: strokes, spatial index, history, camera and selection.
///
/// Every mutation goes through here so the index and history stay in step
/// with the store.
#[derive(Debug)]
pub struct Canvas {
    /// Camera for view transform.
    pub camera: Camera,
    /// Currently selected strokes.
    pub selection: Selection,
    /// Viewport size in logical pixels.
    pub viewport_size: Size,
    config: ViewportConfig,
    store: StrokeStore,
    index: GridIndex,
    history: History,
    background: Background,
    bake: Option<BakeTask>,
    rebuilder: IndexRebuilder,
    /// Cell size of the most recently requested rebuild.
    requested_cell: f64,
    /// The live index changed after the pending rebuild snapshot was taken.
    rebuild_dirty: bool,
    defer_index: bool,
    deferred: HashSet<StrokeId>,
    gesture: Gesture,
    revision: u64,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new()
    }
}

impl Canvas {
    /// Create an empty canvas with default configuration.
    pub fn new() -> Self {
        Self::with_config(ViewportConfig::default())
    }

    /// Create an empty canvas.
    pub fn with_config(config: ViewportConfig) -> Self {
        let index = GridIndex::with_config(&config);
        Self {
            camera: Camera::with_config(&config),
            selection: Selection::new(),
            viewport_size: Size::new(800.0, 600.0),
            store: StrokeStore::new(),
            requested_cell: index.cell(),
            index,
            history: History::new(config.history_limit),
            background: Background::default(),
            bake: None,
            rebuilder: IndexRebuilder::new(config.threaded_rebuild),
            rebuild_dirty: false,
            defer_index: false,
            deferred: HashSet::new(),
            gesture: Gesture::Idle,
            revision: 0,
            config,
        }
    }

    /// Restore a canvas from a persisted record and rebuild its index.
    pub fn from_record(record: DocumentRecord, config: ViewportConfig) -> Self {
        let mut canvas = Self::with_config(config);
        let mut strokes = record.strokes;
        for stroke in &mut strokes {
            stroke.recompute_bbox();
            stroke.bake_pending = false;
        }
        canvas.store.replace_all(strokes);
        canvas.camera = Camera {
            min_scale: canvas.config.min_scale,
            max_scale: canvas.config.max_scale,
            ..record.camera
        };
        canvas.camera.sanitize();
        canvas.background = record.background;
        canvas.index.rebuild(canvas.store.iter().map(|s| (s.id(), s.bbox())));
        log::info!("loaded document with {} strokes", canvas.store.len());
        canvas
    }

    /// Snapshot the document for persistence, folding any pending bake in first.
    pub fn to_record(&mut self) -> DocumentRecord {
        self.drain_bake();
        DocumentRecord {
            version: DOCUMENT_VERSION,
            camera: self.camera,
            background: self.background.clone(),
            strokes: self.store.as_slice().to_vec(),
        }
    }

    pub fn config(&self) -> &ViewportConfig {
        &self.config
    }

    pub fn store(&self) -> &StrokeStore {
        &self.store
    }

    pub fn index(&self) -> &GridIndex {
        &self.index
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn background(&self) -> &Background {
        &self.background
    }

    /// Get a stroke by ID.
    pub fn stroke(&self, id: StrokeId) -> Option<&Stroke> {
        self.store.get(id)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Bumped on every document, camera-reset or index change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    /// Set the viewport size.
    pub fn set_viewport_size(&mut self, width: f64, height: f64) {
        self.viewport_size = Size::new(width, height);
    }

    pub fn chunk_params(&self) -> ChunkParams {
        ChunkParams::from(&self.config)
    }

    // --- bake state -------------------------------------------------------

    /// Pending bake transform, while a bake is in flight.
    pub fn bake_transform(&self) -> Option<BakeTransform> {
        self.bake.as_ref().map(|b| b.transform())
    }

    pub fn is_baking(&self) -> bool {
        self.bake.is_some()
    }

    /// Transform from a stroke's own coordinates to the screen.
    pub fn display_transform(&self, stroke: &Stroke) -> Affine {
        match self.bake_transform() {
            Some(bake) if stroke.is_bake_pending() => self.camera.transform() * bake.affine(),
            _ => self.camera.transform(),
        }
    }

    /// Stroke bbox in current world coordinates (bake-compensated).
    pub fn display_bbox(&self, stroke: &Stroke) -> Rect {
        match self.bake_transform() {
            Some(bake) if stroke.is_bake_pending() => bake.affine().transform_rect_bbox(stroke.bbox()),
            _ => stroke.bbox(),
        }
    }

    /// Rewrite a pending stroke before it is edited.
    fn ensure_baked(&mut self, id: StrokeId) {
        if let Some(transform) = self.bake_transform() {
            bake::bake_stroke_now(&mut self.store, transform, id);
        }
    }

    // --- index maintenance -----------------------------------------------

    /// Suspend (or resume and flush) index updates.
    pub fn set_defer_index(&mut self, defer: bool) {
        self.defer_index = defer;
        if defer {
            return;
        }
        let pending: Vec<StrokeId> = self.deferred.drain().collect();
        for id in pending {
            self.sync_index(id);
        }
    }

    pub fn is_index_deferred(&self) -> bool {
        self.defer_index
    }

    fn sync_index(&mut self, id: StrokeId) {
        if self.defer_index {
            self.deferred.insert(id);
            return;
        }
        match self.store.get(id) {
            Some(stroke) => {
                self.index.update(id, stroke.bbox());
            }
            None => {
                self.index.remove(id);
            }
        }
        if self.rebuilder.is_pending() {
            self.rebuild_dirty = true;
        }
    }

    /// Whether an asynchronous rebuild has been requested but not installed.
    pub fn is_rebuild_pending(&self) -> bool {
        self.rebuilder.is_pending()
    }

    /// Rebuild the index at the current cell size.
    pub fn rebuild_index(&mut self) {
        self.request_rebuild(self.index.cell());
    }

    fn request_rebuild(&mut self, cell: f64) {
        let snapshot: Vec<(StrokeId, Rect)> = self.store.iter().map(|s| (s.id(), s.bbox())).collect();
        let limits = IndexLimits::from(&self.config);
        self.requested_cell = cell;
        self.rebuild_dirty = false;
        self.rebuilder.request(cell, limits, snapshot);
        self.poll_rebuild();
    }

    /// Install a finished rebuild if it is still current. Returns true if installed.
    fn poll_rebuild(&mut self) -> bool {
        match self.rebuilder.poll(self.store.len()) {
            // Deferred ids stay queued and are synced over the new tiles on flush.
            RebuildPoll::Ready(result) if !self.rebuild_dirty => {
                self.index.apply_rebuild(result);
                self.touch();
                true
            }
            RebuildPoll::Ready(_) | RebuildPoll::Stale => {
                log::debug!("index changed during rebuild; requesting again");
                let cell = self.requested_cell;
                let snapshot: Vec<(StrokeId, Rect)> =
                    self.store.iter().map(|s| (s.id(), s.bbox())).collect();
                self.rebuild_dirty = false;
                self.rebuilder.request(cell, IndexLimits::from(&self.config), snapshot);
                false
            }
            RebuildPoll::Pending | RebuildPoll::Idle => false,
        }
    }

    /// Retune the grid cell to the visible world width, rebuilding on a large change.
    pub fn retune_grid(&mut self) -> bool {
        let visible = self.camera.visible_world_rect(self.viewport_size);
        let target = index::target_cell(visible.width(), &self.config);
        let current = if self.rebuilder.is_pending() {
            self.requested_cell
        } else {
            self.index.cell()
        };
        if !index::needs_retune(current, target, &self.config) {
            return false;
        }
        log::debug!("retuning grid cell {current} -> {target}");
        self.request_rebuild(target);
        true
    }

    /// Whether the index may miss strokes or hold them at old positions.
    ///
    /// True while a bake is in flight, while a rebuild is pending, and while
    /// deferred updates are queued.
    pub fn is_index_stale(&self) -> bool {
        self.is_baking() || self.rebuilder.is_pending() || !self.deferred.is_empty()
    }

    /// Index candidates for a world rect.
    ///
    /// Returns [`Candidates::All`] while the index is stale; callers then scan
    /// the store rather than trusting membership.
    pub fn query(&self, rect: Rect) -> Candidates<'_> {
        if self.is_index_stale() {
            Candidates::All(self.index.all())
        } else {
            self.index.query(rect)
        }
    }

    // --- gestures ----------------------------------------------------------

    /// Kind of gesture in progress, if any.
    pub fn gesture(&self) -> Option<GestureKind> {
        match self.gesture {
            Gesture::Idle => None,
            Gesture::Drawing(_) => Some(GestureKind::Draw),
            Gesture::Transforming { .. } => Some(GestureKind::Transform),
        }
    }

    fn finish_gesture(&mut self) {
        match self.gesture {
            Gesture::Idle => {}
            Gesture::Drawing(_) => {
                self.end_path();
            }
            Gesture::Transforming { .. } => {
                self.end_transform();
            }
        }
    }

    /// Start a freehand path. Index updates are deferred until [`Self::end_path`].
    pub fn begin_path(&mut self, style: StrokeStyle) -> StrokeId {
        self.finish_gesture();
        self.set_defer_index(true);
        let stroke = Stroke::path(style);
        let id = stroke.id();
        self.store.add(stroke);
        self.sync_index(id);
        self.gesture = Gesture::Drawing(id);
        self.touch();
        id
    }

    /// Append a world-space sample to the path being drawn.
    pub fn append_point(&mut self, world: Point, pressure: f64) -> bool {
        let Gesture::Drawing(id) = self.gesture else {
            return false;
        };
        self.ensure_baked(id);
        let chunks = self.chunk_params();
        let Some(stroke) = self.store.get_mut(id) else {
            return false;
        };
        if !stroke.push_point(world.x, world.y, pressure, chunks) {
            return false;
        }
        self.sync_index(id);
        self.touch();
        true
    }

    /// Append a screen-space sample to the path being drawn.
    pub fn append_screen_point(&mut self, screen: Point, pressure: f64) -> bool {
        let world = self.camera.screen_to_world(screen);
        self.append_point(world, pressure)
    }

    /// Finish the path, recording one `add` entry. Empty paths are discarded.
    pub fn end_path(&mut self) -> Option<StrokeId> {
        let Gesture::Drawing(id) = std::mem::take(&mut self.gesture) else {
            return None;
        };
        let empty = self.store.get(id).is_none_or(|s| s.point_count() == 0);
        if empty {
            self.store.remove(id);
            self.deferred.remove(&id);
            self.index.remove(id);
            self.set_defer_index(false);
            return None;
        }
        self.set_defer_index(false);
        let index = self.store.index_of(id)?;
        let stroke = self.store.get(id)?.clone();
        self.history.push(HistoryEntry::Add { index, stroke });
        Some(id)
    }

    /// Add a finished stroke on top, recording one `add` entry.
    pub fn add_stroke(&mut self, stroke: Stroke) -> StrokeId {
        let id = stroke.id();
        let index = self.store.add(stroke);
        self.sync_index(id);
        if let Some(stroke) = self.store.get(id) {
            self.history.push(HistoryEntry::Add {
                index,
                stroke: stroke.clone(),
            });
        }
        self.touch();
        id
    }

    /// Add a vector shape spanning two world points.
    pub fn add_shape(&mut self, kind: ShapeKind, start: Point, end: Point, style: StrokeStyle) -> StrokeId {
        self.add_stroke(Stroke::shape(kind, start, end, style))
    }

    /// Add several strokes at once (paste, duplicate), recording one `addGroup` entry.
    pub fn add_group(&mut self, strokes: Vec<Stroke>) -> Vec<StrokeId> {
        let mut recorded = Vec::with_capacity(strokes.len());
        let mut ids = Vec::with_capacity(strokes.len());
        for stroke in strokes {
            let id = stroke.id();
            let index = self.store.add(stroke);
            self.sync_index(id);
            if let Some(stroke) = self.store.get(id) {
                recorded.push((index, stroke.clone()));
            }
            ids.push(id);
        }
        if !recorded.is_empty() {
            self.history.push(HistoryEntry::AddGroup { strokes: recorded });
            self.touch();
        }
        ids
    }

    /// Delete strokes. One stroke records `delete`, several record `deleteGroup`.
    pub fn delete(&mut self, ids: &[StrokeId]) -> usize {
        let mut targets: Vec<(usize, StrokeId)> = ids
            .iter()
            .filter_map(|id| self.store.index_of(*id).map(|i| (i, *id)))
            .collect();
        targets.sort_unstable();
        targets.dedup();
        // Remove from the top down so recorded positions stay original
        let mut removed = Vec::with_capacity(targets.len());
        for &(_, id) in targets.iter().rev() {
            self.ensure_baked(id);
            if let Some(entry) = self.store.remove(id) {
                self.sync_index(id);
                self.selection.remove(id);
                removed.push(entry);
            }
        }
        removed.reverse();
        let count = removed.len();
        match count {
            0 => return 0,
            1 => {
                if let Some((index, stroke)) = removed.pop() {
                    self.history.push(HistoryEntry::Delete { index, stroke });
                }
            }
            _ => self.history.push(HistoryEntry::DeleteGroup { strokes: removed }),
        }
        self.touch();
        count
    }

    /// Delete the selected strokes.
    pub fn delete_selected(&mut self) -> usize {
        let ids = self.selection.ids().to_vec();
        self.delete(&ids)
    }

    /// Start a transform gesture over `ids`, snapshotting them.
    pub fn begin_transform(&mut self, ids: &[StrokeId]) -> bool {
        self.finish_gesture();
        let mut before = Vec::with_capacity(ids.len());
        for &id in ids {
            self.ensure_baked(id);
            if let Some(stroke) = self.store.get(id) {
                before.push(stroke.clone());
            }
        }
        if before.is_empty() {
            return false;
        }
        self.set_defer_index(true);
        self.gesture = Gesture::Transforming { before };
        true
    }

    /// Set the gesture's total transform, measured from the snapshot taken at start.
    pub fn apply_transform(&mut self, total: Affine) -> bool {
        let Gesture::Transforming { before } = &self.gesture else {
            return false;
        };
        let moved: Vec<Stroke> = before
            .iter()
            .map(|original| {
                let mut stroke = original.clone();
                stroke.transform(total);
                stroke
            })
            .collect();
        for stroke in moved {
            let id = stroke.id();
            if let Some(slot) = self.store.get_mut(id) {
                let timestamp = slot.timestamp;
                *slot = stroke;
                slot.timestamp = timestamp;
                self.sync_index(id);
            }
        }
        self.touch();
        true
    }

    /// Finish the transform gesture, recording one `transform` entry if anything moved.
    pub fn end_transform(&mut self) -> bool {
        let Gesture::Transforming { before } = std::mem::take(&mut self.gesture) else {
            return false;
        };
        self.set_defer_index(false);
        let after: Vec<Stroke> = before
            .iter()
            .filter_map(|s| self.store.get(s.id()).cloned())
            .collect();
        let changed = before
            .iter()
            .zip(&after)
            .any(|(a, b)| a.bbox() != b.bbox() || a.style != b.style || !same_geometry(a, b));
        if !changed {
            return false;
        }
        self.history.push(HistoryEntry::Transform { before, after });
        true
    }

    /// Selection handle under a screen point.
    pub fn handle_at(&self, screen: Point) -> Option<HandleKind> {
        if !self.camera.is_finite() {
            return None;
        }
        let world = self.camera.screen_to_world(screen);
        selection::hit_test_handles(&self.selection_handles(), world, HANDLE_HIT_TOLERANCE / self.camera.scale)
    }

    /// Drive the transform gesture from a handle dragged between two world points.
    ///
    /// Corner and edge handles scale the starting bounds about the opposite
    /// side; the rotate handle turns about their center. `constrain` keeps the
    /// aspect ratio or snaps the angle to 15°. Line endpoints are edited as
    /// geometry and are not handled here.
    pub fn drag_handle(&mut self, handle: HandleKind, from: Point, to: Point, constrain: bool) -> bool {
        let Gesture::Transforming { before } = &self.gesture else {
            return false;
        };
        let Some(bounds) = before.iter().map(|s| s.bbox()).reduce(|a, b| a.union(b)) else {
            return false;
        };
        let total = match handle {
            HandleKind::Rotate => selection::rotation_transform(bounds.center(), from, to, constrain).0,
            HandleKind::Corner(_) | HandleKind::Edge(_) => {
                selection::resize_transform(bounds, handle, to - from, constrain)
            }
            HandleKind::Endpoint(_) => return false,
        };
        self.apply_transform(total)
    }

    /// Apply a one-shot transform (flip, nudge) as a single `transform` entry.
    pub fn transform_strokes(&mut self, ids: &[StrokeId], affine: Affine) -> bool {
        if !self.begin_transform(ids) {
            return false;
        }
        self.apply_transform(affine);
        self.end_transform()
    }

    /// Apply a style patch to strokes, recording one `style` entry.
    pub fn set_style(&mut self, ids: &[StrokeId], patch: StylePatch) -> bool {
        let mut before = Vec::new();
        let mut after = Vec::new();
        for &id in ids {
            self.ensure_baked(id);
            let Some(stroke) = self.store.get_mut(id) else {
                continue;
            };
            let old = stroke.style;
            patch.apply(&mut stroke.style);
            if stroke.style == old {
                continue;
            }
            stroke.recompute_bbox();
            before.push((id, old));
            after.push((id, stroke.style));
            self.sync_index(id);
        }
        if before.is_empty() {
            return false;
        }
        self.history.push(HistoryEntry::Style { before, after });
        self.touch();
        true
    }

    /// Change the background, recording one `background` entry.
    pub fn set_background(&mut self, background: Background) -> bool {
        if background == self.background {
            return false;
        }
        let before = std::mem::replace(&mut self.background, background.clone());
        self.history.push(HistoryEntry::Background {
            before,
            after: background,
        });
        self.touch();
        true
    }

    /// Remove every stroke, recording one `clear` entry.
    pub fn clear(&mut self) -> bool {
        if self.store.is_empty() {
            return false;
        }
        self.finish_gesture();
        self.drain_bake();
        let strokes = self.take_all_strokes();
        self.history.push(HistoryEntry::Clear { strokes });
        true
    }

    // --- undo / redo -------------------------------------------------------

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Undo the last change.
    /// Returns true if undo was performed, false if nothing to undo.
    pub fn undo(&mut self) -> bool {
        if self.gesture.is_some() {
            return false;
        }
        let Some(entry) = self.history.pop_undo() else {
            return false;
        };
        log::debug!("undo {}", entry.kind());
        entry.revert(self);
        self.history.push_redo(entry);
        self.selection.prune(&self.store);
        true
    }

    /// Redo the last undone change.
    /// Returns true if redo was performed, false if nothing to redo.
    pub fn redo(&mut self) -> bool {
        if self.gesture.is_some() {
            return false;
        }
        let Some(entry) = self.history.pop_redo() else {
            return false;
        };
        log::debug!("redo {}", entry.kind());
        entry.apply(self);
        self.history.push_undo_keep_redo(entry);
        self.selection.prune(&self.store);
        true
    }

    // --- precision management ----------------------------------------------

    /// Renormalize the camera when it left the canonical range.
    ///
    /// Deferred while a gesture is in progress or another bake is in flight.
    pub fn renormalize_if_needed(&mut self) -> bool {
        if self.gesture.is_some() {
            return false;
        }
        let Some(transform) =
            bake::renormalize_if_needed(&mut self.camera, &mut self.store, &self.config, &mut self.bake)
        else {
            return false;
        };
        self.history.transform_snapshots(transform.affine());
        self.touch();
        true
    }

    /// Advance the bake under `budget`. Returns the number of strokes rewritten.
    pub fn step_bake(&mut self, budget: &mut dyn Budget) -> usize {
        let Some(task) = self.bake.as_mut() else {
            return 0;
        };
        let progress = task.step(&mut self.store, budget);
        if progress.done {
            self.finish_bake();
        }
        progress.baked
    }

    fn finish_bake(&mut self) {
        self.bake = None;
        log::info!("renormalization bake finished; rebuilding index");
        self.rebuild_index();
        self.world_gc_if_needed();
        self.touch();
    }

    /// Run any in-flight bake to completion.
    pub fn drain_bake(&mut self) {
        while self.bake.is_some() {
            self.step_bake(&mut Unbounded);
        }
    }

    /// Recenter/rescale the document when its coordinates drift too far.
    pub fn world_gc_if_needed(&mut self) -> bool {
        if self.is_baking() || self.gesture.is_some() {
            return false;
        }
        let Some(outcome) =
            gc::world_gc_if_needed(&mut self.camera, &mut self.store, self.viewport_size, &self.config)
        else {
            return false;
        };
        self.history.transform_snapshots(outcome.affine());
        self.rebuild_index();
        self.touch();
        true
    }

    /// Per-frame driver with the configured bake budget.
    pub fn tick(&mut self) -> TickReport {
        let mut budget = FrameBudget::from_config(&self.config);
        self.tick_with(&mut budget)
    }

    /// Per-frame driver: install finished rebuilds, pump the bake, trigger
    /// renormalization and world GC, and retune the grid.
    pub fn tick_with(&mut self, budget: &mut dyn Budget) -> TickReport {
        let mut report = TickReport {
            rebuild_applied: self.poll_rebuild(),
            ..TickReport::default()
        };
        if !self.is_baking() {
            report.renormalized = self.renormalize_if_needed();
        }
        if self.is_baking() {
            report.baked = self.step_bake(budget);
            report.bake_finished = !self.is_baking();
            return report;
        }
        report.collected = self.world_gc_if_needed();
        if self.gesture.is_none() {
            self.retune_grid();
        }
        report
    }

    // --- queries ---------------------------------------------------------------

    /// Topmost stroke at a screen point.
    pub fn pick(&self, screen: Point) -> Option<Pick> {
        picking::pick_at(
            &self.store,
            &self.index,
            &self.camera,
            self.bake_transform(),
            self.is_index_stale(),
            screen,
            PickParams::from(&self.config),
        )
    }

    /// Strokes whose bounds lie entirely inside a world rect.
    pub fn strokes_in_rect(&self, rect: Rect) -> Vec<StrokeId> {
        let candidates = self.query(rect);
        self.store
            .iter()
            .filter(|s| candidates.is_full_scan() || candidates.contains(&s.id()))
            .filter(|s| {
                let b = self.display_bbox(s);
                b.x0 >= rect.x0 && b.y0 >= rect.y0 && b.x1 <= rect.x1 && b.y1 <= rect.y1
            })
            .map(|s| s.id())
            .collect()
    }

    /// Replace the selection with the strokes inside a marquee (world rect).
    pub fn select_in_rect(&mut self, rect: Rect) -> usize {
        let ids = self.strokes_in_rect(rect);
        self.selection.select_all(ids);
        self.selection.len()
    }

    /// Select every stroke.
    pub fn select_all(&mut self) {
        let ids: Vec<StrokeId> = self.store.iter().map(|s| s.id()).collect();
        self.selection.select_all(ids);
    }

    /// Handles for the current selection, in world coordinates.
    pub fn selection_handles(&self) -> Vec<Handle> {
        let offset = ROTATE_HANDLE_OFFSET / self.camera.scale;
        let Some(bake) = self.bake_transform() else {
            return selection::selection_handles(&self.selection, &self.store, offset);
        };
        let mut selected = self.selection.resolve(&self.store);
        let (Some(first), None) = (selected.next(), selected.next()) else {
            // Multi-selection handles only depend on the combined bounds.
            return self
                .selection_bounds()
                .map(selection::bounds_handles)
                .unwrap_or_default();
        };
        if !first.is_bake_pending() {
            return selection::stroke_handles(first, offset);
        }
        let to_world = bake.affine();
        selection::stroke_handles(first, offset / bake.scale)
            .into_iter()
            .map(|h| Handle::new(to_world * h.position, h.kind))
            .collect()
    }

    /// Combined bounds of the selection in current world coordinates.
    pub fn selection_bounds(&self) -> Option<Rect> {
        self.selection
            .resolve(&self.store)
            .map(|s| self.display_bbox(s))
            .reduce(|a, b| a.union(b))
    }

    /// Document bounds in current world coordinates.
    pub fn bounds(&self) -> Option<Rect> {
        self.store.iter().map(|s| self.display_bbox(s)).reduce(|a, b| a.union(b))
    }

    /// Fit the view to show all strokes.
    pub fn fit_to_content(&mut self) {
        if let Some(bounds) = self.bounds() {
            self.camera.fit_to_bounds(bounds, self.viewport_size, 50.0);
            self.touch();
        }
    }
}

fn same_geometry(a: &Stroke, b: &Stroke) -> bool {
    match (a.as_path(), b.as_path()) {
        (Some(pa), Some(pb)) => pa == pb,
        _ => a.as_shape() == b.as_shape(),
    }
}

impl Gesture {
    fn is_some(&self) -> bool {
        !matches!(self, Gesture::Idle)
    }

    fn is_none(&self) -> bool {
        !self.is_some()
    }
}

impl HistoryTarget for Canvas {
    fn insert_stroke(&mut self, index: usize, mut stroke: Stroke) {
        stroke.bake_pending = false;
        let id = stroke.id();
        self.store.insert_at(index, stroke);
        self.sync_index(id);
        self.touch();
    }

    fn remove_stroke(&mut self, id: StrokeId) -> Option<(usize, Stroke)> {
        let removed = self.store.remove(id);
        if removed.is_some() {
            self.sync_index(id);
            self.touch();
        }
        removed
    }

    fn replace_stroke(&mut self, mut stroke: Stroke) {
        stroke.bake_pending = false;
        let id = stroke.id();
        if let Some(slot) = self.store.get_mut(id) {
            *slot = stroke;
            self.sync_index(id);
            self.touch();
        }
    }

    fn set_stroke_style(&mut self, id: StrokeId, style: StrokeStyle) {
        self.ensure_baked(id);
        if let Some(stroke) = self.store.get_mut(id) {
            stroke.style = style;
            stroke.recompute_bbox();
            self.sync_index(id);
            self.touch();
        }
    }

    fn take_all_strokes(&mut self) -> Vec<Stroke> {
        self.drain_bake();
        let strokes = self.store.clear();
        self.deferred.clear();
        self.index.clear();
        if self.rebuilder.is_pending() {
            self.rebuild_dirty = true;
        }
        self.selection.clear();
        self.touch();
        strokes
    }

    fn restore_all_strokes(&mut self, mut strokes: Vec<Stroke>) {
        for stroke in &mut strokes {
            stroke.bake_pending = false;
        }
        self.store.replace_all(strokes);
        self.index.rebuild(self.store.iter().map(|s| (s.id(), s.bbox())));
        if self.rebuilder.is_pending() {
            self.rebuild_dirty = true;
        }
        self.touch();
    }

    fn set_background(&mut self, background: Background) {
        self.background = background;
        self.touch();
    }
}
