//! Uniform-grid spatial index over stroke bounding boxes.
//!
//! The index never owns strokes; it maps tile keys to stroke IDs. Queries
//! return a candidate superset that callers refine with an exact test.

mod worker;

pub use worker::{IndexRebuilder, RebuildPoll, RebuildRequest, RebuildResult};

use crate::config::ViewportConfig;
use crate::stroke::StrokeId;
use kurbo::Rect;
use std::collections::{HashMap, HashSet};

/// Integer tile coordinate: `(floor(x / cell), floor(y / cell))`.
pub type TileKey = (i64, i64);

/// Bounds on the work a single insert or query may do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexLimits {
    /// Coordinates beyond this magnitude are never tiled.
    pub world_ceiling: f64,
    /// Maximum tile count along either axis for one stroke.
    pub max_span: i64,
    /// Maximum total tiles for one stroke.
    pub max_tiles: i64,
    /// Queries covering more tiles than this fall back to the full set.
    pub query_cap: i64,
}

impl Default for IndexLimits {
    fn default() -> Self {
        Self::from(&ViewportConfig::default())
    }
}

impl From<&ViewportConfig> for IndexLimits {
    fn from(config: &ViewportConfig) -> Self {
        Self {
            world_ceiling: config.index_world_ceiling,
            max_span: config.index_max_span,
            max_tiles: config.index_max_tiles_per_stroke,
            query_cap: config.index_query_cap,
        }
    }
}

/// Inclusive tile range covered by a bbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSpan {
    pub x0: i64,
    pub y0: i64,
    pub x1: i64,
    pub y1: i64,
}

impl TileSpan {
    /// Tile range for `rect`, or `None` if it cannot be tiled safely.
    pub fn of(rect: Rect, cell: f64, ceiling: f64) -> Option<Self> {
        if !(rect.is_finite() && cell.is_finite() && cell > 0.0) {
            return None;
        }
        if [rect.x0, rect.y0, rect.x1, rect.y1].iter().any(|v| v.abs() > ceiling) {
            return None;
        }
        let tile = |v: f64| (v / cell).floor() as i64;
        Some(Self {
            x0: tile(rect.x0.min(rect.x1)),
            y0: tile(rect.y0.min(rect.y1)),
            x1: tile(rect.x0.max(rect.x1)),
            y1: tile(rect.y0.max(rect.y1)),
        })
    }

    pub fn width(&self) -> i64 {
        self.x1 - self.x0 + 1
    }

    pub fn height(&self) -> i64 {
        self.y1 - self.y0 + 1
    }

    /// Number of tiles, saturating.
    pub fn area(&self) -> i64 {
        self.width().saturating_mul(self.height())
    }

    /// Iterate over every key in the span.
    pub fn keys(&self) -> impl Iterator<Item = TileKey> + '_ {
        (self.y0..=self.y1).flat_map(move |y| (self.x0..=self.x1).map(move |x| (x, y)))
    }
}

/// Footprint for a stroke bbox, or `None` when indexing it must be refused.
pub(crate) fn stroke_footprint(bbox: Rect, cell: f64, limits: &IndexLimits) -> Option<TileSpan> {
    let span = TileSpan::of(bbox, cell, limits.world_ceiling)?;
    if span.width() > limits.max_span || span.height() > limits.max_span || span.area() > limits.max_tiles {
        return None;
    }
    Some(span)
}

/// Adaptive cell size for a visible world width.
pub fn target_cell(visible_width: f64, config: &ViewportConfig) -> f64 {
    let raw = visible_width / config.cell_divisor;
    if raw.is_finite() {
        raw.clamp(config.cell_min, config.cell_max)
    } else {
        config.cell_max
    }
}

/// Whether moving from `current` to `target` invalidates enough tile keys to rebuild.
pub fn needs_retune(current: f64, target: f64, config: &ViewportConfig) -> bool {
    (target - current).abs() > current * config.cell_retune_threshold
}

/// Result of [`GridIndex::query`].
#[derive(Debug)]
pub enum Candidates<'a> {
    /// Conservative fallback: scan the whole store.
    All(&'a HashSet<StrokeId>),
    /// Strokes sharing at least one tile with the query rect.
    Subset(HashSet<StrokeId>),
}

impl Candidates<'_> {
    /// Whether the query fell back to the full set.
    pub fn is_full_scan(&self) -> bool {
        matches!(self, Candidates::All(_))
    }

    pub fn contains(&self, id: &StrokeId) -> bool {
        match self {
            Candidates::All(all) => all.contains(id),
            Candidates::Subset(ids) => ids.contains(id),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Candidates::All(all) => all.len(),
            Candidates::Subset(ids) => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &StrokeId> {
        match self {
            Candidates::All(all) => all.iter(),
            Candidates::Subset(ids) => ids.iter(),
        }
    }
}

/// Uniform grid mapping tiles to the strokes whose padded bbox overlaps them.
#[derive(Debug, Clone)]
pub struct GridIndex {
    cell: f64,
    limits: IndexLimits,
    tiles: HashMap<TileKey, Vec<StrokeId>>,
    all: HashSet<StrokeId>,
    footprints: HashMap<StrokeId, TileSpan>,
    /// Strokes that were refused a footprint.
    overflowed: HashSet<StrokeId>,
}

impl Default for GridIndex {
    fn default() -> Self {
        Self::with_config(&ViewportConfig::default())
    }
}

impl GridIndex {
    /// Create an empty index.
    pub fn new(cell: f64, limits: IndexLimits) -> Self {
        Self {
            cell: sanitize_cell(cell),
            limits,
            tiles: HashMap::new(),
            all: HashSet::new(),
            footprints: HashMap::new(),
            overflowed: HashSet::new(),
        }
    }

    /// Create an empty index from configuration.
    pub fn with_config(config: &ViewportConfig) -> Self {
        Self::new(config.index_initial_cell, IndexLimits::from(config))
    }

    /// Current cell size in world units.
    pub fn cell(&self) -> f64 {
        self.cell
    }

    pub fn limits(&self) -> IndexLimits {
        self.limits
    }

    /// Number of indexed strokes (including refused ones).
    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    pub fn contains(&self, id: StrokeId) -> bool {
        self.all.contains(&id)
    }

    /// Every stroke the index knows about.
    pub fn all(&self) -> &HashSet<StrokeId> {
        &self.all
    }

    /// Number of occupied tiles.
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Whether any stroke was refused a footprint.
    pub fn is_overflow(&self) -> bool {
        !self.overflowed.is_empty()
    }

    /// Strokes that were refused a footprint.
    pub fn overflowed(&self) -> &HashSet<StrokeId> {
        &self.overflowed
    }

    /// Index a stroke. Returns false when it was refused (and the index overflowed).
    pub fn insert(&mut self, id: StrokeId, bbox: Rect) -> bool {
        if self.all.contains(&id) {
            self.remove(id);
        }
        self.all.insert(id);
        match stroke_footprint(bbox, self.cell, &self.limits) {
            Some(span) => {
                for key in span.keys() {
                    self.tiles.entry(key).or_default().push(id);
                }
                self.footprints.insert(id, span);
                true
            }
            None => {
                log::debug!("index refused stroke {id} with bbox {bbox:?}; overflow");
                self.overflowed.insert(id);
                false
            }
        }
    }

    /// Drop a stroke from the index.
    pub fn remove(&mut self, id: StrokeId) -> bool {
        if !self.all.remove(&id) {
            return false;
        }
        self.overflowed.remove(&id);
        if let Some(span) = self.footprints.remove(&id) {
            for key in span.keys() {
                if let Some(list) = self.tiles.get_mut(&key) {
                    list.retain(|other| *other != id);
                    if list.is_empty() {
                        self.tiles.remove(&key);
                    }
                }
            }
        }
        true
    }

    /// Re-index a stroke whose bbox changed.
    pub fn update(&mut self, id: StrokeId, bbox: Rect) -> bool {
        self.remove(id);
        self.insert(id, bbox)
    }

    /// Candidate strokes for `rect`.
    ///
    /// Falls back to the full set when the index overflowed, the rect cannot be
    /// tiled, or it covers more tiles than are occupied or than the query cap.
    pub fn query(&self, rect: Rect) -> Candidates<'_> {
        if self.is_overflow() {
            return Candidates::All(&self.all);
        }
        let Some(span) = TileSpan::of(rect, self.cell, self.limits.world_ceiling) else {
            return Candidates::All(&self.all);
        };
        let area = span.area();
        if area > self.limits.query_cap || area > self.tiles.len() as i64 {
            return Candidates::All(&self.all);
        }
        let mut found = HashSet::new();
        for key in span.keys() {
            if let Some(list) = self.tiles.get(&key) {
                found.extend(list.iter().copied());
            }
        }
        Candidates::Subset(found)
    }

    /// Drop everything, keeping the cell size.
    pub fn clear(&mut self) {
        self.tiles.clear();
        self.all.clear();
        self.footprints.clear();
        self.overflowed.clear();
    }

    /// Rebuild from scratch with the current cell size.
    pub fn rebuild<I>(&mut self, strokes: I)
    where
        I: IntoIterator<Item = (StrokeId, Rect)>,
    {
        self.clear();
        for (id, bbox) in strokes {
            self.insert(id, bbox);
        }
        if self.is_overflow() {
            log::debug!("index rebuilt with {} refused strokes", self.overflowed.len());
        }
    }

    /// Change the cell size and rebuild.
    pub fn rebuild_with_cell<I>(&mut self, cell: f64, strokes: I)
    where
        I: IntoIterator<Item = (StrokeId, Rect)>,
    {
        self.cell = sanitize_cell(cell);
        self.rebuild(strokes);
    }

    /// Install a tiling computed elsewhere (see [`IndexRebuilder`]).
    pub fn apply_rebuild(&mut self, result: RebuildResult) {
        self.cell = result.cell;
        self.tiles = result.tiles;
        self.all = result.all;
        self.footprints = result.footprints;
        self.overflowed = result.overflowed;
    }
}

fn sanitize_cell(cell: f64) -> f64 {
    if cell.is_finite() && cell > 0.0 { cell } else { 512.0 }
}
