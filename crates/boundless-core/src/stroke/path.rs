//! Freehand path geometry stored as a flat `(x, y, pressure)` buffer.

use kurbo::{Affine, Point, Rect};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::{Arc, RwLock, RwLockWriteGuard};

/// Values per sample in the flat buffer.
pub const POINT_STRIDE: usize = 3;

/// Chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    /// Segments per chunk.
    pub segments: usize,
    /// Paths with fewer segments are never chunked.
    pub min_segments: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            segments: 48,
            min_segments: 96,
        }
    }
}

impl From<&crate::config::ViewportConfig> for ChunkParams {
    fn from(config: &crate::config::ViewportConfig) -> Self {
        Self {
            segments: config.chunk_segments.max(2),
            min_segments: config.chunk_min_segments,
        }
    }
}

/// A contiguous run of points with its own bounds.
///
/// `start..=end` are point indices; consecutive chunks share their boundary point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chunk {
    pub start: usize,
    pub end: usize,
    pub bbox: Rect,
}

impl Chunk {
    fn segments(&self) -> usize {
        self.end - self.start
    }
}

/// Derived data, rebuilt lazily after invalidation.
#[derive(Debug, Default)]
struct PathCache {
    chunks: Option<Arc<Vec<Chunk>>>,
    /// Simplified buffers keyed by quantized epsilon; `None` = not worth it.
    lod: HashMap<i32, Option<Arc<Vec<f64>>>>,
}

/// An ordered sequence of pressure samples.
#[derive(Debug, Serialize, Deserialize)]
pub struct PathGeometry {
    /// Flat buffer, `POINT_STRIDE` values per point.
    points: Vec<f64>,
    #[serde(skip)]
    cache: RwLock<PathCache>,
}

impl Clone for PathGeometry {
    fn clone(&self) -> Self {
        // Clone the cached values, not the lock
        let cache = self
            .cache
            .read()
            .map(|c| PathCache {
                chunks: c.chunks.clone(),
                lod: c.lod.clone(),
            })
            .unwrap_or_default();
        Self {
            points: self.points.clone(),
            cache: RwLock::new(cache),
        }
    }
}

impl Default for PathGeometry {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for PathGeometry {
    fn eq(&self, other: &Self) -> bool {
        self.points == other.points
    }
}

impl PathGeometry {
    /// Create an empty path.
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            cache: RwLock::new(PathCache::default()),
        }
    }

    /// Create from a flat buffer. Trailing partial samples are dropped.
    pub fn from_flat(mut points: Vec<f64>) -> Self {
        points.truncate(points.len() / POINT_STRIDE * POINT_STRIDE);
        Self {
            points,
            cache: RwLock::new(PathCache::default()),
        }
    }

    /// Raw flat buffer.
    pub fn flat(&self) -> &[f64] {
        &self.points
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len() / POINT_STRIDE
    }

    /// Check if the path is empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of segments.
    pub fn segments(&self) -> usize {
        self.len().saturating_sub(1)
    }

    /// Position of point `i`.
    pub fn point(&self, i: usize) -> Point {
        let base = i * POINT_STRIDE;
        Point::new(self.points[base], self.points[base + 1])
    }

    /// Pressure of point `i`.
    pub fn pressure(&self, i: usize) -> f64 {
        self.points[i * POINT_STRIDE + 2]
    }

    /// Iterate over positions.
    pub fn iter_points(&self) -> impl Iterator<Item = Point> + '_ {
        self.points
            .chunks_exact(POINT_STRIDE)
            .map(|c| Point::new(c[0], c[1]))
    }

    /// Unpadded bounds of all points.
    pub fn bounds(&self) -> Rect {
        flat_bounds(&self.points).unwrap_or(Rect::ZERO)
    }

    fn cache_mut(&mut self) -> &mut PathCache {
        match self.cache.get_mut() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn cache_write(&self) -> Option<RwLockWriteGuard<'_, PathCache>> {
        self.cache.write().ok()
    }

    /// Append a sample, extending the chunk index in place when it is live.
    pub(crate) fn push(&mut self, x: f64, y: f64, pressure: f64, params: ChunkParams) {
        let pressure = if pressure.is_finite() { pressure.clamp(0.0, 1.0) } else { 1.0 };
        self.points.extend_from_slice(&[x, y, pressure]);
        let len = self.len();
        let cache = match self.cache.get_mut() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };
        cache.lod.clear();
        let Some(chunks) = cache.chunks.as_mut() else {
            return;
        };
        let chunks = Arc::make_mut(chunks);
        let p = Point::new(x, y);
        let dot = Rect::from_points(p, p);
        match chunks.last_mut() {
            Some(last) if last.segments() < params.segments => {
                last.end = len - 1;
                last.bbox = last.bbox.union(dot);
            }
            Some(last) => {
                let prev = last.end;
                let base = prev * POINT_STRIDE;
                let q = Point::new(self.points[base], self.points[base + 1]);
                chunks.push(Chunk {
                    start: prev,
                    end: len - 1,
                    bbox: Rect::from_points(q, p),
                });
            }
            None if len >= 2 => {
                let bbox = flat_bounds(&self.points).unwrap_or(dot);
                chunks.push(Chunk {
                    start: 0,
                    end: len - 1,
                    bbox,
                });
            }
            None => {}
        }
    }

    /// Drop chunk and LOD caches.
    pub(crate) fn invalidate_caches(&mut self) {
        let cache = self.cache_mut();
        cache.chunks = None;
        cache.lod.clear();
    }

    /// Apply an affine transform to every sample; caches are invalidated.
    pub(crate) fn transform(&mut self, affine: Affine) {
        for sample in self.points.chunks_exact_mut(POINT_STRIDE) {
            let p = affine * Point::new(sample[0], sample[1]);
            sample[0] = p.x;
            sample[1] = p.y;
        }
        self.invalidate_caches();
    }

    /// Chunk list, built on first use. `None` when the path is too short to chunk.
    pub fn chunks(&self, params: ChunkParams) -> Option<Arc<Vec<Chunk>>> {
        if self.segments() < params.min_segments.max(1) {
            return None;
        }
        if let Ok(cache) = self.cache.read() {
            if let Some(chunks) = &cache.chunks {
                return Some(chunks.clone());
            }
        }
        let built = Arc::new(build_chunks(&self.points, params.segments.max(2)));
        if let Some(mut cache) = self.cache_write() {
            cache.chunks = Some(built.clone());
        }
        Some(built)
    }

    /// Point index ranges (half-open) whose chunks intersect `view`.
    ///
    /// Adjacent chunks are merged so each range can be drawn as one polyline.
    /// Unchunked paths yield the whole path when their bounds intersect.
    pub fn visible_ranges(&self, view: Rect, pad: f64, params: ChunkParams) -> Vec<Range<usize>> {
        let len = self.len();
        if len == 0 {
            return Vec::new();
        }
        let padded = view.inflate(pad, pad);
        let Some(chunks) = self.chunks(params) else {
            return if rects_overlap(self.bounds(), padded) {
                vec![0..len]
            } else {
                Vec::new()
            };
        };
        let mut ranges: Vec<Range<usize>> = Vec::new();
        for chunk in chunks.iter().filter(|c| rects_overlap(c.bbox, padded)) {
            match ranges.last_mut() {
                Some(last) if last.end == chunk.start + 1 => last.end = chunk.end + 1,
                _ => ranges.push(chunk.start..chunk.end + 1),
            }
        }
        ranges
    }

    /// Cached simplification for `key`, if computed.
    pub(crate) fn cached_lod(&self, key: i32) -> Option<Option<Arc<Vec<f64>>>> {
        self.cache.read().ok().and_then(|c| c.lod.get(&key).cloned())
    }

    /// Store a simplification result for `key`.
    pub(crate) fn store_lod(&self, key: i32, value: Option<Arc<Vec<f64>>>) {
        if let Some(mut cache) = self.cache_write() {
            cache.lod.insert(key, value);
        }
    }
}

/// Bounds of a flat buffer, or `None` if empty.
pub(crate) fn flat_bounds(points: &[f64]) -> Option<Rect> {
    let mut iter = points.chunks_exact(POINT_STRIDE);
    let first = iter.next()?;
    let (mut x0, mut y0, mut x1, mut y1) = (first[0], first[1], first[0], first[1]);
    for c in iter {
        x0 = x0.min(c[0]);
        y0 = y0.min(c[1]);
        x1 = x1.max(c[0]);
        y1 = y1.max(c[1]);
    }
    Some(Rect::new(x0, y0, x1, y1))
}

fn build_chunks(points: &[f64], segments: usize) -> Vec<Chunk> {
    let len = points.len() / POINT_STRIDE;
    let mut chunks = Vec::with_capacity(len / segments + 1);
    let mut start = 0;
    while start + 1 < len {
        let end = (start + segments).min(len - 1);
        let slice = &points[start * POINT_STRIDE..(end + 1) * POINT_STRIDE];
        if let Some(bbox) = flat_bounds(slice) {
            chunks.push(Chunk { start, end, bbox });
        }
        start = end;
    }
    chunks
}

/// Closed-interval overlap test (touching edges count).
pub(crate) fn rects_overlap(a: Rect, b: Rect) -> bool {
    a.x0 <= b.x1 && b.x0 <= a.x1 && a.y0 <= b.y1 && b.y0 <= a.y1
}
