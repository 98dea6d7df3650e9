//! The mutable collection of drawable strokes, in z-order.

use crate::stroke::{Stroke, StrokeId};
use kurbo::Rect;
use std::collections::HashMap;

/// Owns every stroke. Array order is z-order (back to front).
#[derive(Debug, Clone)]
pub struct StrokeStore {
    strokes: Vec<Stroke>,
    positions: HashMap<StrokeId, usize>,
    next_timestamp: u64,
}

impl Default for StrokeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StrokeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            strokes: Vec::new(),
            positions: HashMap::new(),
            next_timestamp: 1,
        }
    }

    /// Number of strokes.
    pub fn len(&self) -> usize {
        self.strokes.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    /// Strokes in z-order.
    pub fn iter(&self) -> impl Iterator<Item = &Stroke> {
        self.strokes.iter()
    }

    /// Mutable strokes in z-order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Stroke> {
        self.strokes.iter_mut()
    }

    /// Strokes as a slice in z-order.
    pub fn as_slice(&self) -> &[Stroke] {
        &self.strokes
    }

    /// Z-order position of a stroke.
    pub fn index_of(&self, id: StrokeId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// Get a stroke by ID.
    pub fn get(&self, id: StrokeId) -> Option<&Stroke> {
        self.index_of(id).map(|i| &self.strokes[i])
    }

    /// Get a mutable reference to a stroke by ID.
    pub fn get_mut(&mut self, id: StrokeId) -> Option<&mut Stroke> {
        self.index_of(id).map(move |i| &mut self.strokes[i])
    }

    /// Check whether a stroke exists.
    pub fn contains(&self, id: StrokeId) -> bool {
        self.positions.contains_key(&id)
    }

    /// Next timestamp without consuming it.
    pub fn peek_timestamp(&self) -> u64 {
        self.next_timestamp
    }

    /// Add a new stroke on top, stamping it with a fresh timestamp.
    pub fn add(&mut self, mut stroke: Stroke) -> usize {
        stroke.timestamp = self.next_timestamp;
        self.next_timestamp += 1;
        let index = self.strokes.len();
        self.positions.insert(stroke.id(), index);
        self.strokes.push(stroke);
        index
    }

    /// Insert an existing stroke at a z-order position, keeping its timestamp.
    pub fn insert_at(&mut self, index: usize, stroke: Stroke) -> usize {
        let index = index.min(self.strokes.len());
        self.next_timestamp = self.next_timestamp.max(stroke.timestamp + 1);
        self.strokes.insert(index, stroke);
        self.reindex_from(index);
        index
    }

    /// Remove a stroke, returning its former position and the stroke.
    pub fn remove(&mut self, id: StrokeId) -> Option<(usize, Stroke)> {
        let index = self.positions.remove(&id)?;
        let stroke = self.strokes.remove(index);
        self.reindex_from(index);
        Some((index, stroke))
    }

    /// Remove every stroke, returning them in z-order.
    pub fn clear(&mut self) -> Vec<Stroke> {
        self.positions.clear();
        std::mem::take(&mut self.strokes)
    }

    /// Replace the contents wholesale (z-order preserved).
    pub fn replace_all(&mut self, strokes: Vec<Stroke>) {
        self.strokes = strokes;
        if let Some(max) = self.strokes.iter().map(|s| s.timestamp).max() {
            self.next_timestamp = self.next_timestamp.max(max + 1);
        }
        self.reindex_from(0);
    }

    fn reindex_from(&mut self, start: usize) {
        if start == 0 {
            self.positions.clear();
        }
        for (i, stroke) in self.strokes.iter().enumerate().skip(start) {
            self.positions.insert(stroke.id(), i);
        }
    }

    /// Union of all stroke bboxes.
    pub fn bounds(&self) -> Option<Rect> {
        self.strokes.iter().map(|s| s.bbox()).reduce(|a, b| a.union(b))
    }

    /// Largest absolute coordinate over all bboxes.
    pub fn radius(&self) -> f64 {
        self.strokes
            .iter()
            .map(|s| {
                let b = s.bbox();
                b.x0.abs().max(b.x1.abs()).max(b.y0.abs()).max(b.y1.abs())
            })
            .fold(0.0, f64::max)
    }

    /// IDs of the `n` most recently created strokes, newest first.
    pub fn most_recent(&self, n: usize) -> Vec<StrokeId> {
        let mut by_time: Vec<&Stroke> = self.strokes.iter().collect();
        by_time.sort_unstable_by(|a, b| b.timestamp.cmp(&a.timestamp));
        by_time.into_iter().take(n).map(|s| s.id()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::StrokeStyle;

    fn dot(x: f64) -> Stroke {
        Stroke::path_from_flat(vec![x, 0.0, 1.0], StrokeStyle::default())
    }

    #[test]
    fn test_add_and_lookup() {
        let mut store = StrokeStore::new();
        let a = dot(0.0);
        let id = a.id();
        assert_eq!(store.add(a), 0);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(id).unwrap().timestamp, 1);
    }

    #[test]
    fn test_default_store_starts_timestamps_at_one() {
        let mut store = StrokeStore::default();
        let a = dot(0.0);
        let id = a.id();
        store.add(a);
        assert_eq!(store.get(id).unwrap().timestamp, 1);
    }

    #[test]
    fn test_remove_and_reinsert_keeps_order() {
        let mut store = StrokeStore::new();
        let ids: Vec<_> = (0..4)
            .map(|i| {
                let s = dot(i as f64);
                let id = s.id();
                store.add(s);
                id
            })
            .collect();
        let (index, stroke) = store.remove(ids[1]).unwrap();
        assert_eq!(index, 1);
        assert_eq!(store.index_of(ids[2]), Some(1));
        store.insert_at(index, stroke);
        let order: Vec<_> = store.iter().map(|s| s.id()).collect();
        assert_eq!(order, ids);
        assert_eq!(store.index_of(ids[3]), Some(3));
    }

    #[test]
    fn test_most_recent_newest_first() {
        let mut store = StrokeStore::new();
        let ids: Vec<_> = (0..5)
            .map(|i| {
                let s = dot(i as f64);
                let id = s.id();
                store.add(s);
                id
            })
            .collect();
        assert_eq!(store.most_recent(2), vec![ids[4], ids[3]]);
    }

    #[test]
    fn test_radius_and_bounds() {
        let mut store = StrokeStore::new();
        assert!(store.bounds().is_none());
        store.add(dot(-50.0));
        store.add(dot(20.0));
        assert!((store.radius() - 51.0).abs() < 1e-12);
        let b = store.bounds().unwrap();
        assert!((b.x1 - 21.0).abs() < 1e-12);
    }

    #[test]
    fn test_timestamps_survive_reinsert() {
        let mut store = StrokeStore::new();
        let mut s = dot(0.0);
        s.timestamp = 40;
        store.insert_at(0, s);
        let fresh = dot(1.0);
        let id = fresh.id();
        store.add(fresh);
        assert_eq!(store.get(id).unwrap().timestamp, 41);
    }
}
