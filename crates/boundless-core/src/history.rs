//! Undo/redo log of invertible document mutations.
//!
//! Entries only record domain state. The spatial index is never snapshotted;
//! whoever implements [`HistoryTarget`] keeps it in sync as entries are
//! applied or reverted.

use crate::canvas::Background;
use crate::stroke::{Stroke, StrokeId, StrokeStyle};
use kurbo::Affine;

/// Mutations the history needs from the document.
pub trait HistoryTarget {
    /// Insert a stroke at a z-order position, keeping its timestamp.
    fn insert_stroke(&mut self, index: usize, stroke: Stroke);
    /// Remove a stroke, returning its position and value.
    fn remove_stroke(&mut self, id: StrokeId) -> Option<(usize, Stroke)>;
    /// Replace a stroke (matched by id) with a snapshot.
    fn replace_stroke(&mut self, stroke: Stroke);
    /// Overwrite a stroke's style.
    fn set_stroke_style(&mut self, id: StrokeId, style: StrokeStyle);
    /// Remove every stroke.
    fn take_all_strokes(&mut self) -> Vec<Stroke>;
    /// Replace the whole document with `strokes`.
    fn restore_all_strokes(&mut self, strokes: Vec<Stroke>);
    /// Overwrite the background.
    fn set_background(&mut self, background: Background);
}

/// One undoable action, holding enough state to apply and revert it.
#[derive(Debug, Clone)]
pub enum HistoryEntry {
    Add { index: usize, stroke: Stroke },
    /// Positions ascending.
    AddGroup { strokes: Vec<(usize, Stroke)> },
    Delete { index: usize, stroke: Stroke },
    /// Positions ascending.
    DeleteGroup { strokes: Vec<(usize, Stroke)> },
    Clear { strokes: Vec<Stroke> },
    Transform { before: Vec<Stroke>, after: Vec<Stroke> },
    Style {
        before: Vec<(StrokeId, StrokeStyle)>,
        after: Vec<(StrokeId, StrokeStyle)>,
    },
    Background { before: Background, after: Background },
}

impl HistoryEntry {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            HistoryEntry::Add { .. } => "add",
            HistoryEntry::AddGroup { .. } => "addGroup",
            HistoryEntry::Delete { .. } => "delete",
            HistoryEntry::DeleteGroup { .. } => "deleteGroup",
            HistoryEntry::Clear { .. } => "clear",
            HistoryEntry::Transform { .. } => "transform",
            HistoryEntry::Style { .. } => "style",
            HistoryEntry::Background { .. } => "background",
        }
    }

    /// Re-apply the action (redo).
    pub fn apply(&self, target: &mut dyn HistoryTarget) {
        match self {
            HistoryEntry::Add { index, stroke } => target.insert_stroke(*index, stroke.clone()),
            HistoryEntry::AddGroup { strokes } => {
                for (index, stroke) in strokes {
                    target.insert_stroke(*index, stroke.clone());
                }
            }
            HistoryEntry::Delete { stroke, .. } => {
                target.remove_stroke(stroke.id());
            }
            HistoryEntry::DeleteGroup { strokes } => {
                for (_, stroke) in strokes.iter().rev() {
                    target.remove_stroke(stroke.id());
                }
            }
            HistoryEntry::Clear { .. } => {
                target.take_all_strokes();
            }
            HistoryEntry::Transform { after, .. } => {
                for stroke in after {
                    target.replace_stroke(stroke.clone());
                }
            }
            HistoryEntry::Style { after, .. } => {
                for (id, style) in after {
                    target.set_stroke_style(*id, *style);
                }
            }
            HistoryEntry::Background { after, .. } => target.set_background(after.clone()),
        }
    }

    /// Undo the action.
    pub fn revert(&self, target: &mut dyn HistoryTarget) {
        match self {
            HistoryEntry::Add { stroke, .. } => {
                target.remove_stroke(stroke.id());
            }
            HistoryEntry::AddGroup { strokes } => {
                for (_, stroke) in strokes.iter().rev() {
                    target.remove_stroke(stroke.id());
                }
            }
            HistoryEntry::Delete { index, stroke } => target.insert_stroke(*index, stroke.clone()),
            HistoryEntry::DeleteGroup { strokes } => {
                for (index, stroke) in strokes {
                    target.insert_stroke(*index, stroke.clone());
                }
            }
            HistoryEntry::Clear { strokes } => target.restore_all_strokes(strokes.clone()),
            HistoryEntry::Transform { before, .. } => {
                for stroke in before {
                    target.replace_stroke(stroke.clone());
                }
            }
            HistoryEntry::Style { before, .. } => {
                for (id, style) in before {
                    target.set_stroke_style(*id, *style);
                }
            }
            HistoryEntry::Background { before, .. } => target.set_background(before.clone()),
        }
    }

    /// Move stored geometry along with a bake or world GC.
    fn transform_snapshots(&mut self, affine: Affine) {
        let [a, b, c, d, _, _] = affine.as_coeffs();
        let width_scale = (a * d - b * c).abs().sqrt();
        match self {
            HistoryEntry::Add { stroke, .. } | HistoryEntry::Delete { stroke, .. } => stroke.transform(affine),
            HistoryEntry::AddGroup { strokes } | HistoryEntry::DeleteGroup { strokes } => {
                for (_, stroke) in strokes {
                    stroke.transform(affine);
                }
            }
            HistoryEntry::Clear { strokes } => {
                for stroke in strokes {
                    stroke.transform(affine);
                }
            }
            HistoryEntry::Transform { before, after } => {
                for stroke in before.iter_mut().chain(after.iter_mut()) {
                    stroke.transform(affine);
                }
            }
            HistoryEntry::Style { before, after } => {
                if width_scale.is_finite() {
                    for (_, style) in before.iter_mut().chain(after.iter_mut()) {
                        style.width *= width_scale;
                    }
                }
            }
            HistoryEntry::Background { .. } => {}
        }
    }
}

/// Undo and redo stacks with a depth limit.
#[derive(Debug, Clone)]
pub struct History {
    undo: Vec<HistoryEntry>,
    redo: Vec<HistoryEntry>,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(50)
    }
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Record a forward action. Clears the redo stack.
    pub fn push(&mut self, entry: HistoryEntry) {
        log::debug!("history push: {}", entry.kind());
        self.redo.clear();
        self.undo.push(entry);
        if self.undo.len() > self.limit {
            let excess = self.undo.len() - self.limit;
            self.undo.drain(..excess);
        }
    }

    /// Pop the next entry to undo.
    pub fn pop_undo(&mut self) -> Option<HistoryEntry> {
        self.undo.pop()
    }

    /// Push an entry that was just undone.
    pub fn push_redo(&mut self, entry: HistoryEntry) {
        self.redo.push(entry);
    }

    /// Pop the next entry to redo.
    pub fn pop_redo(&mut self) -> Option<HistoryEntry> {
        self.redo.pop()
    }

    /// Push an entry that was just redone, keeping the redo stack.
    pub fn push_undo_keep_redo(&mut self, entry: HistoryEntry) {
        self.undo.push(entry);
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    /// Apply a coordinate rewrite to every stored snapshot.
    pub fn transform_snapshots(&mut self, affine: Affine) {
        for entry in self.undo.iter_mut().chain(self.redo.iter_mut()) {
            entry.transform_snapshots(affine);
        }
    }
}
