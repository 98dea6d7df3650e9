//! Boundless Core Library
//!
//! Platform-agnostic model for the Boundless infinite canvas: camera and
//! precision management, strokes, the uniform-grid spatial index, history
//! and the [`Canvas`] context that keeps them consistent.

pub mod bake;
pub mod camera;
pub mod canvas;
pub mod config;
pub mod document;
pub mod gc;
pub mod history;
pub mod index;
pub mod layers;
pub mod picking;
pub mod selection;
pub mod store;
pub mod stroke;

pub use bake::{BakeTask, BakeTransform, Budget, FrameBudget, StrokeBudget, Unbounded};
pub use camera::Camera;
pub use canvas::{Background, Canvas, GestureKind, GridStyle, TickReport};
pub use config::{ConfigError, ConfigResult, ViewportConfig};
pub use document::{DocumentError, DocumentRecord, DocumentResult, normalize_points};
pub use gc::GcOutcome;
pub use history::{History, HistoryEntry, HistoryTarget};
pub use index::{Candidates, GridIndex, IndexLimits, IndexRebuilder, RebuildPoll, TileSpan};
pub use layers::{AnimationLayer, BuiltinLayers, LayerEffect, LayerEvaluator};
pub use picking::{Pick, PickParams};
pub use selection::{Handle, HandleKind, Selection};
pub use store::StrokeStore;
pub use stroke::{
    BrushKind, ChunkParams, HitParams, LodParams, PathGeometry, SerializableColor, ShapeGeometry, ShapeKind,
    Stroke, StrokeId, StrokeKind, StrokeMode, StrokeStyle, StylePatch,
};
