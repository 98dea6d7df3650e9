//! Renderer trait abstraction.

use boundless_core::canvas::Canvas;
use boundless_core::layers::{BuiltinLayers, LayerEvaluator};
use kurbo::{Rect, Size};
use peniko::Color;

static BUILTIN_LAYERS: BuiltinLayers = BuiltinLayers;

/// Context for a single render frame.
pub struct RenderContext<'a> {
    /// The canvas to render.
    pub canvas: &'a Canvas,
    /// Viewport size in physical pixels.
    pub viewport_size: Size,
    /// Device pixel ratio (for HiDPI).
    pub scale_factor: f64,
    /// Selection highlight color.
    pub selection_color: Color,
    /// Selection rectangle (marquee) in world coordinates.
    pub selection_rect: Option<Rect>,
    /// Disable level-of-detail simplification (export, screenshots).
    pub exact: bool,
    /// Continuous pan/zoom is in progress; the snapshot fast path may be used.
    pub navigating: bool,
    /// Animation clock in seconds, passed to the layer evaluator.
    pub time: f64,
    /// Per-stroke animation/style layer evaluator.
    pub evaluator: &'a dyn LayerEvaluator,
}

impl<'a> RenderContext<'a> {
    /// Create a new render context.
    pub fn new(canvas: &'a Canvas, viewport_size: Size) -> Self {
        Self {
            canvas,
            viewport_size,
            scale_factor: 1.0,
            selection_color: Color::from_rgba8(59, 130, 246, 255), // Blue
            selection_rect: None,
            exact: false,
            navigating: false,
            time: 0.0,
            evaluator: &BUILTIN_LAYERS,
        }
    }

    /// Set the scale factor for HiDPI.
    pub fn with_scale_factor(mut self, scale_factor: f64) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    /// Set the selection rectangle.
    pub fn with_selection_rect(mut self, rect: Option<Rect>) -> Self {
        self.selection_rect = rect;
        self
    }

    /// Force full-fidelity geometry.
    pub fn with_exact(mut self, exact: bool) -> Self {
        self.exact = exact;
        self
    }

    /// Mark the frame as part of a continuous navigation gesture.
    pub fn with_navigating(mut self, navigating: bool) -> Self {
        self.navigating = navigating;
        self
    }

    /// Set the animation clock.
    pub fn with_time(mut self, time: f64) -> Self {
        self.time = time;
        self
    }

    /// Use a custom layer evaluator.
    pub fn with_evaluator(mut self, evaluator: &'a dyn LayerEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Device pixel ratio, falling back to 1 when unusable.
    pub fn device_scale(&self) -> f64 {
        if self.scale_factor.is_finite() && self.scale_factor > 0.0 {
            self.scale_factor
        } else {
            1.0
        }
    }

    /// Viewport size in logical pixels.
    pub fn logical_size(&self) -> Size {
        let factor = self.device_scale();
        Size::new(self.viewport_size.width / factor, self.viewport_size.height / factor)
    }
}

/// What a frame drew.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Strokes painted.
    pub visible_count: usize,
    /// Index tiles covered by the visible-set query (0 for a full scan).
    pub tile_count: usize,
    /// The visible set came from the full stroke list rather than the index.
    pub full_scan: bool,
    /// The cached snapshot was replayed instead of painting geometry.
    pub used_snapshot: bool,
    /// The empty-frame safety net repainted everything.
    pub fallback_repaint: bool,
}

/// Trait for rendering backends.
///
/// Implementations can use Vello, wgpu directly, or other rendering engines.
pub trait Renderer: Send + Sync {
    /// Build the scene/command buffer for a frame.
    ///
    /// This method is called once per frame and should prepare all drawing commands.
    fn build_scene(&mut self, ctx: &RenderContext) -> FrameStats;

    /// Get the background color (for clearing).
    fn background_color(&self, ctx: &RenderContext) -> Color {
        ctx.canvas.background().color.into()
    }

    /// Drop any cached frame so the next one repaints from geometry.
    fn invalidate(&mut self) {}
}
