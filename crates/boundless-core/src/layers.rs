//! Per-stroke animation and style layers.

use crate::stroke::{SerializableColor, Stroke};
use kurbo::{Affine, Point};
use serde::{Deserialize, Serialize};

/// An animation or style effect attached to a stroke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "layer", rename_all = "snake_case")]
pub enum AnimationLayer {
    /// Continuous rotation about a pivot (bbox center when unset).
    Spin {
        #[serde(default)]
        pivot: Option<Point>,
        degrees_per_second: f64,
    },
    /// Alpha oscillating between `min_alpha` and 1.
    Pulse { period_seconds: f64, min_alpha: f64 },
    /// Replace the stroke color.
    Tint { color: SerializableColor },
}

impl AnimationLayer {
    /// Move a stored pivot along with the stroke's geometry.
    pub fn transform_pivot(&mut self, affine: Affine) {
        if let AnimationLayer::Spin { pivot: Some(p), .. } = self {
            *p = affine * *p;
        }
    }
}

/// Combined effect of a stroke's layers at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerEffect {
    /// Applied in the stroke's own coordinate space, before the camera.
    pub transform: Affine,
    /// Multiplies the stroke alpha.
    pub alpha: f64,
    /// Overrides the stroke color.
    pub color: Option<SerializableColor>,
}

impl Default for LayerEffect {
    fn default() -> Self {
        Self {
            transform: Affine::IDENTITY,
            alpha: 1.0,
            color: None,
        }
    }
}

impl LayerEffect {
    /// Whether the effect changes nothing.
    pub fn is_identity(&self) -> bool {
        self.transform == Affine::IDENTITY && self.alpha == 1.0 && self.color.is_none()
    }
}

/// Evaluates layers; must be a pure function of `(stroke, time)`.
pub trait LayerEvaluator {
    fn evaluate(&self, stroke: &Stroke, time: f64) -> LayerEffect;
}

/// Evaluator for the built-in [`AnimationLayer`] kinds.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinLayers;

impl LayerEvaluator for BuiltinLayers {
    fn evaluate(&self, stroke: &Stroke, time: f64) -> LayerEffect {
        let mut effect = LayerEffect::default();
        for layer in &stroke.layers {
            match layer {
                AnimationLayer::Spin {
                    pivot,
                    degrees_per_second,
                } => {
                    let center = pivot.unwrap_or_else(|| stroke.bbox().center());
                    let angle = (degrees_per_second * time).to_radians();
                    effect.transform = Affine::rotate_about(angle, center) * effect.transform;
                }
                AnimationLayer::Pulse {
                    period_seconds,
                    min_alpha,
                } => {
                    if *period_seconds > 0.0 {
                        let phase = (time / period_seconds * std::f64::consts::TAU).cos() * 0.5 + 0.5;
                        let min = min_alpha.clamp(0.0, 1.0);
                        effect.alpha *= min + (1.0 - min) * phase;
                    }
                }
                AnimationLayer::Tint { color } => effect.color = Some(*color),
            }
        }
        effect
    }
}
