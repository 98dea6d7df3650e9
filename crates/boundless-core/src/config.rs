//! Tunable constants for the viewport, index and renderer.
//!
//! All thresholds here are empirical. Only their ordering matters, which
//! [`ViewportConfig::validate`] checks.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Every tunable used by the camera, spatial index, bake, world GC, LOD and picking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    /// Hard lower clamp for camera scale.
    pub min_scale: f64,
    /// Hard upper clamp for camera scale.
    pub max_scale: f64,

    /// Renormalize when scale drops below this.
    pub renorm_min_scale: f64,
    /// Renormalize when scale exceeds this.
    pub renorm_max_scale: f64,
    /// Renormalize when |tx| or |ty| exceeds this.
    pub renorm_max_translation: f64,
    /// Bake time budget per frame, in milliseconds.
    pub bake_budget_ms: f64,
    /// Lower bound for the bake budget.
    pub bake_min_budget_ms: f64,

    /// Recenter when the world point under the screen center exceeds this.
    pub gc_recenter_limit: f64,
    /// Recenter shifts are rounded to multiples of this.
    pub gc_recenter_quantum: f64,
    /// Rescale when the document radius exceeds this.
    pub gc_radius_limit: f64,
    /// Rescale divides the document radius down to roughly this.
    pub gc_radius_target: f64,

    /// Bboxes with any coordinate beyond this are never indexed.
    pub index_world_ceiling: f64,
    /// Maximum tile span along one axis for a single stroke.
    pub index_max_span: i64,
    /// Maximum tile count for a single stroke.
    pub index_max_tiles_per_stroke: i64,
    /// Queries covering more tiles than this fall back to a full scan.
    pub index_query_cap: i64,
    /// Initial grid cell size in world units.
    pub index_initial_cell: f64,
    /// Smallest adaptive cell size.
    pub cell_min: f64,
    /// Largest adaptive cell size.
    pub cell_max: f64,
    /// Cell size target is the visible width divided by this.
    pub cell_divisor: f64,
    /// Relative cell change that forces a rebuild.
    pub cell_retune_threshold: f64,
    /// Rebuild the index on a worker thread instead of inline.
    pub threaded_rebuild: bool,

    /// Segments per path chunk.
    pub chunk_segments: usize,
    /// Paths with fewer segments are never chunked.
    pub chunk_min_segments: usize,

    /// Paths with more points than this are candidates for simplification.
    pub lod_min_points: usize,
    /// Simplification is disabled at or above this camera scale.
    pub lod_disable_scale: f64,
    /// On-screen simplification tolerance, in pixels.
    pub lod_pixel_tolerance: f64,
    /// Simplified output must be at most this fraction of the original.
    pub lod_max_ratio: f64,
    /// Skip simplification when the bbox diagonal is below this many epsilons.
    pub lod_min_diagonal_eps: f64,

    /// Screen-space pick radius in pixels.
    pub pick_radius_px: f64,
    /// Base number of recent strokes probed when the index finds nothing.
    pub pick_fallback_base: usize,

    /// Maximum number of undo entries.
    pub history_limit: usize,

    /// Fraction of the viewport added around the visible rect before querying.
    pub view_padding: f64,
    /// Continuous navigation ends after this much idle time, in milliseconds.
    pub navigation_idle_ms: u64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            min_scale: 1e-6,
            max_scale: 1e6,
            renorm_min_scale: 1e-3,
            renorm_max_scale: 8e2,
            renorm_max_translation: 1e8,
            bake_budget_ms: 4.0,
            bake_min_budget_ms: 2.0,
            gc_recenter_limit: 1e8,
            gc_recenter_quantum: 2048.0,
            gc_radius_limit: 1e12,
            gc_radius_target: 1e7,
            index_world_ceiling: 1e12,
            index_max_span: 2048,
            index_max_tiles_per_stroke: 65_536,
            index_query_cap: 16_384,
            index_initial_cell: 512.0,
            cell_min: 128.0,
            cell_max: 4096.0,
            cell_divisor: 40.0,
            cell_retune_threshold: 0.25,
            threaded_rebuild: false,
            chunk_segments: 48,
            chunk_min_segments: 96,
            lod_min_points: 128,
            lod_disable_scale: 1.25,
            lod_pixel_tolerance: 0.5,
            lod_max_ratio: 0.95,
            lod_min_diagonal_eps: 4.0,
            pick_radius_px: 6.0,
            pick_fallback_base: 32,
            history_limit: 50,
            view_padding: 0.1,
            navigation_idle_ms: 150,
        }
    }
}

impl ViewportConfig {
    /// Parse a (possibly partial) JSON object; missing fields take defaults.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Effective bake budget in milliseconds (never below the floor).
    pub fn bake_budget(&self) -> f64 {
        self.bake_budget_ms.max(self.bake_min_budget_ms)
    }

    /// Check the orderings the algorithms rely on.
    pub fn validate(&self) -> ConfigResult<()> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid { field, reason: reason.into() }
        }

        let positive = [
            ("min_scale", self.min_scale),
            ("renorm_min_scale", self.renorm_min_scale),
            ("renorm_max_translation", self.renorm_max_translation),
            ("bake_min_budget_ms", self.bake_min_budget_ms),
            ("gc_recenter_limit", self.gc_recenter_limit),
            ("gc_recenter_quantum", self.gc_recenter_quantum),
            ("gc_radius_target", self.gc_radius_target),
            ("index_world_ceiling", self.index_world_ceiling),
            ("index_initial_cell", self.index_initial_cell),
            ("cell_min", self.cell_min),
            ("cell_divisor", self.cell_divisor),
            ("lod_pixel_tolerance", self.lod_pixel_tolerance),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(field, format!("must be finite and positive, got {value}")));
            }
        }
        if self.min_scale >= self.max_scale {
            return Err(invalid("max_scale", "must exceed min_scale"));
        }
        if !(self.min_scale <= self.renorm_min_scale
            && self.renorm_min_scale < 1.0
            && 1.0 < self.renorm_max_scale
            && self.renorm_max_scale <= self.max_scale)
        {
            return Err(invalid(
                "renorm_max_scale",
                "renormalization range must contain 1 and lie within the zoom clamp",
            ));
        }
        if self.bake_min_budget_ms > self.bake_budget_ms {
            return Err(invalid("bake_min_budget_ms", "must not exceed bake_budget_ms"));
        }
        if self.gc_radius_target * 2.0 > self.gc_radius_limit {
            return Err(invalid("gc_radius_target", "must be well below gc_radius_limit"));
        }
        if self.cell_min > self.cell_max {
            return Err(invalid("cell_max", "must be at least cell_min"));
        }
        if self.index_max_span <= 0 || self.index_max_tiles_per_stroke <= 0 || self.index_query_cap <= 0 {
            return Err(invalid("index_query_cap", "tile caps must be positive"));
        }
        if self.chunk_segments < 2 {
            return Err(invalid("chunk_segments", "must be at least 2"));
        }
        if !(self.lod_max_ratio > 0.0 && self.lod_max_ratio <= 1.0) {
            return Err(invalid("lod_max_ratio", "must lie in (0, 1]"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ViewportConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ViewportConfig::from_json(r#"{ "bake_budget_ms": 8.0 }"#).unwrap();
        assert!((config.bake_budget_ms - 8.0).abs() < f64::EPSILON);
        assert!((config.renorm_max_scale - 8e2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_budget_floor() {
        let config = ViewportConfig {
            bake_budget_ms: 1.0,
            bake_min_budget_ms: 2.0,
            ..ViewportConfig::default()
        };
        assert!((config.bake_budget() - 2.0).abs() < f64::EPSILON);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_gc_ordering_rejected() {
        let err = ViewportConfig::from_json(r#"{ "gc_radius_target": 1e12 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "gc_radius_target", .. }));
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            ViewportConfig::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
