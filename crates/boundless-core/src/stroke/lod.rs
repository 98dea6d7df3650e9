//! Level-of-detail simplification for dense paths.

use super::path::POINT_STRIDE;
use super::{Stroke, StrokeKind};
use crate::config::ViewportConfig;
use std::sync::Arc;

/// Quarter-octave steps per doubling of epsilon.
const LOD_STEPS_PER_OCTAVE: f64 = 4.0;

/// Simplification thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LodParams {
    pub min_points: usize,
    pub disable_scale: f64,
    pub pixel_tolerance: f64,
    pub max_ratio: f64,
    pub min_diagonal_eps: f64,
}

impl Default for LodParams {
    fn default() -> Self {
        Self::from(&ViewportConfig::default())
    }
}

impl From<&ViewportConfig> for LodParams {
    fn from(config: &ViewportConfig) -> Self {
        Self {
            min_points: config.lod_min_points,
            disable_scale: config.lod_disable_scale,
            pixel_tolerance: config.lod_pixel_tolerance,
            max_ratio: config.lod_max_ratio,
            min_diagonal_eps: config.lod_min_diagonal_eps,
        }
    }
}

/// Cache key for a world-space epsilon of `pixel_tolerance / camera_scale`.
///
/// Quantized in quarter octaves so small zoom changes reuse the same entry.
pub fn lod_key(pixel_tolerance: f64, camera_scale: f64) -> i32 {
    let eps = pixel_tolerance / camera_scale;
    (eps.log2() * LOD_STEPS_PER_OCTAVE).round() as i32
}

fn key_epsilon(key: i32) -> f64 {
    (f64::from(key) / LOD_STEPS_PER_OCTAVE).exp2()
}

/// Ramer-Douglas-Peucker over a flat `(x, y, pressure)` buffer.
///
/// Iterative, so very long paths cannot overflow the stack. Endpoints are
/// always kept.
pub fn simplify_flat(points: &[f64], epsilon: f64) -> Vec<f64> {
    let keep = simplify_mask(points, epsilon);
    let mut out = Vec::with_capacity(keep.iter().filter(|k| **k).count() * POINT_STRIDE);
    for (i, sample) in points.chunks_exact(POINT_STRIDE).enumerate() {
        if keep[i] {
            out.extend_from_slice(sample);
        }
    }
    out
}

fn simplify_mask(points: &[f64], epsilon: f64) -> Vec<bool> {
    let len = points.len() / POINT_STRIDE;
    let mut keep = vec![false; len];
    if len == 0 {
        return keep;
    }
    keep[0] = true;
    keep[len - 1] = true;
    let at = |i: usize| (points[i * POINT_STRIDE], points[i * POINT_STRIDE + 1]);

    let mut stack = vec![(0usize, len - 1)];
    while let Some((first, last)) = stack.pop() {
        if last <= first + 1 {
            continue;
        }
        let a = at(first);
        let b = at(last);
        let mut max_dist = 0.0;
        let mut max_index = first;
        for i in first + 1..last {
            let dist = perpendicular_distance(at(i), a, b);
            if dist > max_dist {
                max_dist = dist;
                max_index = i;
            }
        }
        if max_dist > epsilon {
            keep[max_index] = true;
            stack.push((first, max_index));
            stack.push((max_index, last));
        }
    }
    keep
}

/// Calculate perpendicular distance from point to line.
fn perpendicular_distance(point: (f64, f64), line_start: (f64, f64), line_end: (f64, f64)) -> f64 {
    let dx = line_end.0 - line_start.0;
    let dy = line_end.1 - line_start.1;

    let line_len_sq = dx * dx + dy * dy;
    if line_len_sq < f64::EPSILON {
        // Line is a point
        let px = point.0 - line_start.0;
        let py = point.1 - line_start.1;
        return (px * px + py * py).sqrt();
    }

    // Area of triangle * 2 / base = height
    let area2 = ((point.0 - line_start.0) * dy - (point.1 - line_start.1) * dx).abs();
    area2 / line_len_sq.sqrt()
}

impl Stroke {
    /// Simplified samples for drawing at `camera_scale`, or `None` to draw the original.
    ///
    /// `exact` forces full fidelity (active gestures, exact render mode).
    pub fn lod_points(&self, camera_scale: f64, params: &LodParams, exact: bool) -> Option<Arc<Vec<f64>>> {
        let StrokeKind::Path(path) = &self.kind else {
            return None;
        };
        if exact || path.len() <= params.min_points || camera_scale >= params.disable_scale {
            return None;
        }
        if !(camera_scale.is_finite() && camera_scale > 0.0) {
            return None;
        }
        let key = lod_key(params.pixel_tolerance, camera_scale);
        let mut epsilon = key_epsilon(key);
        if self.style.width > 0.0 {
            epsilon = epsilon.min(self.style.width / 2.0);
        }
        let diagonal = path.bounds().size().to_vec2().hypot();
        if diagonal < epsilon * params.min_diagonal_eps {
            return None;
        }
        if let Some(cached) = path.cached_lod(key) {
            return cached;
        }
        let simplified = simplify_flat(path.flat(), epsilon);
        let worth_it = (simplified.len() / POINT_STRIDE) as f64 <= path.len() as f64 * params.max_ratio;
        let value = worth_it.then(|| Arc::new(simplified));
        path.store_lod(key, value.clone());
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::StrokeStyle;

    fn wiggle(n: usize) -> Vec<f64> {
        let mut flat = Vec::with_capacity(n * POINT_STRIDE);
        for i in 0..n {
            let x = i as f64;
            flat.extend_from_slice(&[x, (x * 0.37).sin() * 3.0 + (x * 0.011).cos() * 40.0, 1.0]);
        }
        flat
    }

    #[test]
    fn test_simplify_never_grows() {
        let flat = wiggle(400);
        for eps in [0.01, 0.1, 1.0, 10.0, 100.0] {
            assert!(simplify_flat(&flat, eps).len() <= flat.len());
        }
    }

    #[test]
    fn test_smaller_epsilon_keeps_superset() {
        let flat = wiggle(600);
        let mut previous: Option<Vec<bool>> = None;
        for eps in [50.0, 10.0, 2.0, 0.5, 0.05] {
            let mask = simplify_mask(&flat, eps);
            if let Some(coarse) = &previous {
                for (i, kept) in coarse.iter().enumerate() {
                    assert!(!kept || mask[i], "point {i} dropped at eps {eps}");
                }
            }
            previous = Some(mask);
        }
    }

    #[test]
    fn test_collinear_collapses_to_endpoints() {
        let flat: Vec<f64> = (0..10).flat_map(|i| [i as f64, 0.0, 1.0]).collect();
        let out = simplify_flat(&flat, 0.1);
        assert_eq!(out, vec![0.0, 0.0, 1.0, 9.0, 0.0, 1.0]);
    }

    #[test]
    fn test_lod_key_stable_under_small_zoom() {
        assert_eq!(lod_key(0.5, 0.5), lod_key(0.5, 0.51));
        assert_ne!(lod_key(0.5, 0.5), lod_key(0.5, 0.25));
    }

    #[test]
    fn test_lod_points_thresholds() {
        let params = LodParams::default();
        let stroke = Stroke::path_from_flat(
            wiggle(2000),
            StrokeStyle {
                width: 8.0,
                ..StrokeStyle::default()
            },
        );
        let simplified = stroke.lod_points(0.05, &params, false).expect("dense path simplifies");
        assert!(simplified.len() < stroke.as_path().unwrap().flat().len());
        // Served from cache on the second call
        let again = stroke.lod_points(0.05, &params, false).unwrap();
        assert!(Arc::ptr_eq(&simplified, &again));

        assert!(stroke.lod_points(0.05, &params, true).is_none());
        assert!(stroke.lod_points(2.0, &params, false).is_none());

        let short = Stroke::path_from_flat(wiggle(50), StrokeStyle::default());
        assert!(short.lod_points(0.05, &params, false).is_none());
    }
}
