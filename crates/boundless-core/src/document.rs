//! Persistence boundary: the document record and legacy point normalization.

use crate::camera::Camera;
use crate::canvas::Background;
use crate::stroke::{Stroke, POINT_STRIDE};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Current record format version.
pub const DOCUMENT_VERSION: u32 = 1;

/// Pressure assumed for legacy samples that carry none.
const DEFAULT_PRESSURE: f64 = 1.0;

/// Document loading errors.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Malformed points in stroke {index}: {reason}")]
    Points { index: usize, reason: String },
    #[error("Unsupported document version {0}")]
    Version(u32),
}

/// Result type for document operations.
pub type DocumentResult<T> = Result<T, DocumentError>;

fn default_version() -> u32 {
    DOCUMENT_VERSION
}

/// Strokes, camera and background as persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentRecord {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub camera: Camera,
    #[serde(default)]
    pub background: Background,
    #[serde(default)]
    pub strokes: Vec<Stroke>,
}

impl DocumentRecord {
    /// Serialize to JSON.
    pub fn to_json(&self) -> DocumentResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a record, normalizing legacy point encodings first.
    pub fn from_json(json: &str) -> DocumentResult<Self> {
        let mut value: Value = serde_json::from_str(json)?;
        if let Some(version) = value.get("version").and_then(Value::as_u64) {
            if version > u64::from(DOCUMENT_VERSION) {
                return Err(DocumentError::Version(version as u32));
            }
        }
        if let Some(strokes) = value.get_mut("strokes").and_then(Value::as_array_mut) {
            for (index, stroke) in strokes.iter_mut().enumerate() {
                normalize_stroke(stroke).map_err(|reason| DocumentError::Points { index, reason })?;
            }
        }
        let mut record: Self = serde_json::from_value(value)?;
        record.version = DOCUMENT_VERSION;
        Ok(record)
    }
}

fn normalize_stroke(stroke: &mut Value) -> Result<(), String> {
    let Some(kind) = stroke.get_mut("kind").and_then(Value::as_object_mut) else {
        return Ok(());
    };
    if kind.get("type").and_then(Value::as_str) != Some("path") {
        return Ok(());
    }
    let stride = match kind.remove("stride") {
        Some(v) => v.as_u64().ok_or("stride must be an integer")? as usize,
        None => POINT_STRIDE,
    };
    let Some(points) = kind.get("points") else {
        kind.insert("points".into(), Value::Array(Vec::new()));
        return Ok(());
    };
    let flat = normalize_points(points, stride)?;
    kind.insert(
        "points".into(),
        Value::Array(flat.into_iter().map(Value::from).collect()),
    );
    Ok(())
}

/// Coerce any known point encoding into the canonical flat `(x, y, pressure)` buffer.
///
/// Accepted: a flat number array with the given `stride` (2 or 3), an array of
/// `[x, y]` / `[x, y, p]` tuples, or an array of `{x, y, p|pressure}` objects.
pub fn normalize_points(points: &Value, stride: usize) -> Result<Vec<f64>, String> {
    let items = points.as_array().ok_or("points must be an array")?;
    let Some(first) = items.first() else {
        return Ok(Vec::new());
    };
    let mut flat = Vec::with_capacity(items.len() * POINT_STRIDE);
    match first {
        Value::Number(_) => {
            if stride != 2 && stride != 3 {
                return Err(format!("unsupported stride {stride}"));
            }
            if items.len() % stride != 0 {
                return Err(format!("{} values is not a multiple of {stride}", items.len()));
            }
            let nums = items
                .iter()
                .map(|v| v.as_f64().ok_or("non-numeric value in flat buffer"))
                .collect::<Result<Vec<_>, _>>()?;
            for sample in nums.chunks_exact(stride) {
                let pressure = sample.get(2).copied().unwrap_or(DEFAULT_PRESSURE);
                flat.extend_from_slice(&[sample[0], sample[1], pressure]);
            }
        }
        Value::Array(_) => {
            for (i, item) in items.iter().enumerate() {
                let tuple = item.as_array().ok_or_else(|| format!("point {i} is not a tuple"))?;
                let num = |k: usize| tuple.get(k).and_then(Value::as_f64);
                let (Some(x), Some(y)) = (num(0), num(1)) else {
                    return Err(format!("point {i} needs x and y"));
                };
                flat.extend_from_slice(&[x, y, num(2).unwrap_or(DEFAULT_PRESSURE)]);
            }
        }
        Value::Object(_) => {
            for (i, item) in items.iter().enumerate() {
                let obj = item.as_object().ok_or_else(|| format!("point {i} is not an object"))?;
                let (Some(x), Some(y)) = (field(obj, &["x"]), field(obj, &["y"])) else {
                    return Err(format!("point {i} needs x and y"));
                };
                let p = field(obj, &["p", "pressure"]).unwrap_or(DEFAULT_PRESSURE);
                flat.extend_from_slice(&[x, y, p]);
            }
        }
        _ => return Err("unrecognised point encoding".into()),
    }
    Ok(flat)
}

fn field(obj: &Map<String, Value>, names: &[&str]) -> Option<f64> {
    names.iter().find_map(|n| obj.get(*n).and_then(Value::as_f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::StrokeStyle;
    use serde_json::json;

    #[test]
    fn test_flat_triples_pass_through() {
        let flat = normalize_points(&json!([1.0, 2.0, 0.5, 3.0, 4.0, 0.25]), 3).unwrap();
        assert_eq!(flat, vec![1.0, 2.0, 0.5, 3.0, 4.0, 0.25]);
    }

    #[test]
    fn test_flat_pairs_gain_pressure() {
        let flat = normalize_points(&json!([1, 2, 3, 4]), 2).unwrap();
        assert_eq!(flat, vec![1.0, 2.0, 1.0, 3.0, 4.0, 1.0]);
    }

    #[test]
    fn test_objects_and_tuples() {
        let flat = normalize_points(&json!([{"x": 1, "y": 2, "pressure": 0.3}, {"x": 5, "y": 6}]), 3).unwrap();
        assert_eq!(flat, vec![1.0, 2.0, 0.3, 5.0, 6.0, 1.0]);
        let flat = normalize_points(&json!([[1, 2], [3, 4, 0.5]]), 3).unwrap();
        assert_eq!(flat, vec![1.0, 2.0, 1.0, 3.0, 4.0, 0.5]);
    }

    #[test]
    fn test_bad_length_rejected() {
        assert!(normalize_points(&json!([1, 2, 3, 4]), 3).is_err());
        assert!(normalize_points(&json!(["a"]), 3).is_err());
    }

    #[test]
    fn test_record_round_trip() {
        let mut record = DocumentRecord::default();
        record.camera.scale = 2.5;
        record
            .strokes
            .push(Stroke::path_from_flat(vec![1.0, 2.0, 0.5, 3.0, 4.0, 1.0], StrokeStyle::default()));
        let json = record.to_json().unwrap();
        let back = DocumentRecord::from_json(&json).unwrap();
        assert_eq!(back.camera.scale, 2.5);
        assert_eq!(back.strokes[0].id(), record.strokes[0].id());
        assert_eq!(back.strokes[0].as_path(), record.strokes[0].as_path());
    }

    #[test]
    fn test_legacy_record_normalized() {
        let id = uuid::Uuid::new_v4();
        let json = json!({
            "camera": {"scale": 1.0, "tx": 0.0, "ty": 0.0},
            "strokes": [{
                "id": id,
                "style": {"color": {"r": 0, "g": 0, "b": 0, "a": 255}, "alpha": 1.0, "width": 2.0},
                "timestamp": 3,
                "kind": {"type": "path", "stride": 2, "points": [0, 0, 10, 10]}
            }]
        })
        .to_string();
        let record = DocumentRecord::from_json(&json).unwrap();
        assert_eq!(record.strokes[0].as_path().unwrap().flat(), &[0.0, 0.0, 1.0, 10.0, 10.0, 1.0]);
    }

    #[test]
    fn test_future_version_rejected() {
        let json = json!({"version": 99, "strokes": []}).to_string();
        assert!(matches!(DocumentRecord::from_json(&json), Err(DocumentError::Version(99))));
    }
}
