//! Annotation files: a JSON array of
//! `{ obj_id, obj_type, psr: { position, scale, rotation } }` records.

use std::path::Path;

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::FrameViewError;
use crate::oriented_box::{EulerXyz, ObjectType, OrientedBox};

/// `{ x, y, z }` with missing components as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Xyz {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Position, scale and rotation of one object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Psr {
    pub position: Xyz,
    pub scale: Xyz,
    #[serde(default)]
    pub rotation: Xyz,
}

/// Object ids are written either as strings or as numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObjectId {
    Text(String),
    Number(serde_json::Number),
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectId::Text(s) => f.write_str(s),
            ObjectId::Number(n) => write!(f, "{}", n),
        }
    }
}

/// One record of a label file as written on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelRecord {
    #[serde(default)]
    pub obj_id: Option<ObjectId>,
    #[serde(default)]
    pub obj_type: Option<String>,
    #[serde(default)]
    pub psr: Option<Psr>,
}

impl LabelRecord {
    /// Converts to a box, `None` when the record has no `psr`.
    pub fn to_box(&self) -> Option<OrientedBox> {
        let psr = self.psr?;
        let type_name = self.obj_type.clone().unwrap_or_else(|| ObjectType::Unknown.name().to_string());
        let object_id = self.obj_id.as_ref().map(ToString::to_string).unwrap_or_default();

        let mut object = OrientedBox::new(
            object_id,
            ObjectType::from_label(&type_name),
            Point3::new(psr.position.x, psr.position.y, psr.position.z),
            Vector3::new(psr.scale.x, psr.scale.y, psr.scale.z),
            EulerXyz::new(psr.rotation.x, psr.rotation.y, psr.rotation.z),
        );
        object.type_name = type_name;
        Some(object)
    }
}

impl From<&OrientedBox> for LabelRecord {
    fn from(object: &OrientedBox) -> Self {
        let xyz = |x: f64, y: f64, z: f64| Xyz { x, y, z };
        Self {
            obj_id: Some(ObjectId::Text(object.object_id.clone())),
            obj_type: Some(object.type_name.clone()),
            psr: Some(Psr {
                position: xyz(object.position.x, object.position.y, object.position.z),
                scale: xyz(object.scale.x, object.scale.y, object.scale.z),
                rotation: xyz(object.rotation.x, object.rotation.y, object.rotation.z),
            }),
        }
    }
}

/// Parses a label file body.
///
/// The top level must be a JSON array. Records that do not deserialize or
/// have no `psr` are skipped with a warning; the rest still load.
pub fn parse_labels(json: &str) -> Result<Vec<OrientedBox>, FrameViewError> {
    let records: Vec<serde_json::Value> = serde_json::from_str(json)?;
    let total = records.len();

    let mut boxes = Vec::with_capacity(total);
    for (index, value) in records.into_iter().enumerate() {
        let record: LabelRecord = match serde_json::from_value(value) {
            Ok(record) => record,
            Err(e) => {
                warn!(record = index, error = %e, "skipping malformed label record");
                continue;
            }
        };
        match record.to_box() {
            Some(object) => boxes.push(object),
            None => warn!(record = index, "skipping label record without psr"),
        }
    }

    debug!(records = total, boxes = boxes.len(), "labels parsed");
    Ok(boxes)
}

/// Reads and parses a label file.
pub fn load_labels(path: impl AsRef<Path>) -> Result<Vec<OrientedBox>, FrameViewError> {
    let json = std::fs::read_to_string(path)?;
    parse_labels(&json)
}

/// Serializes boxes back into label records.
pub fn to_label_json(boxes: &[OrientedBox]) -> Result<String, FrameViewError> {
    let records: Vec<LabelRecord> = boxes.iter().map(LabelRecord::from).collect();
    Ok(serde_json::to_string_pretty(&records)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SAMPLE: &str = r#"[
        {
            "obj_id": "12",
            "obj_type": "Car",
            "psr": {
                "position": { "x": 10.0, "y": -2.0, "z": 0.8 },
                "scale": { "x": 4.5, "y": 1.9, "z": 1.6 },
                "rotation": { "x": 0.0, "y": 0.0, "z": 1.57 }
            }
        },
        {
            "obj_id": 7,
            "obj_type": "Tricycle",
            "psr": {
                "position": { "x": 3, "y": 4, "z": 0 },
                "scale": { "x": 1, "y": 1, "z": 1 }
            }
        },
        { "obj_id": "99", "obj_type": "Bus" },
        { "obj_id": "5", "obj_type": "Truck", "psr": { "position": "oops" } }
    ]"#;

    #[test]
    fn test_parse_sample() {
        let boxes = parse_labels(SAMPLE).unwrap();
        assert_eq!(boxes.len(), 2);

        let car = &boxes[0];
        assert_eq!(car.object_id, "12");
        assert_eq!(car.object_type, ObjectType::Car);
        assert_relative_eq!(car.position, Point3::new(10.0, -2.0, 0.8));
        assert_relative_eq!(car.scale, Vector3::new(4.5, 1.9, 1.6));
        assert_relative_eq!(car.rotation.z, 1.57);
        assert_eq!(car.label(), "Car 12");
    }

    #[test]
    fn test_numeric_id_and_unknown_type() {
        let boxes = parse_labels(SAMPLE).unwrap();
        let other = &boxes[1];

        assert_eq!(other.object_id, "7");
        assert_eq!(other.object_type, ObjectType::Unknown);
        assert_eq!(other.color(), ObjectType::Unknown.color());
        // Display keeps the name from the file
        assert_eq!(other.label(), "Tricycle 7");
        assert_eq!(other.rotation, EulerXyz::default());
    }

    #[test]
    fn test_not_an_array() {
        assert!(matches!(parse_labels(r#"{"obj_id": 1}"#), Err(FrameViewError::Json(_))));
    }

    #[test]
    fn test_empty_array() {
        assert!(parse_labels("[]").unwrap().is_empty());
    }

    #[test]
    fn test_records_round_trip_through_json() {
        let boxes = parse_labels(SAMPLE).unwrap();
        let json = to_label_json(&boxes).unwrap();
        let again = parse_labels(&json).unwrap();
        assert_eq!(again, boxes);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_labels(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, FrameViewError::Io(_)));
    }
}
