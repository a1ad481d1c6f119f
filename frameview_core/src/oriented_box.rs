//! Annotated 3D objects as oriented bounding boxes.
//!
//! Corner order is fixed and indexed positionally by [`BOX_EDGES`]. Corner
//! `i` takes the sign of each half extent from the bits of `i`
//! (x = bit 2, y = bit 1, z = bit 0, set bit = `+`):
//!
//! ```text
//!  0 (-,-,-)   1 (-,-,+)   2 (-,+,-)   3 (-,+,+)
//!  4 (+,-,-)   5 (+,-,+)   6 (+,+,-)   7 (+,+,+)
//! ```
//!
//! The twelve edges are the four `y = -` edges (0-1, 1-5, 5-4, 4-0), the four
//! `y = +` edges (2-3, 3-7, 7-6, 6-2) and the four edges joining them
//! (0-2, 1-3, 5-7, 4-6).

use nalgebra::{Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::color::Rgb;

/// Corner index pairs of the 12 box edges.
pub const BOX_EDGES: [(usize, usize); 12] = [
    // bottom
    (0, 1),
    (1, 5),
    (5, 4),
    (4, 0),
    // top
    (2, 3),
    (3, 7),
    (7, 6),
    (6, 2),
    // vertical
    (0, 2),
    (1, 3),
    (5, 7),
    (4, 6),
];

/// Annotation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    Car,
    Bus,
    Truck,
    Pedestrian,
    Rider,
    Motor,
    Unknown,
}

impl ObjectType {
    /// Every known class, `Unknown` last.
    pub const ALL: [ObjectType; 7] = [
        ObjectType::Car,
        ObjectType::Bus,
        ObjectType::Truck,
        ObjectType::Pedestrian,
        ObjectType::Rider,
        ObjectType::Motor,
        ObjectType::Unknown,
    ];

    /// Overlay color for this class.
    pub const fn color(&self) -> Rgb {
        match self {
            ObjectType::Car => Rgb::from_hex(0x2ca02c),        // green
            ObjectType::Bus => Rgb::from_hex(0xff7f0e),        // orange
            ObjectType::Truck => Rgb::from_hex(0xd62728),      // red
            ObjectType::Pedestrian => Rgb::from_hex(0x1f77b4), // blue
            ObjectType::Rider => Rgb::from_hex(0x9467bd),      // purple
            ObjectType::Motor => Rgb::from_hex(0x8c564b),      // brown
            ObjectType::Unknown => Rgb::from_hex(0xe377c2),    // pink
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            ObjectType::Car => "Car",
            ObjectType::Bus => "Bus",
            ObjectType::Truck => "Truck",
            ObjectType::Pedestrian => "Pedestrian",
            ObjectType::Rider => "Rider",
            ObjectType::Motor => "Motor",
            ObjectType::Unknown => "Unknown",
        }
    }

    /// Maps a label name to its class. Unrecognized names are `Unknown`.
    pub fn from_label(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|t| *t != ObjectType::Unknown && t.name() == name)
            .unwrap_or(ObjectType::Unknown)
    }
}

impl FromStr for ObjectType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_label(s))
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Euler angles in radians, applied in XYZ order: `R = Rx(x) · Ry(y) · Rz(z)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EulerXyz {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl EulerXyz {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn rotation(&self) -> Rotation3<f64> {
        Rotation3::from_axis_angle(&Vector3::x_axis(), self.x)
            * Rotation3::from_axis_angle(&Vector3::y_axis(), self.y)
            * Rotation3::from_axis_angle(&Vector3::z_axis(), self.z)
    }
}

/// One annotated object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrientedBox {
    pub object_id: String,
    pub object_type: ObjectType,
    /// Class name as written in the label file, kept for display
    pub type_name: String,
    /// Box center in the sensor frame
    pub position: Point3<f64>,
    /// Full extents along the local axes (not half extents)
    pub scale: Vector3<f64>,
    pub rotation: EulerXyz,
}

impl OrientedBox {
    pub fn new(
        object_id: impl Into<String>,
        object_type: ObjectType,
        position: Point3<f64>,
        scale: Vector3<f64>,
        rotation: EulerXyz,
    ) -> Self {
        Self {
            object_id: object_id.into(),
            object_type,
            type_name: object_type.name().to_string(),
            position,
            scale,
            rotation,
        }
    }

    /// The 8 corners in the sensor frame, in the order documented on the module.
    pub fn corners(&self) -> [Point3<f64>; 8] {
        let half = self.scale / 2.0;
        let rotation = self.rotation.rotation();

        std::array::from_fn(|i| {
            let sign = |bit: usize| if i & bit != 0 { 1.0 } else { -1.0 };
            let local = Vector3::new(sign(4) * half.x, sign(2) * half.y, sign(1) * half.z);
            self.position + rotation * local
        })
    }

    pub fn color(&self) -> Rgb {
        self.object_type.color()
    }

    /// Text drawn next to the box, e.g. `"Car 12"`.
    pub fn label(&self) -> String {
        format!("{} {}", self.type_name, self.object_id)
    }

    /// Corner coordinates are all finite.
    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|v| v.is_finite())
            && self.scale.iter().all(|v| v.is_finite())
            && [self.rotation.x, self.rotation.y, self.rotation.z].iter().all(|v| v.is_finite())
    }
}
