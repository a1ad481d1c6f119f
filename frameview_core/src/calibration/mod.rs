//! Camera calibration records and the parser for `cameras.cfg` text.
//!
//! Each `config { ... }` block describes one camera: image size, pinhole
//! intrinsics, optional distortion, and the camera pose expressed in the
//! LiDAR (sensor) frame. Projection needs the opposite mapping, sensor frame
//! into camera frame, so the inverse pose is computed once here and cached
//! on the record.

pub mod text;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use nalgebra::{Isometry3, Matrix4, Point3, Quaternion, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::FrameViewError;
use text::{find_block, find_value, Field};

pub use text::ParseError;

/// Projection model assumed when `model_type` is absent.
pub const DEFAULT_MODEL: &str = "PINHOLE";

// ============================================================================
// RECORDS
// ============================================================================

/// Pinhole intrinsics at the calibration resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Calibration image width in pixels
    pub width: u32,
    /// Calibration image height in pixels
    pub height: u32,
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    /// `[k1, k2, k3, k4]`, parsed but never applied by projection
    pub distortion: [f64; 4],
    /// Camera model name from the config (`PINHOLE` by default)
    pub model: String,
}

impl CameraIntrinsics {
    /// Distortion-free pinhole intrinsics.
    pub fn pinhole(width: u32, height: u32, fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            width,
            height,
            fx,
            fy,
            cx,
            cy,
            distortion: [0.0; 4],
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Checks `width > 0, height > 0, fx > 0, fy > 0` and finiteness.
    pub fn validate(&self) -> Vec<FieldIssue> {
        let mut issues = Vec::new();
        if self.width == 0 {
            issues.push(FieldIssue::invalid("img_width", "must be positive"));
        }
        if self.height == 0 {
            issues.push(FieldIssue::invalid("img_height", "must be positive"));
        }
        for (name, value) in [("f_x", self.fx), ("f_y", self.fy)] {
            if !(value.is_finite() && value > 0.0) {
                issues.push(FieldIssue::invalid(name, "must be a positive number"));
            }
        }
        for (name, value) in [("o_x", self.cx), ("o_y", self.cy)] {
            if !value.is_finite() {
                issues.push(FieldIssue::invalid(name, "must be finite"));
            }
        }
        issues
    }
}

/// Camera pose in the sensor frame plus its cached inverse.
///
/// `pose()` is `M = T(position) · R(orientation)` as written in the config:
/// it carries camera-frame coordinates into the sensor frame.
/// `to_camera()` is `M⁻¹`, the mapping every projection uses.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraExtrinsics {
    position: Vector3<f64>,
    orientation: UnitQuaternion<f64>,
    pose: Isometry3<f64>,
    to_camera: Isometry3<f64>,
}

impl CameraExtrinsics {
    /// Builds the pose from a position and a (not necessarily normalized)
    /// quaternion. Returns `None` for non-finite input or a zero quaternion.
    pub fn new(position: Vector3<f64>, orientation: Quaternion<f64>) -> Option<Self> {
        if !position.iter().all(|v| v.is_finite()) || !orientation.coords.iter().all(|v| v.is_finite()) {
            return None;
        }
        if orientation.norm() < 1e-12 {
            return None;
        }

        let orientation = UnitQuaternion::from_quaternion(orientation);
        let pose = Isometry3::from_parts(Translation3::from(position), orientation);
        let to_camera = pose.inverse();

        Some(Self {
            position,
            orientation,
            pose,
            to_camera,
        })
    }

    /// Camera at the sensor origin looking down the sensor's +Z axis.
    pub fn identity() -> Self {
        let pose = Isometry3::identity();
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            pose,
            to_camera: pose,
        }
    }

    /// Parsed position of the camera in the sensor frame.
    pub fn position(&self) -> &Vector3<f64> {
        &self.position
    }

    /// Parsed orientation, normalized.
    pub fn orientation(&self) -> &UnitQuaternion<f64> {
        &self.orientation
    }

    /// `M`: camera frame → sensor frame.
    pub fn pose(&self) -> &Isometry3<f64> {
        &self.pose
    }

    /// `M⁻¹`: sensor frame → camera frame.
    pub fn to_camera(&self) -> &Isometry3<f64> {
        &self.to_camera
    }

    /// `M` as a homogeneous matrix.
    pub fn matrix(&self) -> Matrix4<f64> {
        self.pose.to_homogeneous()
    }

    /// `M⁻¹` as a homogeneous matrix.
    pub fn inverse_matrix(&self) -> Matrix4<f64> {
        self.to_camera.to_homogeneous()
    }

    /// Maps a sensor-frame point into the camera frame.
    #[inline]
    pub fn sensor_to_camera_point(&self, point: &Point3<f64>) -> Point3<f64> {
        self.to_camera.transform_point(point)
    }

    /// Maps a camera-frame point back into the sensor frame.
    #[inline]
    pub fn camera_to_sensor_point(&self, point: &Point3<f64>) -> Point3<f64> {
        self.pose.transform_point(point)
    }
}

/// Everything known about one camera.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraCalibration {
    pub id: String,
    pub intrinsics: CameraIntrinsics,
    pub extrinsics: CameraExtrinsics,
    /// Mounting angle error `[x, y, z]` in radians; informational only
    pub install_angle_error: Vector3<f64>,
}

impl CameraCalibration {
    /// Creates a calibration after validating the intrinsics.
    pub fn new(
        id: impl Into<String>,
        intrinsics: CameraIntrinsics,
        extrinsics: CameraExtrinsics,
    ) -> Result<Self, BlockError> {
        let id = id.into();
        let issues = intrinsics.validate();
        if !issues.is_empty() {
            return Err(BlockError {
                index: 0,
                line: 0,
                camera_id: Some(id),
                issues,
            });
        }

        Ok(Self {
            id,
            intrinsics,
            extrinsics,
            install_angle_error: Vector3::zeros(),
        })
    }
}

// ============================================================================
// BLOCK ERRORS
// ============================================================================

/// What is wrong with one field of a config block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldIssue {
    /// Required field is absent
    Missing(String),
    /// Field is present but unusable
    Invalid { field: String, reason: String },
}

impl FieldIssue {
    fn missing(field: impl Into<String>) -> Self {
        Self::Missing(field.into())
    }

    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Name of the field concerned.
    pub fn field(&self) -> &str {
        match self {
            Self::Missing(field) | Self::Invalid { field, .. } => field,
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(field) => write!(f, "missing {}", field),
            Self::Invalid { field, reason } => write!(f, "{} {}", field, reason),
        }
    }
}

/// A config block that was skipped. Never fatal for the rest of the file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("config block #{index} (line {line}, camera {}): {}", .camera_id.as_deref().unwrap_or("?"), join_issues(.issues))]
pub struct BlockError {
    /// Position of the block among the `config` blocks, from 0
    pub index: usize,
    /// Line where the block starts
    pub line: usize,
    /// `camera_dev`, when it could be read
    pub camera_id: Option<String>,
    pub issues: Vec<FieldIssue>,
}

impl BlockError {
    /// Names of the required fields that were absent.
    pub fn missing_fields(&self) -> Vec<&str> {
        self.issues
            .iter()
            .filter_map(|issue| match issue {
                FieldIssue::Missing(field) => Some(field.as_str()),
                FieldIssue::Invalid { .. } => None,
            })
            .collect()
    }
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

// ============================================================================
// CALIBRATION SET
// ============================================================================

/// All cameras of one frame, keyed by camera id.
///
/// Rebuilt from scratch on every frame load; never patched in place.
#[derive(Debug, Clone, Default)]
pub struct CalibrationSet {
    cameras: BTreeMap<String, CameraCalibration>,
    rejected: Vec<BlockError>,
}

impl CalibrationSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `cameras.cfg` text. See [`parse`].
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        parse(text)
    }

    /// Reads and parses a calibration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FrameViewError> {
        let text = std::fs::read_to_string(path)?;
        Ok(parse(&text)?)
    }

    /// Adds or replaces a camera. Returns the replaced record.
    pub fn insert(&mut self, calibration: CameraCalibration) -> Option<CameraCalibration> {
        self.cameras.insert(calibration.id.clone(), calibration)
    }

    pub fn get(&self, camera_id: &str) -> Option<&CameraCalibration> {
        self.cameras.get(camera_id)
    }

    pub fn contains(&self, camera_id: &str) -> bool {
        self.cameras.contains_key(camera_id)
    }

    /// Camera ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.cameras.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CameraCalibration> {
        self.cameras.values()
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    /// Blocks that were skipped while parsing.
    pub fn rejected(&self) -> &[BlockError] {
        &self.rejected
    }

    fn reject(&mut self, error: BlockError) {
        warn!("skipping {}", error);
        self.rejected.push(error);
    }
}

impl FromStr for CalibrationSet {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

impl FromIterator<CameraCalibration> for CalibrationSet {
    fn from_iter<I: IntoIterator<Item = CameraCalibration>>(iter: I) -> Self {
        let mut set = Self::new();
        for calibration in iter {
            set.insert(calibration);
        }
        set
    }
}

// ============================================================================
// PARSING
// ============================================================================

/// Parses camera config text into a [`CalibrationSet`].
///
/// Only a text that cannot be tokenized or split into blocks (unbalanced
/// braces, unterminated strings) fails as a whole. A block that is
/// malformed, or has missing or invalid fields, is logged, recorded in
/// [`CalibrationSet::rejected`] and skipped, so that camera is simply
/// unavailable. Text without any `config` block yields an empty set.
pub fn parse(text: &str) -> Result<CalibrationSet, ParseError> {
    let sections = text::parse_sections(text)?;
    let mut set = CalibrationSet::new();
    let mut index = 0;

    for section in &sections {
        let fields = match &section.fields {
            Ok(fields) => fields,
            Err(e) if section.key == "config" => {
                set.reject(BlockError {
                    index,
                    line: section.line,
                    camera_id: section.scan_value("camera_dev").map(str::to_string),
                    issues: vec![FieldIssue::invalid("config", format!("is malformed: {}", e))],
                });
                index += 1;
                continue;
            }
            Err(e) => {
                warn!(section = %section.key, error = %e, "ignoring malformed section");
                continue;
            }
        };

        let blocks = fields
            .iter()
            .filter(|field| field.key == "config")
            .filter_map(|field| field.children().map(|children| (field.line, children)));

        for (line, block) in blocks {
            match parse_block(block) {
                Ok(calibration) => {
                    debug!(camera = %calibration.id, "loaded camera calibration");
                    if let Some(previous) = set.insert(calibration) {
                        warn!(camera = %previous.id, block = index, "duplicate camera_dev, later block wins");
                    }
                }
                Err((camera_id, issues)) => set.reject(BlockError {
                    index,
                    line,
                    camera_id,
                    issues,
                }),
            }
            index += 1;
        }
    }

    debug!(cameras = set.len(), rejected = set.rejected.len(), "calibration parsed");
    Ok(set)
}

type BlockFailure = (Option<String>, Vec<FieldIssue>);

fn parse_block(fields: &[Field]) -> Result<CameraCalibration, BlockFailure> {
    let mut issues = Vec::new();

    let camera_id = match find_value(fields, "camera_dev").and_then(Field::as_str) {
        Some(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
        Some(_) => {
            issues.push(FieldIssue::invalid("camera_dev", "is empty"));
            None
        }
        None => {
            issues.push(FieldIssue::missing("camera_dev"));
            None
        }
    };

    let width = required_u32(fields, "img_width", &mut issues);
    let height = required_u32(fields, "img_height", &mut issues);
    let fx = required_f64(fields, "f_x", &mut issues);
    let fy = required_f64(fields, "f_y", &mut issues);
    let cx = required_f64(fields, "o_x", &mut issues);
    let cy = required_f64(fields, "o_y", &mut issues);

    let mut distortion = [0.0; 4];
    for (i, key) in ["k_1", "k_2", "k_3", "k_4"].iter().enumerate() {
        if let Some(k) = optional_f64(fields, key, &mut issues) {
            distortion[i] = k;
        }
    }

    let model = find_value(fields, "model_type")
        .and_then(Field::as_str)
        .unwrap_or(DEFAULT_MODEL)
        .to_string();

    let position = required_vec3(fields, "position", ["x", "y", "z"], &mut issues);
    let orientation = required_quaternion(fields, &mut issues);
    let install_angle_error = optional_vec3(fields, "install_angle_error", &mut issues);

    let (Some(width), Some(height), Some(fx), Some(fy), Some(cx), Some(cy), Some(position), Some(orientation)) =
        (width, height, fx, fy, cx, cy, position, orientation)
    else {
        return Err((camera_id, issues));
    };

    let intrinsics = CameraIntrinsics {
        width,
        height,
        fx,
        fy,
        cx,
        cy,
        distortion,
        model,
    };
    issues.extend(intrinsics.validate());

    let extrinsics = CameraExtrinsics::new(position, orientation);
    if extrinsics.is_none() {
        issues.push(FieldIssue::invalid("orientation", "is not a usable rotation"));
    }

    match (camera_id, extrinsics) {
        (Some(id), Some(extrinsics)) if issues.is_empty() => Ok(CameraCalibration {
            id,
            intrinsics,
            extrinsics,
            install_angle_error,
        }),
        (camera_id, _) => Err((camera_id, issues)),
    }
}

fn parse_number(field: &Field) -> Result<f64, FieldIssue> {
    let raw = field.as_str().unwrap_or_default();
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(FieldIssue::invalid(field.key.as_str(), format!("is not a finite number: '{}'", raw))),
    }
}

fn required_f64(fields: &[Field], key: &str, issues: &mut Vec<FieldIssue>) -> Option<f64> {
    let Some(field) = find_value(fields, key) else {
        issues.push(FieldIssue::missing(key));
        return None;
    };
    parse_number(field).map_err(|issue| issues.push(issue)).ok()
}

fn optional_f64(fields: &[Field], key: &str, issues: &mut Vec<FieldIssue>) -> Option<f64> {
    let field = find_value(fields, key)?;
    parse_number(field).map_err(|issue| issues.push(issue)).ok()
}

fn required_u32(fields: &[Field], key: &str, issues: &mut Vec<FieldIssue>) -> Option<u32> {
    let Some(field) = find_value(fields, key) else {
        issues.push(FieldIssue::missing(key));
        return None;
    };
    let raw = field.as_str().unwrap_or_default();
    match parse_pixel_count(raw) {
        Some(value) => Some(value),
        None => {
            issues.push(FieldIssue::invalid(key, format!("is not a pixel count: '{}'", raw)));
            None
        }
    }
}

/// `1920` or an integral float such as `1920.0`.
fn parse_pixel_count(raw: &str) -> Option<u32> {
    if let Ok(value) = raw.parse::<u32>() {
        return Some(value);
    }
    let value = raw.parse::<f64>().ok()?;
    let integral = value.is_finite() && value.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&value);
    integral.then_some(value as u32)
}

fn required_vec3(
    fields: &[Field],
    block: &str,
    keys: [&str; 3],
    issues: &mut Vec<FieldIssue>,
) -> Option<Vector3<f64>> {
    let Some(children) = find_block(fields, block) else {
        issues.push(FieldIssue::missing(block));
        return None;
    };

    let mut values = [0.0; 3];
    let mut complete = true;
    for (slot, key) in values.iter_mut().zip(keys) {
        match find_value(children, key) {
            Some(field) => match parse_number(field) {
                Ok(v) => *slot = v,
                Err(_) => {
                    issues.push(FieldIssue::invalid(format!("{}.{}", block, key), "is not a finite number"));
                    complete = false;
                }
            },
            None => {
                issues.push(FieldIssue::missing(format!("{}.{}", block, key)));
                complete = false;
            }
        }
    }

    complete.then(|| Vector3::from(values))
}

fn required_quaternion(fields: &[Field], issues: &mut Vec<FieldIssue>) -> Option<Quaternion<f64>> {
    let Some(children) = find_block(fields, "orientation") else {
        issues.push(FieldIssue::missing("orientation"));
        return None;
    };

    let mut values = [0.0; 4];
    let mut complete = true;
    for (slot, key) in values.iter_mut().zip(["qx", "qy", "qz", "qw"]) {
        match find_value(children, key) {
            Some(field) => match parse_number(field) {
                Ok(v) => *slot = v,
                Err(_) => {
                    issues.push(FieldIssue::invalid(format!("orientation.{}", key), "is not a finite number"));
                    complete = false;
                }
            },
            None => {
                issues.push(FieldIssue::missing(format!("orientation.{}", key)));
                complete = false;
            }
        }
    }

    let [qx, qy, qz, qw] = values;
    complete.then(|| Quaternion::new(qw, qx, qy, qz))
}

fn optional_vec3(fields: &[Field], block: &str, issues: &mut Vec<FieldIssue>) -> Vector3<f64> {
    let Some(children) = find_block(fields, block) else {
        return Vector3::zeros();
    };

    let mut values = [0.0; 3];
    for (slot, key) in values.iter_mut().zip(["x", "y", "z"]) {
        if let Some(field) = find_value(children, key) {
            match parse_number(field) {
                Ok(v) => *slot = v,
                Err(_) => issues.push(FieldIssue::invalid(format!("{}.{}", block, key), "is not a finite number")),
            }
        }
    }
    Vector3::from(values)
}
