//! Pinhole projection of sensor-frame points into a camera image.
//!
//! A [`Projector`] is built once per (camera, display size) and reused for
//! every point of a pass. The intrinsics are rescaled to the display
//! resolution; the 2D output is never rescaled afterwards.

use nalgebra::{Isometry3, Point3};
use serde::Serialize;

use crate::calibration::{CameraCalibration, CameraIntrinsics};
use crate::color::Rgb;

/// A point that landed inside the image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProjectedPoint {
    /// Column in display pixels, `0 <= x < width`
    pub x: f64,
    /// Row in display pixels, `0 <= y < height`
    pub y: f64,
    /// Camera-space Z, always `> 0`
    pub depth: f64,
    /// Set by the point cloud pass; `None` for bare projections
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Rgb>,
}

impl ProjectedPoint {
    pub fn new(x: f64, y: f64, depth: f64) -> Self {
        Self {
            x,
            y,
            depth,
            color: None,
        }
    }

    pub fn with_color(mut self, color: Rgb) -> Self {
        self.color = Some(color);
        self
    }
}

/// Why a point did not produce a [`ProjectedPoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    /// NaN or infinite input, or a non-finite result
    NonFinite,
    /// Camera-space `Z <= 0`
    BehindCamera,
    /// Projected outside `[0, width) x [0, height)`
    OutOfFrame,
}

/// Intrinsics rescaled to a display resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaledIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl ScaledIntrinsics {
    /// Scales `fx, cx` by `width / calib_width` and `fy, cy` by
    /// `height / calib_height`. Identity at the calibration resolution.
    pub fn new(intrinsics: &CameraIntrinsics, width: u32, height: u32) -> Self {
        let sx = width as f64 / intrinsics.width as f64;
        let sy = height as f64 / intrinsics.height as f64;
        Self {
            fx: intrinsics.fx * sx,
            fy: intrinsics.fy * sy,
            cx: intrinsics.cx * sx,
            cy: intrinsics.cy * sy,
        }
    }
}

/// Projects points for one camera at one display size.
#[derive(Debug, Clone, Copy)]
pub struct Projector<'a> {
    to_camera: &'a Isometry3<f64>,
    intrinsics: ScaledIntrinsics,
    width: f64,
    height: f64,
}

impl<'a> Projector<'a> {
    /// Prepares projection into a `width x height` display.
    pub fn new(calibration: &'a CameraCalibration, width: u32, height: u32) -> Self {
        Self {
            to_camera: calibration.extrinsics.to_camera(),
            intrinsics: ScaledIntrinsics::new(&calibration.intrinsics, width, height),
            width: width as f64,
            height: height as f64,
        }
    }

    pub fn intrinsics(&self) -> &ScaledIntrinsics {
        &self.intrinsics
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    /// Sensor-frame point into the camera frame.
    #[inline]
    pub fn to_camera(&self, point: &Point3<f64>) -> Point3<f64> {
        self.to_camera.transform_point(point)
    }

    /// Projects a sensor-frame point, or says why it cannot be drawn.
    pub fn classify(&self, point: &Point3<f64>) -> Result<ProjectedPoint, Rejection> {
        if !point.iter().all(|v| v.is_finite()) {
            return Err(Rejection::NonFinite);
        }
        self.classify_camera(&self.to_camera(point))
    }

    /// Same as [`classify`](Self::classify) for a point already in the camera frame.
    pub fn classify_camera(&self, camera: &Point3<f64>) -> Result<ProjectedPoint, Rejection> {
        if !camera.iter().all(|v| v.is_finite()) {
            return Err(Rejection::NonFinite);
        }
        if camera.z <= 0.0 {
            return Err(Rejection::BehindCamera);
        }

        let k = &self.intrinsics;
        let x = k.fx * camera.x / camera.z + k.cx;
        let y = k.fy * camera.y / camera.z + k.cy;

        if !(x.is_finite() && y.is_finite()) {
            return Err(Rejection::NonFinite);
        }
        if x < 0.0 || x >= self.width || y < 0.0 || y >= self.height {
            return Err(Rejection::OutOfFrame);
        }

        Ok(ProjectedPoint::new(x, y, camera.z))
    }

    /// Projects a sensor-frame point. `None` when it is behind the camera,
    /// outside the image, or not finite.
    #[inline]
    pub fn project(&self, point: &Point3<f64>) -> Option<ProjectedPoint> {
        self.classify(point).ok()
    }

    /// Back-projects a pixel at camera-space depth `depth` into the camera frame.
    pub fn unproject(&self, x: f64, y: f64, depth: f64) -> Point3<f64> {
        let k = &self.intrinsics;
        Point3::new((x - k.cx) * depth / k.fx, (y - k.cy) * depth / k.fy, depth)
    }

    /// Back-projects a pixel into the sensor frame.
    pub fn unproject_to_sensor(&self, x: f64, y: f64, depth: f64) -> Point3<f64> {
        self.to_camera.inverse_transform_point(&self.unproject(x, y, depth))
    }
}

/// One-shot projection of a sensor-frame point into a `width x height` image.
pub fn project(
    point: &Point3<f64>,
    calibration: &CameraCalibration,
    width: u32,
    height: u32,
) -> Option<ProjectedPoint> {
    Projector::new(calibration, width, height).project(point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CameraExtrinsics;
    use approx::assert_relative_eq;
    use nalgebra::{Quaternion, UnitQuaternion, Vector3};
    use std::f64::consts::FRAC_PI_2;

    fn square_camera() -> CameraCalibration {
        CameraCalibration::new(
            "cam",
            CameraIntrinsics::pinhole(1000, 1000, 1000.0, 1000.0, 500.0, 500.0),
            CameraExtrinsics::identity(),
        )
        .unwrap()
    }

    #[test]
    fn test_principal_point() {
        let calib = square_camera();
        let p = project(&Point3::new(0.0, 0.0, 10.0), &calib, 1000, 1000).unwrap();
        assert_relative_eq!(p.x, 500.0);
        assert_relative_eq!(p.y, 500.0);
        assert_relative_eq!(p.depth, 10.0);
        assert!(p.color.is_none());
    }

    #[test]
    fn test_lateral_offset() {
        let calib = square_camera();
        let p = project(&Point3::new(1.0, 0.0, 10.0), &calib, 1000, 1000).unwrap();
        assert_relative_eq!(p.x, 600.0);
        assert_relative_eq!(p.y, 500.0);
    }

    #[test]
    fn test_behind_camera() {
        let calib = square_camera();
        let projector = Projector::new(&calib, 1000, 1000);
        assert_eq!(projector.classify(&Point3::new(0.0, 0.0, -5.0)), Err(Rejection::BehindCamera));
        assert_eq!(projector.classify(&Point3::new(0.0, 0.0, 0.0)), Err(Rejection::BehindCamera));
    }

    #[test]
    fn test_bounds_are_half_open() {
        let calib = square_camera();
        let projector = Projector::new(&calib, 1000, 1000);

        // x = 0 exactly is inside
        let left = projector.project(&Point3::new(-5.0, 0.0, 10.0)).unwrap();
        assert_relative_eq!(left.x, 0.0);

        // x = 1000 exactly is outside
        assert_eq!(projector.classify(&Point3::new(5.0, 0.0, 10.0)), Err(Rejection::OutOfFrame));
        assert_eq!(projector.classify(&Point3::new(0.0, -6.0, 10.0)), Err(Rejection::OutOfFrame));
    }

    #[test]
    fn test_non_finite_input() {
        let calib = square_camera();
        let projector = Projector::new(&calib, 1000, 1000);
        assert_eq!(projector.classify(&Point3::new(f64::NAN, 0.0, 10.0)), Err(Rejection::NonFinite));
        assert_eq!(projector.classify(&Point3::new(0.0, f64::INFINITY, 10.0)), Err(Rejection::NonFinite));
    }

    #[test]
    fn test_scaling_the_display_scales_the_output() {
        let calib = square_camera();
        let point = Point3::new(1.0, -2.0, 10.0);

        let native = project(&point, &calib, 1000, 1000).unwrap();
        let doubled = project(&point, &calib, 2000, 2000).unwrap();
        assert_relative_eq!(doubled.x, native.x * 2.0, epsilon = 1e-9);
        assert_relative_eq!(doubled.y, native.y * 2.0, epsilon = 1e-9);

        // Non-uniform display size scales each axis on its own
        let wide = project(&point, &calib, 500, 1000).unwrap();
        assert_relative_eq!(wide.x, native.x * 0.5, epsilon = 1e-9);
        assert_relative_eq!(wide.y, native.y, epsilon = 1e-9);
    }

    #[test]
    fn test_native_size_intrinsics_unchanged() {
        let calib = square_camera();
        let k = ScaledIntrinsics::new(&calib.intrinsics, 1000, 1000);
        assert_eq!(
            k,
            ScaledIntrinsics {
                fx: 1000.0,
                fy: 1000.0,
                cx: 500.0,
                cy: 500.0
            }
        );
    }

    #[test]
    fn test_unproject_round_trip() {
        let calib = square_camera();
        let projector = Projector::new(&calib, 640, 480);
        let point = Point3::new(0.7, -0.3, 4.0);

        let p = projector.project(&point).unwrap();
        let back = projector.unproject_to_sensor(p.x, p.y, p.depth);
        assert_relative_eq!(back, point, epsilon = 1e-9);
    }

    #[test]
    fn test_rotated_camera_uses_inverse_pose() {
        // Optical axis along sensor +X, camera 2 m forward of the origin
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), FRAC_PI_2);
        let extrinsics = CameraExtrinsics::new(Vector3::new(2.0, 0.0, 0.0), *rotation.quaternion()).unwrap();
        let calib = CameraCalibration::new(
            "side",
            CameraIntrinsics::pinhole(1000, 1000, 1000.0, 1000.0, 500.0, 500.0),
            extrinsics,
        )
        .unwrap();

        let ahead = project(&Point3::new(12.0, 0.0, 0.0), &calib, 1000, 1000).unwrap();
        assert_relative_eq!(ahead.x, 500.0, epsilon = 1e-9);
        assert_relative_eq!(ahead.depth, 10.0, epsilon = 1e-9);

        assert!(project(&Point3::new(-5.0, 0.0, 0.0), &calib, 1000, 1000).is_none());
    }

    #[test]
    fn test_unnormalized_quaternion_is_normalized() {
        let extrinsics = CameraExtrinsics::new(Vector3::zeros(), Quaternion::new(3.0, 0.0, 0.0, 0.0)).unwrap();
        let calib = CameraCalibration::new(
            "scaled_q",
            CameraIntrinsics::pinhole(100, 100, 100.0, 100.0, 50.0, 50.0),
            extrinsics,
        )
        .unwrap();

        let p = project(&Point3::new(0.0, 0.0, 2.0), &calib, 100, 100).unwrap();
        assert_relative_eq!(p.depth, 2.0, epsilon = 1e-12);
    }
}
