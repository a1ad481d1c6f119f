//! Property tests for the calibration transforms, the projector and box geometry.

use approx::relative_eq;
use frameview_core::{
    CameraCalibration, CameraExtrinsics, CameraIntrinsics, EulerXyz, ObjectType, OrientedBox, Projector,
};
use nalgebra::{Matrix4, Point3, Quaternion, Vector3};
use proptest::prelude::*;

fn extrinsics_strategy() -> impl Strategy<Value = CameraExtrinsics> {
    (
        prop::array::uniform3(-50.0f64..50.0),
        prop::array::uniform4(-1.0f64..1.0),
    )
        .prop_filter_map("quaternion too close to zero", |(p, q)| {
            let quaternion = Quaternion::new(q[3], q[0], q[1], q[2]);
            if quaternion.norm() < 0.1 {
                return None;
            }
            CameraExtrinsics::new(Vector3::from(p), quaternion)
        })
}

fn calibration(extrinsics: CameraExtrinsics) -> CameraCalibration {
    CameraCalibration::new(
        "cam",
        CameraIntrinsics::pinhole(1920, 1080, 1200.0, 1180.0, 955.0, 545.0),
        extrinsics,
    )
    .unwrap()
}

proptest! {
    #[test]
    fn pose_times_inverse_is_identity(extrinsics in extrinsics_strategy()) {
        let product = extrinsics.matrix() * extrinsics.inverse_matrix();
        prop_assert!(relative_eq!(product, Matrix4::identity(), epsilon = 1e-9));
    }

    #[test]
    fn points_behind_camera_never_project(
        x in -100.0f64..100.0,
        y in -100.0f64..100.0,
        z in -100.0f64..=0.0,
    ) {
        let calib = calibration(CameraExtrinsics::identity());
        let projector = Projector::new(&calib, 1920, 1080);
        prop_assert!(projector.project(&Point3::new(x, y, z)).is_none());
    }

    #[test]
    fn in_frame_pixels_round_trip(
        extrinsics in extrinsics_strategy(),
        u in 0.5f64..1919.0,
        v in 0.5f64..1079.0,
        depth in 0.5f64..200.0,
    ) {
        let calib = calibration(extrinsics);
        let projector = Projector::new(&calib, 1920, 1080);

        let sensor = projector.unproject_to_sensor(u, v, depth);
        let projected = projector.project(&sensor);
        prop_assert!(projected.is_some());

        let p = projected.unwrap();
        prop_assert!(relative_eq!(p.x, u, epsilon = 1e-6));
        prop_assert!(relative_eq!(p.y, v, epsilon = 1e-6));
        prop_assert!(relative_eq!(p.depth, depth, epsilon = 1e-6, max_relative = 1e-9));

        let camera = projector.unproject(p.x, p.y, p.depth);
        let expected = projector.to_camera(&sensor);
        prop_assert!(relative_eq!(camera, expected, epsilon = 1e-6));
    }

    #[test]
    fn doubling_display_doubles_coordinates(
        u in 0.5f64..959.0,
        v in 0.5f64..539.0,
        depth in 0.5f64..100.0,
    ) {
        let calib = calibration(CameraExtrinsics::identity());
        let half = Projector::new(&calib, 960, 540);
        let full = Projector::new(&calib, 1920, 1080);

        let point = half.unproject_to_sensor(u, v, depth);
        let a = half.project(&point).unwrap();
        let b = full.project(&point).unwrap();

        prop_assert!(relative_eq!(b.x, 2.0 * a.x, epsilon = 1e-6));
        prop_assert!(relative_eq!(b.y, 2.0 * a.y, epsilon = 1e-6));
    }

    #[test]
    fn box_corners_center_on_position(
        position in prop::array::uniform3(-100.0f64..100.0),
        scale in prop::array::uniform3(0.1f64..20.0),
        angles in prop::array::uniform3(-3.2f64..3.2),
    ) {
        let object = OrientedBox::new(
            "p",
            ObjectType::Truck,
            Point3::from(position),
            Vector3::from(scale),
            EulerXyz::new(angles[0], angles[1], angles[2]),
        );
        let corners = object.corners();

        let centroid = corners.iter().fold(Vector3::zeros(), |acc, c| acc + c.coords) / 8.0;
        prop_assert!(relative_eq!(centroid, object.position.coords, epsilon = 1e-9));

        // Opposite corners span the full diagonal
        let diagonal = (corners[7] - corners[0]).norm();
        prop_assert!(relative_eq!(diagonal, object.scale.norm(), epsilon = 1e-9));
    }
}
