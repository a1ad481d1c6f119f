//! Whole-frame scenarios: files on disk through the session to overlays.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use approx::assert_relative_eq;
use frameview_core::{
    project, project_boxes, CalibrationSet, CameraCalibration, CameraOverlay, CameraExtrinsics, CameraIntrinsics, EulerXyz,
    FrameManifest, FrameSequence, FrameSession, FrameViewState, ObjectType, OrientedBox, Rgb,
};
use nalgebra::{Point3, Vector3};

const CAMERAS_CFG: &str = r#"
# front camera looks down the LiDAR +Z axis
config {
  camera_dev: "camera_1"
  img_width: 1000
  img_height: 1000
  f_x: 1000
  f_y: 1000
  o_x: 500
  o_y: 500
  position { x: 0 y: 0 z: 0 }
  orientation { qx: 0 qy: 0 qz: 0 qw: 1 }
}
config {
  camera_dev: "camera_2"
  img_width: 1000
  img_height: 1000
  f_x: 1000
  # f_y is missing
  o_x: 500
  o_y: 500
  position { x: 0 y: 0 z: 0 }
  orientation { qx: 0 qy: 0 qz: 0 qw: 1 }
}
"#;

const LABELS: &str = r#"[
  { "obj_id": 1, "obj_type": "Car",
    "psr": { "position": { "x": 0, "y": 0, "z": 10 },
             "scale": { "x": 2, "y": 2, "z": 2 },
             "rotation": { "x": 0, "y": 0, "z": 0 } } },
  { "obj_id": "2", "obj_type": "Bus",
    "psr": { "position": { "x": 0, "y": 0, "z": -20 },
             "scale": { "x": 3, "y": 10, "z": 3 },
             "rotation": { "x": 0, "y": 0, "z": 0 } } }
]"#;

const CLOUD: &str = "# .PCD v0.7\nVERSION 0.7\nFIELDS x y z intensity\nSIZE 4 4 4 4\nTYPE F F F F\n\
COUNT 1 1 1 1\nWIDTH 4\nHEIGHT 1\nVIEWPOINT 0 0 0 1 0 0 0\nPOINTS 4\nDATA ascii\n\
0 0 5 10\n0.5 0 20 10\n0 0 -4 10\n0 0 12 10\n";

fn write_frame(root: &Path) {
    fs::create_dir_all(root.join("run/params")).unwrap();
    fs::create_dir_all(root.join("run/labels")).unwrap();
    fs::create_dir_all(root.join("run/lidar")).unwrap();
    fs::create_dir_all(root.join("frames")).unwrap();

    fs::write(root.join("run/params/cameras.cfg"), CAMERAS_CFG).unwrap();
    fs::write(root.join("run/labels/000001.json"), LABELS).unwrap();
    fs::write(root.join("run/lidar/000001.pcd"), CLOUD).unwrap();

    let manifest = r#"{
      "frame": {
        "parent_dir": "run",
        "config": "params",
        "lidar_path": "lidar/000001.pcd",
        "label": "labels/000001.json",
        "camera_1": "images/camera_1/000001.jpg",
        "camera_2": "images/camera_2/000001.jpg"
      }
    }"#;
    fs::write(root.join("frames/000001.json"), manifest).unwrap();

    let without_labels = r#"{ "frame": { "parent_dir": "run", "config": "params", "label": "labels/missing.json" } }"#;
    fs::write(root.join("frames/000002.json"), without_labels).unwrap();
}

fn reference_camera() -> CameraCalibration {
    CameraCalibration::new(
        "camera_1",
        CameraIntrinsics::pinhole(1000, 1000, 1000.0, 1000.0, 500.0, 500.0),
        CameraExtrinsics::identity(),
    )
    .unwrap()
}

#[test]
fn reference_projections() {
    let calib = reference_camera();

    let center = project(&Point3::new(0.0, 0.0, 10.0), &calib, 1000, 1000).unwrap();
    assert_relative_eq!(center.x, 500.0);
    assert_relative_eq!(center.y, 500.0);
    assert_relative_eq!(center.depth, 10.0);

    let right = project(&Point3::new(1.0, 0.0, 10.0), &calib, 1000, 1000).unwrap();
    assert_relative_eq!(right.x, 600.0);

    assert!(project(&Point3::new(0.0, 0.0, -5.0), &calib, 1000, 1000).is_none());
}

#[test]
fn reference_box_projects_all_corners() {
    let calib = reference_camera();
    let object = OrientedBox::new(
        "1",
        ObjectType::Car,
        Point3::new(0.0, 0.0, 10.0),
        Vector3::new(2.0, 2.0, 2.0),
        EulerXyz::default(),
    );

    let overlays = project_boxes(&[object], &calib, 1000, 1000);
    assert_eq!(overlays.len(), 1);
    assert_eq!(overlays[0].visible_corners, 8);

    let xs: Vec<f64> = overlays[0].edges.iter().flat_map(|(a, b)| [a.x, b.x]).collect();
    let min = xs.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    assert_relative_eq!(500.0 - min, max - 500.0, epsilon = 1e-9);
}

#[test]
fn frame_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    write_frame(dir.path());

    let session = FrameSession::load_manifest_file(dir.path().join("frames/000001.json"), dir.path()).unwrap();

    // camera_2 lacks f_y and is skipped without failing the rest
    assert_eq!(session.calibrations().ids().collect::<Vec<_>>(), vec!["camera_1"]);
    assert_eq!(session.calibrations().rejected()[0].missing_fields(), vec!["f_y"]);
    assert_eq!(session.boxes().len(), 2);
    assert_eq!(session.cloud().len(), 4);

    let overlay = session.render_camera("camera_1", 1000, 1000);

    // Behind-camera point dropped, rest painter-sorted far to near
    let depths: Vec<f64> = overlay.points.iter().map(|p| p.depth).collect();
    assert_eq!(depths, vec![20.0, 12.0, 5.0]);
    assert_eq!(overlay.points[0].color, Some(Rgb([0, 0, 255])));
    assert_eq!(overlay.points[2].color, Some(Rgb([255, 0, 0])));

    // Bus is behind the camera
    assert_eq!(overlay.boxes.len(), 1);
    assert_eq!(overlay.boxes[0].label, "Car 1");
    assert_eq!(overlay.boxes[0].color, Rgb::from_hex(0x2ca02c));

    // Missing calibration gives an empty overlay, other cameras unaffected
    let mut sizes = BTreeMap::new();
    sizes.insert("camera_1".to_string(), (500, 500));
    let all = session.render_all(&sizes);
    assert_eq!(all.len(), 1);
    assert_relative_eq!(all[0].points[2].x, 250.0);
    assert!(session.render_camera("camera_2", 1000, 1000).is_empty());
}

#[test]
fn frame_with_missing_labels_has_no_boxes() {
    let dir = tempfile::tempdir().unwrap();
    write_frame(dir.path());

    let session = FrameSession::load_manifest_file(dir.path().join("frames/000002.json"), dir.path()).unwrap();
    assert!(session.boxes().is_empty());
    assert!(session.cloud().is_empty());
    assert!(session.render_camera("camera_1", 1000, 1000).is_empty());
}

#[test]
fn frame_with_bad_calibration_keeps_boxes_and_cloud() {
    let dir = tempfile::tempdir().unwrap();
    write_frame(dir.path());
    fs::write(dir.path().join("run/params/cameras.cfg"), "config { camera_dev: \"x\"").unwrap();

    let session = FrameSession::load_manifest_file(dir.path().join("frames/000001.json"), dir.path()).unwrap();
    assert!(session.calibrations().is_empty());
    assert_eq!(session.boxes().len(), 2);
    assert_eq!(session.cloud().len(), 4);
    assert!(session.render_camera("camera_1", 1000, 1000).is_empty());

    // Same when the file is gone altogether
    fs::remove_file(dir.path().join("run/params/cameras.cfg")).unwrap();
    let session = FrameSession::load_manifest_file(dir.path().join("frames/000001.json"), dir.path()).unwrap();
    assert!(session.calibrations().is_empty());
    assert_eq!(session.boxes().len(), 2);
}

#[test]
fn frame_with_one_malformed_block_keeps_other_cameras() {
    let dir = tempfile::tempdir().unwrap();
    write_frame(dir.path());
    let with_broken = format!("{}config {{\n  camera_dev: \"camera_3\"\n  f_x:\n}}\n", CAMERAS_CFG);
    fs::write(dir.path().join("run/params/cameras.cfg"), with_broken).unwrap();

    let session = FrameSession::load_manifest_file(dir.path().join("frames/000001.json"), dir.path()).unwrap();
    assert_eq!(session.calibrations().ids().collect::<Vec<_>>(), vec!["camera_1"]);

    let rejected = session.calibrations().rejected();
    assert_eq!(rejected.len(), 2);
    assert_eq!(rejected[1].index, 2);
    assert_eq!(rejected[1].camera_id.as_deref(), Some("camera_3"));
    assert_eq!(session.render_camera("camera_1", 1000, 1000).points.len(), 3);
}

#[test]
fn walking_a_sequence() {
    let dir = tempfile::tempdir().unwrap();
    write_frame(dir.path());

    let mut sequence = FrameSequence::from_dir(dir.path().join("frames")).unwrap();
    assert_eq!(sequence.len(), 2);

    let mut loaded = Vec::new();
    loop {
        let path = sequence.current().unwrap().to_path_buf();
        let manifest = FrameManifest::load(&path).unwrap();
        loaded.push(FrameSession::load(&manifest, dir.path()).unwrap().boxes().len());
        if sequence.next().is_none() {
            break;
        }
    }
    assert_eq!(loaded, vec![2, 0]);
}

#[test]
fn view_state_keeps_original_image() {
    let dir = tempfile::tempdir().unwrap();
    write_frame(dir.path());

    let manifest = FrameManifest::load(dir.path().join("frames/000001.json")).unwrap();
    let session = FrameSession::load(&manifest, dir.path()).unwrap();

    let mut states: BTreeMap<&str, FrameViewState<CameraOverlay>> = manifest
        .images()
        .into_iter()
        .map(|(id, path)| (id, FrameViewState::new(path)))
        .collect();

    for (id, state) in states.iter_mut() {
        state.set_projected(session.render_camera(id, 1000, 1000));
    }

    let front = &states["camera_1"];
    assert_eq!(front.original(), "run/images/camera_1/000001.jpg");
    assert_eq!(front.projected().map(|o| o.points.len()), Some(3));

    let side = states.get_mut("camera_2").unwrap();
    assert!(side.projected().unwrap().is_empty());
    side.toggle();
    assert!(!side.shows_projected());
}

#[test]
fn calibration_set_built_by_hand() {
    let set: CalibrationSet = vec![reference_camera()].into_iter().collect();
    let session = FrameSession::new(set, Vec::new(), Default::default());
    assert!(session.render_camera("camera_1", 640, 480).is_empty());
}
