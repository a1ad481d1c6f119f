//! Synthetic Frame Demo - LiDAR + Boxes Projected Into a Camera
//! ============================================================
//!
//! Builds a small street scene in the sensor frame, projects it into a
//! forward camera at two display sizes, and sends everything to Rerun.
//!
//! Run:
//! ```bash
//! cargo run --example synthetic_frame_demo --features visualization -- --save frame_demo.rrd
//! ```

use frameview_core::{
    CalibrationSet, EulerXyz, FrameSession, ObjectType, OrientedBox, PointCloud, RerunVisualizer,
};
use nalgebra::{Point3, Vector3};

// Camera looking forward along sensor +X, image x to the right (-Y), image y down (-Z)
const CAMERAS_CFG: &str = r#"
config {
  camera_dev: "camera_1"
  img_width: 1920
  img_height: 1080
  f_x: 1000 f_y: 1000 o_x: 960 o_y: 540
  position { x: 0.5 y: 0 z: 1.6 }
  orientation { qx: -0.5 qy: 0.5 qz: -0.5 qw: 0.5 }
}
"#;

fn street_cloud() -> PointCloud {
    let mut points = Vec::new();

    // Ground rows every meter ahead of the car
    for row in 2..60 {
        for col in -40..=40 {
            points.push(Point3::new(row as f64, col as f64 * 0.25, 0.0));
        }
    }

    // Two building facades
    for x in 5..60 {
        for z in 0..12 {
            points.push(Point3::new(x as f64, 8.0, z as f64 * 0.5));
            points.push(Point3::new(x as f64, -8.0, z as f64 * 0.5));
        }
    }

    PointCloud::new(points)
}

fn street_boxes() -> Vec<OrientedBox> {
    vec![
        OrientedBox::new("1", ObjectType::Car, Point3::new(12.0, -2.0, 0.8), Vector3::new(4.5, 1.9, 1.6), EulerXyz::default()),
        OrientedBox::new("2", ObjectType::Bus, Point3::new(28.0, 3.5, 1.6), Vector3::new(12.0, 2.6, 3.2), EulerXyz::new(0.0, 0.0, 0.05)),
        OrientedBox::new("3", ObjectType::Pedestrian, Point3::new(8.0, 5.5, 0.9), Vector3::new(0.6, 0.6, 1.8), EulerXyz::default()),
        // Behind the car, never visible to the front camera
        OrientedBox::new("4", ObjectType::Truck, Point3::new(-15.0, 0.0, 1.5), Vector3::new(8.0, 2.5, 3.0), EulerXyz::default()),
    ]
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("FrameView Synthetic Frame Demo");
    println!("==============================\n");

    let args: Vec<String> = std::env::args().collect();
    let viz = if args.len() > 1 && args[1] == "--save" {
        let path = args.get(2).map(|s| s.as_str()).unwrap_or("frame_demo.rrd");
        println!("Saving to: {}\n", path);
        RerunVisualizer::new_to_file("FrameView Demo", path)?
    } else {
        println!("Opening Rerun viewer...\n");
        RerunVisualizer::new("FrameView Demo")?
    };

    let calibrations = CalibrationSet::parse(CAMERAS_CFG)?;
    let session = FrameSession::new(calibrations, street_boxes(), street_cloud());

    viz.log_range_rings()?;

    for (frame, (width, height)) in [(1920, 1080), (960, 540)].into_iter().enumerate() {
        viz.set_frame(frame);
        let overlay = session.render_camera("camera_1", width, height);

        println!(
            "{}x{}: {} points, {} boxes (of {})",
            width,
            height,
            overlay.points.len(),
            overlay.boxes.len(),
            session.boxes().len()
        );
        for b in &overlay.boxes {
            println!("  {:<14} {:>2} corners, {:>2} edges", b.label, b.visible_corners, b.edges.len());
        }

        viz.log_frame(&session, &[overlay])?;
    }

    println!("\nDone.");
    Ok(())
}
