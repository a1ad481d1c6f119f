//! Rerun viewer output for a frame: the height-colored LiDAR cloud, the
//! annotated boxes in 3D, and each camera's projected overlay in 2D.
//!
//! Enable with the `visualization` feature flag.

use nalgebra::UnitQuaternion;
use rerun::{RecordingStream, RecordingStreamBuilder};

use crate::oriented_box::OrientedBox;
use crate::pointcloud::{range_rings, PointCloud};
use crate::session::{CameraOverlay, FrameSession};

/// Ground circles every 20 m out to 200 m
const RING_STEP: f64 = 20.0;
const RING_MAX_RADIUS: f64 = 200.0;
const RING_SEGMENTS: usize = 128;

/// Rerun-based visualizer for projected frames
pub struct RerunVisualizer {
    rec: RecordingStream,
}

impl RerunVisualizer {
    /// Create a new visualizer that spawns the Rerun viewer
    pub fn new(app_id: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let rec = RecordingStreamBuilder::new(app_id).spawn()?;
        rec.log_static("world", &rerun::ViewCoordinates::RIGHT_HAND_Z_UP())?;
        Ok(Self { rec })
    }

    /// Create a visualizer that saves to an `.rrd` file
    pub fn new_to_file(app_id: &str, path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let rec = RecordingStreamBuilder::new(app_id).save(path)?;
        rec.log_static("world", &rerun::ViewCoordinates::RIGHT_HAND_Z_UP())?;
        Ok(Self { rec })
    }

    /// Moves the timeline to frame `index`
    pub fn set_frame(&self, index: usize) {
        self.rec.set_time_sequence("frame", index as i64);
    }

    /// Log the cloud colored by height
    pub fn log_point_cloud(&self, cloud: &PointCloud) -> Result<(), Box<dyn std::error::Error>> {
        let positions: Vec<[f32; 3]> = cloud
            .points()
            .iter()
            .map(|p| [p.x as f32, p.y as f32, p.z as f32])
            .collect();
        let colors: Vec<[u8; 4]> = cloud.height_colors().iter().map(|c| c.with_alpha(255)).collect();

        self.rec.log(
            "world/lidar",
            &rerun::Points3D::new(positions).with_colors(colors).with_radii([0.03]),
        )?;
        Ok(())
    }

    /// Log annotated boxes with class colors and `"{type} {id}"` labels
    pub fn log_boxes(&self, boxes: &[OrientedBox]) -> Result<(), Box<dyn std::error::Error>> {
        let centers: Vec<[f32; 3]> = boxes
            .iter()
            .map(|b| [b.position.x as f32, b.position.y as f32, b.position.z as f32])
            .collect();
        let sizes: Vec<[f32; 3]> = boxes
            .iter()
            .map(|b| [b.scale.x as f32, b.scale.y as f32, b.scale.z as f32])
            .collect();
        // xyzw
        let quaternions: Vec<[f32; 4]> = boxes
            .iter()
            .map(|b| {
                let q = UnitQuaternion::from_rotation_matrix(&b.rotation.rotation());
                [q.i as f32, q.j as f32, q.k as f32, q.w as f32]
            })
            .collect();
        let colors: Vec<[u8; 4]> = boxes.iter().map(|b| b.color().with_alpha(255)).collect();
        let labels: Vec<String> = boxes.iter().map(OrientedBox::label).collect();

        self.rec.log(
            "world/boxes",
            &rerun::Boxes3D::from_centers_and_sizes(centers, sizes)
                .with_quaternions(quaternions)
                .with_colors(colors)
                .with_labels(labels),
        )?;
        Ok(())
    }

    /// Log the static ground range circles
    pub fn log_range_rings(&self) -> Result<(), Box<dyn std::error::Error>> {
        let strips: Vec<Vec<[f32; 3]>> = range_rings(RING_STEP, RING_MAX_RADIUS, RING_SEGMENTS)
            .iter()
            .map(|ring| ring.iter().map(|p| [p.x as f32, p.y as f32, p.z as f32]).collect())
            .collect();

        self.rec.log_static(
            "world/ground/rings",
            &rerun::LineStrips3D::new(strips).with_colors([[204, 204, 204, 120]]),
        )?;
        Ok(())
    }

    /// Log one camera's 2D overlay under `cameras/<id>`
    pub fn log_camera_overlay(&self, overlay: &CameraOverlay) -> Result<(), Box<dyn std::error::Error>> {
        let path = format!("cameras/{}", overlay.camera_id);

        let positions: Vec<[f32; 2]> = overlay.points.iter().map(|p| [p.x as f32, p.y as f32]).collect();
        let colors: Vec<[u8; 4]> = overlay
            .points
            .iter()
            .map(|p| p.color.map_or([255, 255, 255, 255], |c| c.with_alpha(255)))
            .collect();
        self.rec.log(
            format!("{}/points", path),
            &rerun::Points2D::new(positions)
                .with_colors(colors)
                .with_radii([overlay.point_radius]),
        )?;

        for overlay_box in &overlay.boxes {
            let strips: Vec<[[f32; 2]; 2]> = overlay_box
                .edges
                .iter()
                .map(|(a, b)| [[a.x as f32, a.y as f32], [b.x as f32, b.y as f32]])
                .collect();
            self.rec.log(
                format!("{}/boxes/{}", path, overlay_box.object_id),
                &rerun::LineStrips2D::new(strips)
                    .with_colors([overlay_box.color.with_alpha(255)])
                    .with_labels([overlay_box.label.as_str()]),
            )?;
        }
        Ok(())
    }

    /// Log the 3D scene and every camera overlay of a session
    pub fn log_frame(&self, session: &FrameSession, overlays: &[CameraOverlay]) -> Result<(), Box<dyn std::error::Error>> {
        self.log_point_cloud(session.cloud())?;
        self.log_boxes(session.boxes())?;
        for overlay in overlays {
            self.log_camera_overlay(overlay)?;
        }
        tracing::info!(cameras = overlays.len(), "frame sent to rerun");
        Ok(())
    }
}
